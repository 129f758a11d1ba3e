use super::*;
use crate::interp::{Callable, EvalErrorKind, Value};
use im_rc::vector;
use std::cell::Cell;
use std::rc::Rc;

fn int_list(values: &[i64]) -> Value {
    Value::List(values.iter().map(|&n| Value::Integer(n)).collect())
}

fn float_external(digits: &[i64], position: i64) -> Value {
    Value::List(vector![int_list(digits), Value::Integer(position)])
}

mod conversion_tests {
    use super::*;

    #[test]
    fn integer_conversions() {
        assert_eq!(
            to_host(&Value::Integer(5), &Shape::Integer),
            Ok(HostValue::Integer(5))
        );
        assert_eq!(
            to_external(&HostValue::Integer(-3), &Shape::Integer),
            Ok(Value::Integer(-3))
        );
        assert!(to_host(&int_list(&[1]), &Shape::Integer).is_err());
    }

    #[test]
    fn boolean_conversions() {
        assert_eq!(
            to_host(&Value::Integer(2), &Shape::Boolean),
            Ok(HostValue::Boolean(true))
        );
        assert_eq!(
            to_host(&Value::Integer(0), &Shape::Boolean),
            Ok(HostValue::Boolean(false))
        );
        assert_eq!(
            to_external(&HostValue::Boolean(true), &Shape::Boolean),
            Ok(Value::Integer(1))
        );
        assert_eq!(
            to_external(&HostValue::Boolean(false), &Shape::Boolean),
            Ok(Value::Integer(0))
        );
    }

    #[test]
    fn strings_are_character_code_lists() {
        assert_eq!(
            to_host(&int_list(&[72, 105]), &Shape::Str),
            Ok(HostValue::Str("Hi".to_string()))
        );
        assert_eq!(
            to_external(&HostValue::Str("Hi".to_string()), &Shape::Str),
            Ok(int_list(&[72, 105]))
        );
    }

    #[test]
    fn invalid_character_codes_are_type_errors() {
        assert!(to_host(&int_list(&[-1]), &Shape::Str).is_err());
        assert!(to_host(&int_list(&[0xD800]), &Shape::Str).is_err());
    }

    #[test]
    fn float_round_trips_through_digits_and_position() {
        assert_eq!(
            to_external(&HostValue::Float(3.14), &Shape::Float),
            Ok(float_external(&[3, 1, 4], 1))
        );
        assert_eq!(
            to_host(&float_external(&[3, 1, 4], 1), &Shape::Float),
            Ok(HostValue::Float(3.14))
        );
    }

    #[test]
    fn float_zero_is_empty_digits() {
        assert_eq!(
            to_external(&HostValue::Float(0.0), &Shape::Float),
            Ok(float_external(&[], 0))
        );
        assert_eq!(
            to_host(&float_external(&[], 0), &Shape::Float),
            Ok(HostValue::Float(0.0))
        );
    }

    #[test]
    fn float_fractional_and_integral_positions() {
        assert_eq!(
            to_external(&HostValue::Float(0.5), &Shape::Float),
            Ok(float_external(&[0, 5], 1))
        );
        assert_eq!(
            to_external(&HostValue::Float(120.0), &Shape::Float),
            Ok(float_external(&[1, 2, 0], 3))
        );
        assert_eq!(
            to_host(&float_external(&[1, 2, 0], 3), &Shape::Float),
            Ok(HostValue::Float(120.0))
        );
    }

    #[test]
    fn float_negative_position_counts_from_the_end() {
        assert_eq!(
            to_host(&float_external(&[1, 2, 3], -1), &Shape::Float),
            Ok(HostValue::Float(12.3))
        );
    }

    #[test]
    fn float_position_out_of_range_is_an_error() {
        assert!(to_host(&float_external(&[1, 2], 5), &Shape::Float).is_err());
        assert!(to_host(&float_external(&[1, 2], -3), &Shape::Float).is_err());
    }

    #[test]
    fn float_shape_must_be_a_pair() {
        assert!(to_host(&Value::Integer(1), &Shape::Float).is_err());
        assert!(to_host(&int_list(&[1, 2, 3]), &Shape::Float).is_err());
        let bad_digits = Value::List(vector![Value::Integer(1), Value::Integer(0)]);
        assert!(to_host(&bad_digits, &Shape::Float).is_err());
    }

    #[test]
    fn float_digits_must_be_decimal() {
        assert!(to_host(&float_external(&[1, 12], 1), &Shape::Float).is_err());
        assert!(to_host(&float_external(&[-1], 1), &Shape::Float).is_err());
    }

    #[test]
    fn integers_pass_where_floats_are_expected() {
        assert_eq!(
            to_external(&HostValue::Integer(3), &Shape::Float),
            Ok(float_external(&[3], 1))
        );
    }

    #[test]
    fn negative_floats_are_not_encodable() {
        assert!(to_external(&HostValue::Float(-1.5), &Shape::Float).is_err());
        assert!(to_external(&HostValue::Float(f64::NAN), &Shape::Float).is_err());
    }

    #[test]
    fn lists_convert_recursively() {
        let shape = Shape::List(Box::new(Shape::List(Box::new(Shape::Integer))));
        let external = Value::List(vector![int_list(&[1]), int_list(&[2, 3])]);
        let host = HostValue::List(vec![
            HostValue::List(vec![HostValue::Integer(1)]),
            HostValue::List(vec![HostValue::Integer(2), HostValue::Integer(3)]),
        ]);
        assert_eq!(to_host(&external, &shape), Ok(host.clone()));
        assert_eq!(to_external(&host, &shape), Ok(external));
    }

    #[test]
    fn tuples_are_positional_and_fixed_arity() {
        let shape = Shape::Tuple(vec![Shape::Str, Shape::Integer]);
        let external = Value::List(vector![int_list(&[111, 107]), Value::Integer(0)]);
        let host = HostValue::Tuple(vec![HostValue::Str("ok".to_string()), HostValue::Integer(0)]);
        assert_eq!(to_host(&external, &shape), Ok(host.clone()));
        assert_eq!(to_external(&host, &shape), Ok(external));

        assert!(to_host(&int_list(&[1]), &shape).is_err());
        assert!(to_external(&HostValue::Tuple(vec![HostValue::Integer(1)]), &shape).is_err());
    }

    #[test]
    fn round_trips_hold_for_every_shape() {
        let cases: Vec<(Shape, HostValue)> = vec![
            (Shape::Integer, HostValue::Integer(-7)),
            (Shape::Boolean, HostValue::Boolean(true)),
            (Shape::Float, HostValue::Float(3.14)),
            (Shape::Str, HostValue::Str("rill".to_string())),
            (
                Shape::List(Box::new(Shape::Integer)),
                HostValue::List(vec![HostValue::Integer(1), HostValue::Integer(2)]),
            ),
            (
                Shape::Tuple(vec![Shape::Str, Shape::Integer]),
                HostValue::Tuple(vec![HostValue::Str("ok".to_string()), HostValue::Integer(0)]),
            ),
        ];
        for (shape, host) in cases {
            let external = to_external(&host, &shape).expect("to_external");
            assert_eq!(to_host(&external, &shape), Ok(host));
        }
    }
}

mod wrapper_tests {
    use super::*;

    fn pair_function() -> HostFunction {
        HostFunction {
            name: "pair".to_string(),
            params: vec![
                HostParam::required("a", Shape::Integer),
                HostParam::optional("b", Shape::Integer, HostValue::Integer(10)),
            ],
            ret: Some(Shape::List(Box::new(Shape::Integer))),
            body: Rc::new(|args| Ok(HostValue::List(args.to_vec()))),
        }
    }

    #[test]
    fn wrapped_function_converts_both_ways() {
        let wrapped = wrap_function(&pair_function());
        let result = (wrapped.func)(&[Value::Integer(1), Value::Integer(2)]).expect("call");
        assert_eq!(result, int_list(&[1, 2]));
    }

    #[test]
    fn missing_optional_arguments_use_defaults() {
        let wrapped = wrap_function(&pair_function());
        let result = (wrapped.func)(&[Value::Integer(1)]).expect("call");
        assert_eq!(result, int_list(&[1, 10]));
    }

    #[test]
    fn arity_is_checked_before_binding() {
        let wrapped = wrap_function(&pair_function());

        let err = (wrapped.func)(&[]).expect_err("too few");
        assert_eq!(err.kind, EvalErrorKind::Arity);
        assert!(err.message.contains("pair"));
        assert!(err.message.contains("between 1 and 2"));

        let args = [Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        let err = (wrapped.func)(&args).expect_err("too many");
        assert_eq!(err.kind, EvalErrorKind::Arity);
    }

    #[test]
    fn argument_shape_mismatch_names_the_argument() {
        let wrapped = wrap_function(&pair_function());
        let err = (wrapped.func)(&[int_list(&[1])]).expect_err("shape mismatch");
        assert_eq!(err.kind, EvalErrorKind::Type);
        assert!(err.message.contains("'a'"));
    }

    #[test]
    fn missing_return_shape_yields_zero() {
        let func = HostFunction {
            name: "fire".to_string(),
            params: vec![],
            ret: None,
            body: Rc::new(|_| Ok(HostValue::Str("ignored".to_string()))),
        };
        let wrapped = wrap_function(&func);
        assert_eq!((wrapped.func)(&[]).expect("call"), Value::Integer(0));
    }
}

mod registry_tests {
    use super::*;

    struct TestCounter {
        value: Cell<i64>,
    }

    impl HostObject for TestCounter {
        fn invoke(&self, method: &str, _args: &[HostValue]) -> Result<HostValue, BridgeError> {
            match method {
                "increment" => {
                    self.value.set(self.value.get() + 1);
                    Ok(HostValue::Integer(self.value.get()))
                }
                "value" => Ok(HostValue::Integer(self.value.get())),
                other => Err(BridgeError::Type(format!(
                    "Counter has no method '{other}'"
                ))),
            }
        }
    }

    fn registry() -> HostRegistry {
        let mut registry = HostRegistry::new();

        let sqrt = HostFunction {
            name: "sqrt".to_string(),
            params: vec![HostParam::required("x", Shape::Float)],
            ret: Some(Shape::Float),
            body: Rc::new(|args| match args.first() {
                Some(HostValue::Float(x)) => Ok(HostValue::Float(x.sqrt())),
                _ => Err(BridgeError::Type("sqrt expects a float".to_string())),
            }),
        };

        let counter = HostClass {
            name: "Counter".to_string(),
            ctor_params: vec![HostParam::optional(
                "start",
                Shape::Integer,
                HostValue::Integer(0),
            )],
            construct: Rc::new(|args| {
                let start = match args.first() {
                    Some(HostValue::Integer(n)) => *n,
                    _ => 0,
                };
                let object: Rc<dyn HostObject> = Rc::new(TestCounter {
                    value: Cell::new(start),
                });
                Ok(object)
            }),
            methods: vec![
                HostMethod {
                    name: "increment".to_string(),
                    params: vec![],
                    ret: Some(Shape::Integer),
                },
                HostMethod {
                    name: "value".to_string(),
                    params: vec![],
                    ret: Some(Shape::Integer),
                },
            ],
        };

        registry.register_module(
            "math",
            HostModule {
                functions: vec![sqrt],
                classes: vec![],
            },
        );
        registry.register_module(
            "util",
            HostModule {
                functions: vec![],
                classes: vec![counter],
            },
        );
        registry
    }

    fn callable(value: &Value, index: usize) -> Rc<crate::interp::ForeignFn> {
        let Value::List(items) = value else {
            panic!("expected a list of callables");
        };
        match items.get(index) {
            Some(Value::Callable(Callable::Foreign(func))) => func.clone(),
            other => panic!("expected a foreign callable, got {other:?}"),
        }
    }

    #[test]
    fn import_functions_wraps_each_requested_name() {
        let registry = registry();
        let imported = registry
            .import_functions("math", &["sqrt".to_string()])
            .expect("import");

        let sqrt = callable(&imported, 0);
        assert_eq!(sqrt.name, "sqrt");
        let result = (sqrt.func)(&[float_external(&[9], 1)]).expect("call");
        assert_eq!(result, float_external(&[3], 1));
    }

    #[test]
    fn import_functions_unknown_names_fail() {
        let registry = registry();
        assert!(registry
            .import_functions("nope", &["sqrt".to_string()])
            .is_err());
        assert!(registry
            .import_functions("math", &["cbrt".to_string()])
            .is_err());
    }

    #[test]
    fn imported_methods_share_one_instance() {
        let registry = registry();
        let imported = registry
            .import_class(
                "util",
                "Counter",
                &[Value::Integer(5)],
                &["increment".to_string(), "value".to_string()],
                None,
            )
            .expect("import");

        let increment = callable(&imported, 0);
        let value = callable(&imported, 1);

        assert_eq!((increment.func)(&[]).expect("call"), Value::Integer(6));
        assert_eq!((increment.func)(&[]).expect("call"), Value::Integer(7));
        assert_eq!((value.func)(&[]).expect("call"), Value::Integer(7));
    }

    #[test]
    fn constructor_arity_is_checked() {
        let registry = registry();
        let err = registry
            .import_class(
                "util",
                "Counter",
                &[Value::Integer(1), Value::Integer(2)],
                &["value".to_string()],
                None,
            )
            .expect_err("too many constructor arguments");
        assert!(matches!(err, BridgeError::Arity { .. }));
    }

    #[test]
    fn unknown_methods_fail() {
        let registry = registry();
        assert!(registry
            .import_class("util", "Counter", &[], &["reset".to_string()], None)
            .is_err());
    }

    #[test]
    fn annotations_override_registered_shapes() {
        let registry = registry();
        let imported = registry
            .import_class(
                "util",
                "Counter",
                &[],
                &["increment".to_string()],
                Some(&[ShapeAnnotation {
                    params: vec![],
                    ret: None,
                }]),
            )
            .expect("import");

        // The override drops the return shape, so the call yields 0 even
        // though the method produced a value.
        let increment = callable(&imported, 0);
        assert_eq!((increment.func)(&[]).expect("call"), Value::Integer(0));
    }
}
