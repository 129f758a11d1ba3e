//! The foreign-function table and host registry for the CLI runtime. The
//! engine only consults the table; everything here is populated outside it.

use lang::bridge::{
    to_host, wrap_function, BridgeError, HostClass, HostFunction, HostMethod, HostModule,
    HostObject, HostParam, HostRegistry, HostValue, Shape,
};
use lang::interp::{EvalError, Interpreter, LazySequence, PiSpigot, Producer, Value};
use std::cell::Cell;
use std::process::Command;
use std::rc::Rc;

pub fn install(interp: &mut Interpreter) {
    let registry = Rc::new(default_registry());

    // Builtins go through the bridge like any other host function.
    interp.register_foreign(wrap_function(&print_function()));
    interp.register_foreign(wrap_function(&uppercase_function()));
    interp.register_foreign(wrap_function(&system_function()));

    let reg = Rc::clone(&registry);
    interp.register_external("importpy", move |args| importpy(&reg, args));

    let reg = Rc::clone(&registry);
    interp.register_external("importpyclass", move |args| importpyclass(&reg, args));

    interp.define_variable(
        "pi",
        LazySequence::new(Producer::PiDigits(PiSpigot::new())).into_value(),
    );
}

fn print_function() -> HostFunction {
    HostFunction {
        name: "print".to_string(),
        params: vec![HostParam::required("text", Shape::Str)],
        ret: None,
        body: Rc::new(|args| match args.first() {
            Some(HostValue::Str(text)) => {
                println!("{text}");
                Ok(HostValue::Integer(0))
            }
            _ => Err(BridgeError::Type("print expects a string".to_string())),
        }),
    }
}

fn uppercase_function() -> HostFunction {
    HostFunction {
        name: "uppercase".to_string(),
        params: vec![HostParam::required("text", Shape::Str)],
        ret: Some(Shape::Str),
        body: Rc::new(|args| match args.first() {
            Some(HostValue::Str(text)) => Ok(HostValue::Str(text.to_uppercase())),
            _ => Err(BridgeError::Type("uppercase expects a string".to_string())),
        }),
    }
}

/// Run a command vector, returning (stdout, stderr, exit code).
fn system_function() -> HostFunction {
    HostFunction {
        name: "system".to_string(),
        params: vec![HostParam::required(
            "command",
            Shape::List(Box::new(Shape::Str)),
        )],
        ret: Some(Shape::Tuple(vec![Shape::Str, Shape::Str, Shape::Integer])),
        body: Rc::new(|args| {
            let Some(HostValue::List(parts)) = args.first() else {
                return Err(BridgeError::Type(
                    "system expects a list of strings".to_string(),
                ));
            };

            let mut argv = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    HostValue::Str(text) => argv.push(text.clone()),
                    _ => {
                        return Err(BridgeError::Type(
                            "system expects a list of strings".to_string(),
                        ));
                    }
                }
            }
            if argv.is_empty() {
                return Err(BridgeError::Type(
                    "system expects a non-empty command".to_string(),
                ));
            }

            let output = Command::new(&argv[0])
                .args(&argv[1..])
                .output()
                .map_err(|e| BridgeError::Type(format!("Failed to run '{}': {}", argv[0], e)))?;

            Ok(HostValue::Tuple(vec![
                HostValue::Str(String::from_utf8_lossy(&output.stdout).to_string()),
                HostValue::Str(String::from_utf8_lossy(&output.stderr).to_string()),
                HostValue::Integer(i64::from(output.status.code().unwrap_or(-1))),
            ]))
        }),
    }
}

fn default_registry() -> HostRegistry {
    let mut registry = HostRegistry::new();

    registry.register_module(
        "math",
        HostModule {
            functions: vec![
                HostFunction {
                    name: "sqrt".to_string(),
                    params: vec![HostParam::required("x", Shape::Float)],
                    ret: Some(Shape::Float),
                    body: Rc::new(|args| match args.first() {
                        Some(HostValue::Float(x)) => Ok(HostValue::Float(x.sqrt())),
                        _ => Err(BridgeError::Type("sqrt expects a float".to_string())),
                    }),
                },
                HostFunction {
                    name: "pow".to_string(),
                    params: vec![
                        HostParam::required("base", Shape::Float),
                        HostParam::required("exponent", Shape::Float),
                    ],
                    ret: Some(Shape::Float),
                    body: Rc::new(|args| match (args.first(), args.get(1)) {
                        (Some(HostValue::Float(base)), Some(HostValue::Float(exponent))) => {
                            Ok(HostValue::Float(base.powf(*exponent)))
                        }
                        _ => Err(BridgeError::Type("pow expects two floats".to_string())),
                    }),
                },
            ],
            classes: vec![],
        },
    );

    registry.register_module(
        "os",
        HostModule {
            functions: vec![HostFunction {
                name: "getpid".to_string(),
                params: vec![],
                ret: Some(Shape::Integer),
                body: Rc::new(|_| Ok(HostValue::Integer(std::process::id() as i64))),
            }],
            classes: vec![],
        },
    );

    registry.register_module(
        "util",
        HostModule {
            functions: vec![],
            classes: vec![counter_class()],
        },
    );

    registry
}

struct Counter {
    value: Cell<i64>,
}

impl HostObject for Counter {
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

fn counter_class() -> HostClass {
    HostClass {
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
            let object: Rc<dyn HostObject> = Rc::new(Counter {
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
    }
}

fn importpy(registry: &HostRegistry, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(arity_error("importpy", 2, args.len()));
    }
    let module = host_string(&args[0], "importpy module name")?;
    let names = host_strings(&args[1], "importpy function names")?;
    registry
        .import_functions(&module, &names)
        .map_err(EvalError::from)
}

fn importpyclass(registry: &HostRegistry, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 4 {
        return Err(arity_error("importpyclass", 4, args.len()));
    }
    let module = host_string(&args[0], "importpyclass module name")?;
    let class = host_string(&args[1], "importpyclass class name")?;
    let ctor_args: Vec<Value> = match &args[2] {
        Value::List(items) => items.iter().cloned().collect(),
        other => {
            return Err(EvalError::type_mismatch(
                format!(
                    "importpyclass constructor arguments must be a list, got {}",
                    other.type_name()
                ),
                0,
            ));
        }
    };
    let methods = host_strings(&args[3], "importpyclass method names")?;
    registry
        .import_class(&module, &class, &ctor_args, &methods, None)
        .map_err(EvalError::from)
}

fn arity_error(name: &str, expected: usize, given: usize) -> EvalError {
    BridgeError::Arity {
        name: name.to_string(),
        min: expected,
        max: expected,
        given,
    }
    .into()
}

fn host_string(value: &Value, what: &str) -> Result<String, EvalError> {
    match to_host(value, &Shape::Str) {
        Ok(HostValue::Str(text)) => Ok(text),
        Ok(_) | Err(_) => Err(EvalError::type_mismatch(
            format!("{what} must be a string (a list of character codes)"),
            0,
        )),
    }
}

fn host_strings(value: &Value, what: &str) -> Result<Vec<String>, EvalError> {
    match to_host(value, &Shape::List(Box::new(Shape::Str))) {
        Ok(HostValue::List(items)) => {
            let mut strings = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    HostValue::Str(text) => strings.push(text),
                    _ => {
                        return Err(EvalError::type_mismatch(
                            format!("{what} must be a list of strings"),
                            0,
                        ));
                    }
                }
            }
            Ok(strings)
        }
        _ => Err(EvalError::type_mismatch(
            format!("{what} must be a list of strings"),
            0,
        )),
    }
}
