//! Host-side declarations backing foreign imports. Rust has no runtime
//! reflection, so importable modules, classes and their signatures are
//! registered explicitly; the engine only ever sees the opaque wrapped
//! callables produced here.

use im_rc::Vector;
use std::collections::HashMap;
use std::rc::Rc;

use super::{to_external, to_host, BridgeError, HostValue, Shape};
use crate::interp::{Callable, EvalError, ForeignFn, Value};

#[derive(Clone)]
pub struct HostParam {
    pub name: String,
    pub shape: Shape,
    /// A parameter with a default is optional; minimum arity counts only
    /// the parameters without one.
    pub default: Option<HostValue>,
}

impl HostParam {
    pub fn required(name: &str, shape: Shape) -> Self {
        Self {
            name: name.to_string(),
            shape,
            default: None,
        }
    }

    pub fn optional(name: &str, shape: Shape, default: HostValue) -> Self {
        Self {
            name: name.to_string(),
            shape,
            default: Some(default),
        }
    }
}

pub type HostFnBody = Rc<dyn Fn(&[HostValue]) -> Result<HostValue, BridgeError>>;

#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub params: Vec<HostParam>,
    /// No return shape means the call yields Integer 0 to the language.
    pub ret: Option<Shape>,
    pub body: HostFnBody,
}

/// An opaque host instance; bound methods dispatch through it.
pub trait HostObject {
    fn invoke(&self, method: &str, args: &[HostValue]) -> Result<HostValue, BridgeError>;
}

#[derive(Clone)]
pub struct HostMethod {
    pub name: String,
    pub params: Vec<HostParam>,
    pub ret: Option<Shape>,
}

pub type HostCtor = Rc<dyn Fn(&[HostValue]) -> Result<Rc<dyn HostObject>, BridgeError>>;

#[derive(Clone)]
pub struct HostClass {
    pub name: String,
    pub ctor_params: Vec<HostParam>,
    pub construct: HostCtor,
    pub methods: Vec<HostMethod>,
}

#[derive(Default)]
pub struct HostModule {
    pub functions: Vec<HostFunction>,
    pub classes: Vec<HostClass>,
}

/// Per-method shape override for `import_class`: the declared path, taking
/// precedence over the shapes recorded at registration.
#[derive(Clone)]
pub struct ShapeAnnotation {
    pub params: Vec<Shape>,
    pub ret: Option<Shape>,
}

#[derive(Default)]
pub struct HostRegistry {
    modules: HashMap<String, HostModule>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, name: &str, module: HostModule) {
        self.modules.insert(name.to_string(), module);
    }

    /// Import named functions from a host module as a list of wrapped
    /// callables.
    pub fn import_functions(&self, module: &str, names: &[String]) -> Result<Value, BridgeError> {
        let found = self.module(module)?;

        let mut wrapped = Vector::new();
        for name in names {
            let func = found
                .functions
                .iter()
                .find(|f| &f.name == name)
                .ok_or_else(|| {
                    BridgeError::Type(format!("Module '{module}' has no function '{name}'"))
                })?;
            wrapped.push_back(Value::Callable(Callable::Foreign(Rc::new(wrap_function(
                func,
            )))));
        }

        Ok(Value::List(wrapped))
    }

    /// Import a host class: convert the constructor arguments through the
    /// declared shapes, build one instance and return the requested
    /// methods as wrapped callables bound to it.
    pub fn import_class(
        &self,
        module: &str,
        class: &str,
        ctor_args: &[Value],
        methods: &[String],
        annotations: Option<&[ShapeAnnotation]>,
    ) -> Result<Value, BridgeError> {
        let found = self.module(module)?;
        let class_def = found
            .classes
            .iter()
            .find(|c| c.name == class)
            .ok_or_else(|| {
                BridgeError::Type(format!("Module '{module}' has no class '{class}'"))
            })?;

        let host_args = convert_args(class, &class_def.ctor_params, ctor_args)?;
        let instance = (*class_def.construct)(&host_args)?;

        let mut wrapped = Vector::new();
        for (index, method_name) in methods.iter().enumerate() {
            let spec = class_def
                .methods
                .iter()
                .find(|m| &m.name == method_name)
                .ok_or_else(|| {
                    BridgeError::Type(format!("Class '{class}' has no method '{method_name}'"))
                })?;

            let (params, ret) = match annotations.and_then(|all| all.get(index)) {
                Some(annotation) => (
                    annotation
                        .params
                        .iter()
                        .map(|shape| HostParam::required("arg", shape.clone()))
                        .collect(),
                    annotation.ret.clone(),
                ),
                None => (spec.params.clone(), spec.ret.clone()),
            };

            let instance = Rc::clone(&instance);
            let method = spec.name.clone();
            let body: HostFnBody = Rc::new(move |args| instance.invoke(&method, args));

            let foreign = wrap_callable(format!("{class}.{method_name}"), params, ret, body);
            wrapped.push_back(Value::Callable(Callable::Foreign(Rc::new(foreign))));
        }

        Ok(Value::List(wrapped))
    }

    fn module(&self, name: &str) -> Result<&HostModule, BridgeError> {
        self.modules
            .get(name)
            .ok_or_else(|| BridgeError::Type(format!("Unknown host module '{name}'")))
    }
}

/// Wrap a registered host function as an opaque foreign callable.
pub fn wrap_function(func: &HostFunction) -> ForeignFn {
    wrap_callable(
        func.name.clone(),
        func.params.clone(),
        func.ret.clone(),
        func.body.clone(),
    )
}

/// Wrap any host body with the given signature: the returned callable
/// checks arity, converts arguments in, calls, and converts the result
/// back out.
pub fn wrap_callable(
    name: String,
    params: Vec<HostParam>,
    ret: Option<Shape>,
    body: HostFnBody,
) -> ForeignFn {
    let fn_name = name.clone();
    ForeignFn {
        name,
        func: Box::new(move |args: &[Value]| {
            let host_args = convert_args(&fn_name, &params, args).map_err(EvalError::from)?;
            let result = (*body)(&host_args).map_err(EvalError::from)?;
            match &ret {
                Some(shape) => to_external(&result, shape).map_err(EvalError::from),
                None => Ok(Value::Integer(0)),
            }
        }),
    }
}

/// Arity-check `args` against `params`, convert each through its shape and
/// fill trailing defaults.
fn convert_args(
    name: &str,
    params: &[HostParam],
    args: &[Value],
) -> Result<Vec<HostValue>, BridgeError> {
    let min = params.iter().filter(|p| p.default.is_none()).count();
    let max = params.len();
    if args.len() < min || args.len() > max {
        return Err(BridgeError::Arity {
            name: name.to_string(),
            min,
            max,
            given: args.len(),
        });
    }

    let mut converted = Vec::with_capacity(max);
    for (index, param) in params.iter().enumerate() {
        match args.get(index) {
            Some(arg) => converted.push(to_host(arg, &param.shape).map_err(|err| match err {
                BridgeError::Type(message) => {
                    BridgeError::Type(format!("{name}: argument '{}': {message}", param.name))
                }
                other => other,
            })?),
            None => match &param.default {
                Some(default) => converted.push(default.clone()),
                // A required parameter after an optional one; registration
                // bug, surfaced as an arity error.
                None => {
                    return Err(BridgeError::Arity {
                        name: name.to_string(),
                        min,
                        max,
                        given: args.len(),
                    });
                }
            },
        }
    }

    Ok(converted)
}
