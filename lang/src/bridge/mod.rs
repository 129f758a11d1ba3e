//! Marshalling between the language's restricted value space and the
//! richer host types foreign functions work with. Conversion is recursive
//! over a closed shape grammar; anything that does not structurally match
//! its declared shape is a type error.

mod host;

#[cfg(test)]
mod tests;

pub use host::{
    wrap_callable, wrap_function, HostClass, HostCtor, HostFnBody, HostFunction, HostMethod,
    HostModule, HostObject, HostParam, HostRegistry, ShapeAnnotation,
};

use im_rc::{vector, Vector};

use crate::interp::{EvalError, EvalErrorKind, Value};

/// The closed shape grammar foreign signatures are declared in.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Integer,
    /// External integer 0/1.
    Boolean,
    /// External `[[digit…], decimal-position]` pair.
    Float,
    /// External list of character codes.
    Str,
    List(Box<Shape>),
    /// Fixed arity, positional.
    Tuple(Vec<Shape>),
}

/// A host-side value, richer than anything language code can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Integer(i64),
    Boolean(bool),
    Float(f64),
    Str(String),
    List(Vec<HostValue>),
    Tuple(Vec<HostValue>),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Integer(_) => "Integer",
            HostValue::Boolean(_) => "Boolean",
            HostValue::Float(_) => "Float",
            HostValue::Str(_) => "Str",
            HostValue::List(_) => "List",
            HostValue::Tuple(_) => "Tuple",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    Type(String),
    Arity {
        name: String,
        min: usize,
        max: usize,
        given: usize,
    },
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Type(message) => write!(f, "{message}"),
            BridgeError::Arity {
                name,
                min,
                max,
                given,
            } => write!(
                f,
                "'{name}' expects {}, got {given}",
                expected_bounds(*min, *max)
            ),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<BridgeError> for EvalError {
    fn from(err: BridgeError) -> Self {
        // Line 0: the evaluator stamps the call site before surfacing.
        match &err {
            BridgeError::Type(_) => EvalError::new(EvalErrorKind::Type, err.to_string(), 0),
            BridgeError::Arity { .. } => EvalError::new(EvalErrorKind::Arity, err.to_string(), 0),
        }
    }
}

fn expected_bounds(min: usize, max: usize) -> String {
    if min == max {
        format!("{min} argument{}", if min == 1 { "" } else { "s" })
    } else {
        format!("between {min} and {max} arguments")
    }
}

/// Convert an external value into the host value the shape describes.
pub fn to_host(value: &Value, shape: &Shape) -> Result<HostValue, BridgeError> {
    match shape {
        Shape::Integer => match value {
            Value::Integer(n) => Ok(HostValue::Integer(*n)),
            other => Err(mismatch("an integer", "Integer", other)),
        },

        Shape::Boolean => match value {
            Value::Integer(n) => Ok(HostValue::Boolean(*n != 0)),
            other => Err(mismatch("an integer", "Boolean", other)),
        },

        Shape::Float => decode_float(value),

        Shape::Str => match value {
            Value::List(codes) => {
                let mut text = String::with_capacity(codes.len());
                for code in codes.iter() {
                    let Value::Integer(code) = code else {
                        return Err(BridgeError::Type(format!(
                            "Expected a list of character codes for Str, got {} element",
                            code.type_name()
                        )));
                    };
                    let c = u32::try_from(*code)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            BridgeError::Type(format!("Invalid character code {code}"))
                        })?;
                    text.push(c);
                }
                Ok(HostValue::Str(text))
            }
            other => Err(mismatch("a list of character codes", "Str", other)),
        },

        Shape::List(inner) => match value {
            Value::List(items) => {
                let mut converted = Vec::with_capacity(items.len());
                for item in items.iter() {
                    converted.push(to_host(item, inner)?);
                }
                Ok(HostValue::List(converted))
            }
            other => Err(mismatch("a list", "List", other)),
        },

        Shape::Tuple(shapes) => match value {
            Value::List(items) if items.len() == shapes.len() => {
                let mut converted = Vec::with_capacity(items.len());
                for (item, shape) in items.iter().zip(shapes.iter()) {
                    converted.push(to_host(item, shape)?);
                }
                Ok(HostValue::Tuple(converted))
            }
            Value::List(items) => Err(BridgeError::Type(format!(
                "Expected a {}-element list for Tuple, got {} elements",
                shapes.len(),
                items.len()
            ))),
            other => Err(mismatch("a list", "Tuple", other)),
        },
    }
}

/// Convert a host value into its external representation under the shape.
pub fn to_external(value: &HostValue, shape: &Shape) -> Result<Value, BridgeError> {
    match shape {
        Shape::Integer => match value {
            HostValue::Integer(n) => Ok(Value::Integer(*n)),
            other => Err(host_mismatch("Integer", other)),
        },

        Shape::Boolean => match value {
            HostValue::Boolean(b) => Ok(Value::Integer(i64::from(*b))),
            other => Err(host_mismatch("Boolean", other)),
        },

        Shape::Float => {
            let f = match value {
                HostValue::Float(f) => *f,
                HostValue::Integer(n) => *n as f64,
                other => return Err(host_mismatch("Float", other)),
            };
            encode_float(f)
        }

        Shape::Str => match value {
            HostValue::Str(text) => Ok(Value::List(
                text.chars().map(|c| Value::Integer(c as i64)).collect(),
            )),
            other => Err(host_mismatch("Str", other)),
        },

        Shape::List(inner) => match value {
            HostValue::List(items) => {
                let mut converted = Vector::new();
                for item in items {
                    converted.push_back(to_external(item, inner)?);
                }
                Ok(Value::List(converted))
            }
            other => Err(host_mismatch("List", other)),
        },

        Shape::Tuple(shapes) => match value {
            HostValue::Tuple(items) if items.len() == shapes.len() => {
                let mut converted = Vector::new();
                for (item, shape) in items.iter().zip(shapes.iter()) {
                    converted.push_back(to_external(item, shape)?);
                }
                Ok(Value::List(converted))
            }
            HostValue::Tuple(items) => Err(BridgeError::Type(format!(
                "Expected a {}-element tuple, got {} elements",
                shapes.len(),
                items.len()
            ))),
            other => Err(host_mismatch("Tuple", other)),
        },
    }
}

/// `[[digit…], decimal-position]` to a host float. The digit list holds
/// the significant digits; the position is the index the decimal point
/// falls at, negative meaning "from the end". Empty digits encode zero.
fn decode_float(value: &Value) -> Result<HostValue, BridgeError> {
    let Value::List(parts) = value else {
        return Err(mismatch("[digits, decimal-position]", "Float", value));
    };
    if parts.len() != 2 {
        return Err(BridgeError::Type(
            "Expected [digits, decimal-position] for Float".to_string(),
        ));
    }

    let Some(Value::List(digits)) = parts.get(0) else {
        return Err(BridgeError::Type(
            "Float digits must be a list of integers".to_string(),
        ));
    };
    let Some(Value::Integer(position)) = parts.get(1) else {
        return Err(BridgeError::Type(
            "Float decimal position must be an integer".to_string(),
        ));
    };

    let mut text = String::with_capacity(digits.len());
    for digit in digits.iter() {
        match digit {
            Value::Integer(d) if (0..=9).contains(d) => {
                text.push((b'0' + *d as u8) as char);
            }
            _ => {
                return Err(BridgeError::Type(
                    "Float digits must be integers between 0 and 9".to_string(),
                ));
            }
        }
    }

    if text.is_empty() {
        return Ok(HostValue::Float(0.0));
    }

    let len = text.len() as i64;
    let position = if *position < 0 {
        len + position
    } else {
        *position
    };
    if !(0..=len).contains(&position) {
        return Err(BridgeError::Type("Invalid decimal position".to_string()));
    }
    let position = position as usize;

    let rendered = if position == 0 {
        format!("0.{text}")
    } else if position == text.len() {
        text
    } else {
        format!("{}.{}", &text[..position], &text[position..])
    };

    rendered
        .parse()
        .map(HostValue::Float)
        .map_err(|_| BridgeError::Type(format!("Invalid float encoding: {rendered}")))
}

/// A host float to `[[digit…], decimal-position]`. Renders with six
/// decimal places then strips trailing zeros, matching the precision the
/// encoding is defined over. The encoding has no sign, so negative floats
/// are not representable.
fn encode_float(f: f64) -> Result<Value, BridgeError> {
    if !f.is_finite() {
        return Err(BridgeError::Type(
            "Cannot encode a non-finite float".to_string(),
        ));
    }
    if f < 0.0 {
        return Err(BridgeError::Type(
            "Cannot encode a negative float".to_string(),
        ));
    }
    if f == 0.0 {
        return Ok(Value::List(vector![
            Value::List(Vector::new()),
            Value::Integer(0)
        ]));
    }

    let rendered = format!("{f:.6}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');

    let position = rendered.find('.').unwrap_or(rendered.len());
    let digits: Vector<Value> = rendered
        .chars()
        .filter(char::is_ascii_digit)
        .map(|c| Value::Integer(i64::from(c as u8 - b'0')))
        .collect();

    Ok(Value::List(vector![
        Value::List(digits),
        Value::Integer(position as i64)
    ]))
}

fn mismatch(expected: &str, shape: &str, got: &Value) -> BridgeError {
    BridgeError::Type(format!(
        "Expected {expected} for {shape}, got {}",
        got.type_name()
    ))
}

fn host_mismatch(shape: &str, got: &HostValue) -> BridgeError {
    BridgeError::Type(format!("Expected {shape}, got {}", got.type_name()))
}
