use im_rc::Vector;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::evaluator::EvalError;
use super::sequence::LazySequence;
use crate::parser::ast::Block;

/// Runtime value. Every value a program can observe is one of these five
/// variants; the bridge's richer host types never leak through.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),

    /// Ordered, finite, persistent.
    List(Vector<Value>),

    /// Cache-backed wrapper around a possibly-infinite producer. Copies of
    /// the value share the cache.
    LazySequence(Rc<RefCell<LazySequence>>),

    /// A reference to something invocable, either user-defined or foreign.
    Callable(Callable),

    /// A prepared call: callable name plus pre-evaluated arguments, waiting
    /// for an apply marker.
    Deferred { name: String, args: Vector<Value> },
}

#[derive(Debug, Clone)]
pub enum Callable {
    User(Rc<UserFunction>),
    Foreign(Rc<ForeignFn>),
}

#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    /// The single formal argument; calls bind the whole argument list to it.
    pub arg: String,
    pub body: Block,
}

/// An opaque host callable. The wrapped closure receives the call's
/// argument list and performs its own arity and shape checking.
pub struct ForeignFn {
    pub name: String,
    pub func: Box<dyn Fn(&[Value]) -> Result<Value, EvalError>>,
}

impl fmt::Debug for ForeignFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignFn").field("name", &self.name).finish()
    }
}

impl Value {
    /// Truthiness: a nonzero integer or a nonempty list. Everything else,
    /// sequences and callables included, is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::List(items) => !items.is_empty(),
            Value::LazySequence(_) | Value::Callable(_) | Value::Deferred { .. } => false,
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::List(_) => "List",
            Value::LazySequence(_) => "LazySequence",
            Value::Callable(_) => "Callable",
            Value::Deferred { .. } => "DeferredCall",
        }
    }
}

/// Structural equality; sequences and user functions compare by identity,
/// foreign functions by name.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::LazySequence(a), Value::LazySequence(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (
                Value::Deferred { name: n1, args: a1 },
                Value::Deferred { name: n2, args: a2 },
            ) => n1 == n2 && a1 == a2,
            // Different types are never equal
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::User(a), Callable::User(b)) => Rc::ptr_eq(a, b),
            (Callable::Foreign(a), Callable::Foreign(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::List(elements) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::LazySequence(seq) => {
                let seq = seq.borrow();
                write!(f, "[")?;
                if seq.exhausted {
                    for (i, elem) in seq.cache.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{elem}")?;
                    }
                } else {
                    // Preview the realized prefix only; the producer is
                    // never driven by display.
                    for elem in seq.cache.iter().take(3) {
                        write!(f, "{elem}, ")?;
                    }
                    write!(f, "..")?;
                }
                write!(f, "]")
            }
            Value::Callable(Callable::User(func)) => write!(f, "<function {}>", func.name),
            Value::Callable(Callable::Foreign(func)) => {
                write!(f, "<external-function {}>", func.name)
            }
            Value::Deferred { name, args } => write!(f, "<prepared {name}/{}>", args.len()),
        }
    }
}
