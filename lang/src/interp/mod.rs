mod evaluator;
mod ops;
mod scope;
mod sequence;
mod specials;
mod value;


pub use evaluator::{EvalError, EvalErrorKind, Interpreter};
pub use sequence::{LazySequence, PiSpigot, Producer};
pub use specials::{process_special, INFINITY};
pub use value::{Callable, ForeignFn, UserFunction, Value};
