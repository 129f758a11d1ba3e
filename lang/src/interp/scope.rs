use std::collections::HashMap;
use std::rc::Rc;

use super::value::{UserFunction, Value};
use crate::parser::ast::Block;

/// The interpreter's process-wide mutable state: one dynamically-scoped
/// variable table (no lexical nesting), the definition tables, the
/// literal-patch table and the loop break flag. Single-writer by
/// construction; nothing here is shared across threads.
#[derive(Debug, Default)]
pub struct Scope {
    pub variables: HashMap<String, Value>,
    pub functions: HashMap<String, Rc<UserFunction>>,
    pub macros: HashMap<String, MacroDef>,
    /// Literal source text (e.g. `"2"`) to the value every future
    /// evaluation of that literal yields.
    pub literal_patches: HashMap<String, Value>,
    pub break_flag: bool,
}

#[derive(Debug)]
pub struct MacroDef {
    pub body: Block,
    /// Whether the body ran at definition time (it does unless the
    /// definition was marked delayed).
    pub auto_run: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` for the duration of a call, returning whatever it
    /// shadowed. The name stays globally visible while the call runs;
    /// this is save/restore shadowing, not a new scope frame.
    pub fn shadow(&mut self, name: &str, value: Value) -> Option<Value> {
        self.variables.insert(name.to_string(), value)
    }

    /// Undo a `shadow`, reinstating the previous binding if there was one.
    pub fn unshadow(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.variables.insert(name.to_string(), value);
            }
            None => {
                self.variables.remove(name);
            }
        }
    }
}
