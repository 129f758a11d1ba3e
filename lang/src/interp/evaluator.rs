use im_rc::Vector;
use std::collections::HashMap;
use std::rc::Rc;

use super::scope::{MacroDef, Scope};
use super::sequence::{LazySequence, Producer};
use super::specials::process_special;
use super::value::{Callable, ForeignFn, UserFunction, Value};
use crate::lexer::Span;
use crate::parser::ast::{
    AssignTarget, BinOp, ChainItem, Consequent, Expr, Program, SpannedExpr, SpannedStmt,
    SpannedTerm, Stmt, Term,
};

/// Fatal evaluation error. The engine never catches and continues: any of
/// these aborts the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// Undefined function or variable reference.
    Name,
    /// Operator or shape mismatch.
    Type,
    /// Foreign call with too few or too many positional arguments.
    Arity,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn name(message: impl Into<String>, line: u32) -> Self {
        Self::new(EvalErrorKind::Name, message, line)
    }

    pub fn type_mismatch(message: impl Into<String>, line: u32) -> Self {
        Self::new(EvalErrorKind::Type, message, line)
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EvalErrorKind::Name => "Name error",
            EvalErrorKind::Type => "Type error",
            EvalErrorKind::Arity => "Arity error",
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}: {}", self.kind_label(), self.line, self.message)
    }
}

impl std::error::Error for EvalError {}

/// Where program output goes. Tests capture it; the CLI writes through.
enum OutputSink {
    Stdout,
    Capture(Vec<String>),
}

/// Tree-walking interpreter: statement dispatcher, expression evaluator
/// and the owner of all scope state. One instance per program run (the
/// REPL keeps one alive across lines).
pub struct Interpreter {
    pub(super) scope: Scope,
    pub(super) externals: HashMap<String, Rc<ForeignFn>>,
    sink: OutputSink,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            scope: Scope::new(),
            externals: HashMap::new(),
            sink: OutputSink::Stdout,
        }
    }

    /// An interpreter whose print output is buffered instead of written to
    /// stdout. Used by tests.
    pub fn with_captured_output() -> Self {
        Self {
            scope: Scope::new(),
            externals: HashMap::new(),
            sink: OutputSink::Capture(Vec::new()),
        }
    }

    pub fn captured_output(&self) -> &[String] {
        match &self.sink {
            OutputSink::Capture(lines) => lines,
            OutputSink::Stdout => &[],
        }
    }

    /// Register a foreign function under `name`. The foreign table is
    /// consulted before user definitions on every call.
    pub fn register_external<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        self.externals.insert(
            name.to_string(),
            Rc::new(ForeignFn {
                name: name.to_string(),
                func: Box::new(func),
            }),
        );
    }

    /// Register an already-wrapped foreign function.
    pub fn register_foreign(&mut self, func: ForeignFn) {
        self.externals.insert(func.name.clone(), Rc::new(func));
    }

    pub fn define_variable(&mut self, name: &str, value: Value) {
        self.scope.variables.insert(name.to_string(), value);
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.scope.variables.get(name).cloned()
    }

    /// Execute a whole program, returning the value of the last directly
    /// executed print/expression/assignment statement (Integer 0 if none).
    pub fn run(&mut self, program: &Program) -> Result<Value, EvalError> {
        self.exec_statements(&program.statements)
    }

    /// Execute a statement list. Blocks and the top level share this; the
    /// returned value is what makes a function body yield a result.
    pub(super) fn exec_statements(&mut self, stmts: &[SpannedStmt]) -> Result<Value, EvalError> {
        let mut last = Value::Integer(0);
        for stmt in stmts {
            if self.scope.break_flag {
                break;
            }
            if let Some(value) = self.exec_statement(stmt)? {
                last = value;
            }
        }
        Ok(last)
    }

    /// Execute one statement. Returns Some for the statement kinds that
    /// contribute to a block's result.
    fn exec_statement(&mut self, stmt: &SpannedStmt) -> Result<Option<Value>, EvalError> {
        match &stmt.node {
            Stmt::Assignment { value, target } => {
                let value = self.eval_expression(value)?;
                match target {
                    AssignTarget::Literal(text) => {
                        self.scope
                            .literal_patches
                            .insert(text.clone(), value.clone());
                    }
                    AssignTarget::Variable(name) => {
                        self.scope.variables.insert(name.clone(), value.clone());
                    }
                }
                Ok(Some(value))
            }

            Stmt::Print { expr, marks } => {
                let value = self.eval_expression(expr)?;
                if *marks > 1 {
                    self.emit(format!(">> {value}"));
                } else {
                    self.emit(value.to_string());
                }
                Ok(Some(value))
            }

            Stmt::PrintNewline { marks } => {
                for _ in 0..*marks {
                    self.emit(String::new());
                }
                Ok(None)
            }

            Stmt::Expr(expr) => Ok(Some(self.eval_expression(expr)?)),

            Stmt::Loop {
                var,
                iterable,
                body,
                ..
            } => {
                self.exec_loop(var, iterable, body)?;
                Ok(None)
            }

            Stmt::Conditional {
                condition,
                consequent,
            } => {
                let condition = self.eval_expression(condition)?;
                if condition.is_truthy() {
                    match consequent {
                        Consequent::Break => self.scope.break_flag = true,
                        Consequent::Stmt(inner) => {
                            self.exec_statement(inner)?;
                        }
                    }
                }
                Ok(None)
            }

            Stmt::FuncDef { arg, body, name } => {
                self.scope.functions.insert(
                    name.clone(),
                    Rc::new(UserFunction {
                        name: name.clone(),
                        arg: arg.clone(),
                        body: body.clone(),
                    }),
                );
                Ok(None)
            }

            Stmt::CodeblockDef {
                name,
                delayed,
                body,
            } => {
                let def = MacroDef {
                    body: body.clone(),
                    auto_run: !delayed,
                };
                let run_now = def.auto_run;
                self.scope.macros.insert(name.clone(), def);
                if run_now {
                    self.exec_statements(body)?;
                }
                Ok(None)
            }

            Stmt::CodeblockRun { name } => {
                // Running an unknown codeblock is a no-op.
                if let Some(def) = self.scope.macros.get(name) {
                    let body = def.body.clone();
                    self.exec_statements(&body)?;
                }
                Ok(None)
            }
        }
    }

    fn exec_loop(
        &mut self,
        var: &str,
        iterable: &SpannedExpr,
        body: &[SpannedStmt],
    ) -> Result<(), EvalError> {
        let span = iterable.span;
        match self.eval_expression(iterable)? {
            Value::List(items) => {
                for item in items.iter() {
                    self.scope.variables.insert(var.to_string(), item.clone());
                    self.exec_statements(body)?;
                    if self.scope.break_flag {
                        self.scope.break_flag = false;
                        break;
                    }
                }
            }
            Value::LazySequence(seq) => {
                // Drive the producer one element at a time; never realize
                // beyond the current position.
                let mut index = 0;
                loop {
                    let Some(item) = self.sequence_next(&seq, index, span)? else {
                        break;
                    };
                    self.scope.variables.insert(var.to_string(), item);
                    self.exec_statements(body)?;
                    if self.scope.break_flag {
                        self.scope.break_flag = false;
                        break;
                    }
                    index += 1;
                }
            }
            // Anything else iterates zero times.
            _ => {}
        }
        Ok(())
    }

    /// Evaluate an expression chain. If any operator in the chain is
    /// spaced, the whole chain uses conventional precedence; otherwise it
    /// folds strictly left to right.
    pub(super) fn eval_expression(&mut self, expr: &SpannedExpr) -> Result<Value, EvalError> {
        let chain = &expr.node;
        let precedence_mode = chain
            .rest
            .iter()
            .any(|item| matches!(item, ChainItem::Op { spaced: true, .. }));

        if precedence_mode {
            self.eval_precedence_chain(chain)
        } else {
            self.eval_sequential_chain(chain)
        }
    }

    fn eval_sequential_chain(&mut self, chain: &Expr) -> Result<Value, EvalError> {
        let mut left = self.eval_term(&chain.first)?;

        for item in &chain.rest {
            match item {
                ChainItem::Apply { span } => {
                    left = self.apply(left, *span)?;
                }
                ChainItem::Op { op, term, .. } => {
                    let right = self.eval_term(term)?;
                    left = self.binary_op(*op, left, right, term.span)?;
                }
            }
        }

        Ok(left)
    }

    /// Two-stack operator-precedence pass over already-evaluated operand
    /// values. Operands are still evaluated left to right; only the order
    /// the operators combine them changes.
    fn eval_precedence_chain(&mut self, chain: &Expr) -> Result<Value, EvalError> {
        let mut operands = vec![self.eval_term(&chain.first)?];
        let mut operators: Vec<(BinOp, Span)> = Vec::new();

        for item in &chain.rest {
            match item {
                ChainItem::Apply { span } => {
                    // The apply marker is not a binary operator: it acts on
                    // the most recent operand immediately.
                    if let Some(value) = operands.pop() {
                        let applied = self.apply(value, *span)?;
                        operands.push(applied);
                    }
                }
                ChainItem::Op { op, term, .. } => {
                    while let Some(&(top, _)) = operators.last() {
                        if precedence(top) >= precedence(*op) {
                            self.reduce(&mut operands, &mut operators)?;
                        } else {
                            break;
                        }
                    }
                    operators.push((*op, term.span));
                    operands.push(self.eval_term(term)?);
                }
            }
        }

        while !operators.is_empty() {
            self.reduce(&mut operands, &mut operators)?;
        }

        Ok(operands.pop().unwrap_or(Value::Integer(0)))
    }

    fn reduce(
        &mut self,
        operands: &mut Vec<Value>,
        operators: &mut Vec<(BinOp, Span)>,
    ) -> Result<(), EvalError> {
        if let (Some((op, span)), Some(right)) = (operators.pop(), operands.pop()) {
            if let Some(left) = operands.pop() {
                operands.push(self.binary_op(op, left, right, span)?);
            }
        }
        Ok(())
    }

    fn eval_term(&mut self, term: &SpannedTerm) -> Result<Value, EvalError> {
        let span = term.span;
        match &term.node {
            Term::Number { text, value } => Ok(self
                .scope
                .literal_patches
                .get(text)
                .cloned()
                .unwrap_or(Value::Integer(*value))),

            Term::Variable(name) => self.lookup(name, span),

            Term::Str { value, reversed } => {
                let codes: Vector<Value> = if *reversed {
                    value.chars().rev().map(|c| Value::Integer(c as i64)).collect()
                } else {
                    value.chars().map(|c| Value::Integer(c as i64)).collect()
                };
                Ok(Value::List(codes))
            }

            Term::Special(code) => Ok(Value::Integer(process_special(*code))),

            Term::List(elements) => {
                let mut items = Vector::new();
                for element in elements {
                    items.push_back(self.eval_expression(element)?);
                }
                Ok(Value::List(items))
            }

            Term::GenConst(value) => {
                let value = self.eval_expression(value)?;
                Ok(LazySequence::new(Producer::Repeat(value)).into_value())
            }

            Term::GenArith(first, second) => {
                let start = self.expect_integer(first, "generator start")?;
                let second = self.expect_integer(second, "generator second element")?;
                Ok(LazySequence::new(Producer::Arithmetic {
                    next: start,
                    step: second.wrapping_sub(start),
                })
                .into_value())
            }

            Term::GenFunc { seeds, func } => {
                // Seeds are realized up front: they form the initial cache
                // the recurrence accumulates onto.
                let mut cache = Vector::new();
                for seed in seeds {
                    cache.push_back(self.eval_expression(seed)?);
                }
                Ok(LazySequence::with_prefix(
                    cache,
                    Producer::Recurrence { func: func.clone() },
                )
                .into_value())
            }

            Term::Group(expr) => self.eval_expression(expr),

            Term::FuncPrep { args, name } => {
                let mut evaluated = Vector::new();
                for arg in args {
                    evaluated.push_back(self.eval_expression(arg)?);
                }
                Ok(Value::Deferred {
                    name: name.clone(),
                    args: evaluated,
                })
            }
        }
    }

    fn expect_integer(&mut self, expr: &SpannedExpr, what: &str) -> Result<i64, EvalError> {
        match self.eval_expression(expr)? {
            Value::Integer(n) => Ok(n),
            other => Err(EvalError::type_mismatch(
                format!("{what} must be an integer, got {}", other.type_name()),
                expr.span.line,
            )),
        }
    }

    fn lookup(&mut self, name: &str, span: Span) -> Result<Value, EvalError> {
        if let Some(value) = self.scope.variables.get(name) {
            return Ok(value.clone());
        }
        // A name that refers to a definition evaluates to a callable
        // reference, ready for an apply marker or a generator rule.
        if let Some(func) = self.scope.functions.get(name) {
            return Ok(Value::Callable(Callable::User(func.clone())));
        }
        if let Some(func) = self.externals.get(name) {
            return Ok(Value::Callable(Callable::Foreign(func.clone())));
        }
        Err(EvalError::name(
            format!("Variable '{name}' is not defined"),
            span.line,
        ))
    }

    /// The apply marker: invoke a prepared call now, or a bare callable
    /// reference with no arguments.
    pub(super) fn apply(&mut self, value: Value, span: Span) -> Result<Value, EvalError> {
        match value {
            Value::Deferred { name, args } => self.call_function(&name, args, span),
            Value::Callable(callable) => self.call_callable(&callable, Vector::new(), span),
            other => Err(EvalError::type_mismatch(
                format!("Cannot apply {}: not a prepared call or function", other.type_name()),
                span.line,
            )),
        }
    }

    /// Call by name: foreign table first, then user functions, then a
    /// variable holding a callable reference.
    pub(super) fn call_function(
        &mut self,
        name: &str,
        args: Vector<Value>,
        span: Span,
    ) -> Result<Value, EvalError> {
        if let Some(func) = self.externals.get(name) {
            let func = func.clone();
            return self.call_foreign(&func, &args, span);
        }
        if let Some(func) = self.scope.functions.get(name) {
            let func = func.clone();
            return self.call_user(&func, args);
        }
        if let Some(Value::Callable(callable)) = self.scope.variables.get(name) {
            let callable = callable.clone();
            return self.call_callable(&callable, args, span);
        }
        Err(EvalError::name(
            format!("Function '{name}' is not defined"),
            span.line,
        ))
    }

    fn call_callable(
        &mut self,
        callable: &Callable,
        args: Vector<Value>,
        span: Span,
    ) -> Result<Value, EvalError> {
        match callable {
            Callable::User(func) => self.call_user(func, args),
            Callable::Foreign(func) => self.call_foreign(func, &args, span),
        }
    }

    /// A user function call: the whole argument list binds to the one
    /// formal argument, shadowing any existing binding of that name for
    /// the duration of the call.
    fn call_user(&mut self, func: &Rc<UserFunction>, args: Vector<Value>) -> Result<Value, EvalError> {
        let previous = self.scope.shadow(&func.arg, Value::List(args));
        let result = self.exec_statements(&func.body);
        self.scope.unshadow(&func.arg, previous);
        result
    }

    fn call_foreign(
        &mut self,
        func: &Rc<ForeignFn>,
        args: &Vector<Value>,
        span: Span,
    ) -> Result<Value, EvalError> {
        let argv: Vec<Value> = args.iter().cloned().collect();
        (func.func)(&argv).map_err(|mut err| {
            // Wrappers report line 0; stamp the call site.
            if err.line == 0 {
                err.line = span.line;
            }
            err
        })
    }

    pub(super) fn emit(&mut self, line: String) {
        match &mut self.sink {
            OutputSink::Stdout => println!("{line}"),
            OutputSink::Capture(lines) => lines.push(line),
        }
    }
}

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Index => 4,
        BinOp::Mul | BinOp::Div => 3,
        BinOp::Add | BinOp::Sub => 2,
        BinOp::Eq => 1,
    }
}
