use im_rc::Vector;
use std::cell::RefCell;
use std::rc::Rc;

use super::evaluator::{EvalError, Interpreter};
use super::sequence::{LazySequence, Producer};
use super::value::Value;
use crate::lexer::Span;
use crate::parser::ast::BinOp;

impl Interpreter {
    pub(super) fn binary_op(
        &mut self,
        op: BinOp,
        left: Value,
        right: Value,
        span: Span,
    ) -> Result<Value, EvalError> {
        match op {
            BinOp::Add => self.op_add(left, right, span),
            BinOp::Sub => op_sub(left, right, span),
            BinOp::Mul => self.op_mul(left, right, span),
            BinOp::Div => op_div(left, right, span),
            BinOp::Eq => Ok(Value::Integer(i64::from(left == right))),
            BinOp::Index => self.op_index(left, right, span),
        }
    }

    fn op_add(&mut self, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(b))),
            (Value::List(a), Value::List(b)) => {
                let mut result = a;
                result.append(b);
                Ok(Value::List(result))
            }
            // Seeding: the list becomes the sequence's initial realized
            // prefix, composing concrete starting values with a generator.
            (Value::List(a), Value::LazySequence(seq)) => {
                Ok(LazySequence::seeded(a, &seq.borrow()).into_value())
            }
            (left, right) => Err(type_error(
                format!("Cannot add {} and {}", left.type_name(), right.type_name()),
                span,
            )),
        }
    }

    fn op_mul(&mut self, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
        match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(b))),
            // Element-wise product, truncated to the shorter operand.
            (Value::List(a), Value::List(b)) => {
                let mut result = Vector::new();
                for (x, y) in a.iter().zip(b.iter()) {
                    result.push_back(self.op_mul(x.clone(), y.clone(), span)?);
                }
                Ok(Value::List(result))
            }
            // List repetition; zero or negative counts give the empty list.
            (Value::List(a), Value::Integer(n)) => {
                let mut result = Vector::new();
                for _ in 0..n.max(0) {
                    result.append(a.clone());
                }
                Ok(Value::List(result))
            }
            (left, right) => Err(type_error(
                format!(
                    "Cannot multiply {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
                span,
            )),
        }
    }

    /// `[]>`: the left operand is the index, the right the collection.
    fn op_index(&mut self, left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
        let index = match left {
            Value::Integer(n) => n,
            other => {
                return Err(type_error(
                    format!("Index must be an integer, got {}", other.type_name()),
                    span,
                ));
            }
        };

        match right {
            Value::List(items) => {
                let len = items.len() as i64;
                // Negative indices count from the end; anything out of
                // range degrades to 0 rather than failing.
                let effective = if index < 0 { len + index } else { index };
                if (0..len).contains(&effective) {
                    Ok(items
                        .get(effective as usize)
                        .cloned()
                        .unwrap_or(Value::Integer(0)))
                } else {
                    Ok(Value::Integer(0))
                }
            }
            Value::LazySequence(seq) => self.sequence_index(&seq, index, span),
            other => Err(type_error(
                format!("Cannot index into {}", other.type_name()),
                span,
            )),
        }
    }

    /// Indexed access into a sequence, driving the producer as needed.
    /// Negative indices and indices beyond exhaustion yield 0.
    pub(super) fn sequence_index(
        &mut self,
        seq: &Rc<RefCell<LazySequence>>,
        index: i64,
        span: Span,
    ) -> Result<Value, EvalError> {
        if index < 0 {
            return Ok(Value::Integer(0));
        }
        let index = index as usize;
        self.realize(seq, index + 1, span)?;
        let seq = seq.borrow();
        Ok(seq.cache.get(index).cloned().unwrap_or(Value::Integer(0)))
    }

    /// The next element for loop iteration, or None once the sequence is
    /// exhausted at `index`.
    pub(super) fn sequence_next(
        &mut self,
        seq: &Rc<RefCell<LazySequence>>,
        index: usize,
        span: Span,
    ) -> Result<Option<Value>, EvalError> {
        self.realize(seq, index + 1, span)?;
        let seq = seq.borrow();
        Ok(seq.cache.get(index).cloned())
    }

    /// Drive the producer until at least `want` elements are cached or the
    /// producer terminates. Recurrence steps call back into the evaluator,
    /// so the cell must not stay borrowed across them.
    fn realize(
        &mut self,
        seq: &Rc<RefCell<LazySequence>>,
        want: usize,
        span: Span,
    ) -> Result<(), EvalError> {
        loop {
            let (func, args, expected_len) = {
                let mut guard = seq.borrow_mut();
                let LazySequence {
                    cache,
                    producer,
                    exhausted,
                } = &mut *guard;

                loop {
                    if cache.len() >= want || *exhausted {
                        return Ok(());
                    }
                    match producer {
                        Producer::Repeat(value) => {
                            let value = value.clone();
                            cache.push_back(value);
                        }
                        Producer::Arithmetic { next, step } => {
                            cache.push_back(Value::Integer(*next));
                            *next = next.wrapping_add(*step);
                        }
                        Producer::PiDigits(spigot) => match spigot.next_digit() {
                            Some(digit) => cache.push_back(Value::Integer(digit)),
                            None => *exhausted = true,
                        },
                        // The recurrence rule calls a function on the
                        // whole accumulator; release the borrow first.
                        Producer::Recurrence { func } => {
                            break (func.clone(), cache.clone(), cache.len());
                        }
                    }
                }
            };

            let value = self.call_function(&func, args, span)?;

            let mut guard = seq.borrow_mut();
            // A re-entrant realization may have appended while the
            // function ran; only push if the slot is still ours.
            if guard.cache.len() == expected_len {
                guard.cache.push_back(value);
            }
        }
    }
}

fn op_sub(left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(b))),
        (left, right) => Err(type_error(
            format!(
                "Cannot subtract {} from {}",
                right.type_name(),
                left.type_name()
            ),
            span,
        )),
    }
}

/// Floor division; dividing by zero yields 0 rather than failing.
fn op_div(left: Value, right: Value, span: Span) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Integer(_), Value::Integer(0)) => Ok(Value::Integer(0)),
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(floor_div(a, b))),
        (left, right) => Err(type_error(
            format!(
                "Cannot divide {} by {}",
                left.type_name(),
                right.type_name()
            ),
            span,
        )),
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let quotient = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && (a < 0) != (b < 0) {
        quotient - 1
    } else {
        quotient
    }
}

fn type_error(message: String, span: Span) -> EvalError {
    EvalError::type_mismatch(message, span.line)
}
