use im_rc::Vector;
use std::cell::RefCell;
use std::rc::Rc;

use super::value::Value;

/// A cache-backed wrapper around a resumable producer. The cache is always
/// a strict prefix of the conceptual sequence: indexing below `cache.len()`
/// never resumes the producer, indexing at or beyond it drives the producer
/// until enough elements exist or it terminates.
#[derive(Debug, Clone)]
pub struct LazySequence {
    pub cache: Vector<Value>,
    pub producer: Producer,
    /// Set once a finite producer terminates; realized elements stay
    /// available, everything beyond yields the default value.
    pub exhausted: bool,
}

impl LazySequence {
    pub fn new(producer: Producer) -> Self {
        Self {
            cache: Vector::new(),
            producer,
            exhausted: false,
        }
    }

    pub fn with_prefix(cache: Vector<Value>, producer: Producer) -> Self {
        Self {
            cache,
            producer,
            exhausted: false,
        }
    }

    /// A new sequence with `prefix` installed before everything this
    /// sequence has realized so far, sharing the producer rule. This is how
    /// a literal seed list composes with a generator.
    pub fn seeded(prefix: Vector<Value>, seq: &LazySequence) -> Self {
        let mut cache = prefix;
        cache.append(seq.cache.clone());
        Self {
            cache,
            producer: seq.producer.clone(),
            exhausted: seq.exhausted,
        }
    }

    pub fn into_value(self) -> Value {
        Value::LazySequence(Rc::new(RefCell::new(self)))
    }
}

/// The step rule behind a lazy sequence.
#[derive(Debug, Clone)]
pub enum Producer {
    /// Repeat one value forever.
    Repeat(Value),
    /// Arithmetic progression.
    Arithmetic { next: i64, step: i64 },
    /// Call the named function with the entire realized prefix as its
    /// argument list and append the result. Driven by the evaluator.
    Recurrence { func: String },
    /// The decimal digits of pi. Finite in practice: the spigot state
    /// grows without bound and the sequence exhausts once it would
    /// overflow 128-bit arithmetic.
    PiDigits(PiSpigot),
}

/// Unbounded integer spigot for pi digits: 3, 1, 4, 1, 5, 9, …
#[derive(Debug, Clone)]
pub struct PiSpigot {
    q: i128,
    r: i128,
    t: i128,
    k: i128,
    n: i128,
    l: i128,
    dead: bool,
}

impl PiSpigot {
    pub fn new() -> Self {
        Self {
            q: 1,
            r: 0,
            t: 1,
            k: 1,
            n: 3,
            l: 3,
            dead: false,
        }
    }

    /// The next digit, or None once the spigot state can no longer be
    /// advanced without overflow. Exhaustion latches: an overflow leaves
    /// the state inconsistent, so no further digits are produced.
    pub fn next_digit(&mut self) -> Option<i64> {
        if self.dead {
            return None;
        }
        match self.step() {
            Some(digit) => Some(digit),
            None => {
                self.dead = true;
                None
            }
        }
    }

    // State transitions are simultaneous: every right-hand side reads the
    // pre-step values. Divisors stay positive, so euclidean division is
    // floor division.
    fn step(&mut self) -> Option<i64> {
        loop {
            let Self { q, r, t, k, n, l, .. } = *self;

            let lhs = q.checked_mul(4)?.checked_add(r)?.checked_sub(t)?;
            let rhs = n.checked_mul(t)?;

            if lhs < rhs {
                self.q = q.checked_mul(10)?;
                self.r = r.checked_sub(n.checked_mul(t)?)?.checked_mul(10)?;
                self.n = q
                    .checked_mul(3)?
                    .checked_add(r)?
                    .checked_mul(10)?
                    .checked_div_euclid(t)?
                    .checked_sub(n.checked_mul(10)?)?;
                return Some(n as i64);
            }

            self.q = q.checked_mul(k)?;
            self.r = q.checked_mul(2)?.checked_add(r)?.checked_mul(l)?;
            self.t = t.checked_mul(l)?;
            self.n = q
                .checked_mul(k.checked_mul(7)?.checked_add(2)?)?
                .checked_add(r.checked_mul(l)?)?
                .checked_div_euclid(t.checked_mul(l)?)?;
            self.k = k.checked_add(1)?;
            self.l = l.checked_add(2)?;
        }
    }
}

impl Default for PiSpigot {
    fn default() -> Self {
        Self::new()
    }
}
