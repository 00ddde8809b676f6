//! Injectable randomness
//!
//! The driver makes exactly two random choices: which record type answers an
//! ANY question, and which preference an MX record carries. Both go through
//! [`Randomness`] so tests can pin them.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait Randomness: Send + Sync {
    /// Pick an index in `0..len`. Returns 0 when `len` is 0.
    fn choose_index(&self, len: usize) -> usize;
}

/// Thread-local RNG; the default
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandomness;

impl Randomness for ThreadRandomness {
    fn choose_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }
}

/// Replays a fixed sequence of choices, cycling when it runs out.
///
/// Each value is reduced modulo the requested length.
#[derive(Debug)]
pub struct SequenceRandomness {
    values: Vec<usize>,
    next: AtomicUsize,
}

impl SequenceRandomness {
    pub fn new(values: Vec<usize>) -> Self {
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }
}

impl Randomness for SequenceRandomness {
    fn choose_index(&self, len: usize) -> usize {
        if len == 0 || self.values.is_empty() {
            return 0;
        }
        let at = self.next.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[at] % len
    }
}
