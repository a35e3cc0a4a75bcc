//! Predicate-gated counter.

use parking_lot::{Condvar, Mutex};

/// Decides when a counter's new value is worth announcing.
pub trait CounterPredicate {
    /// Returns `true` when `value` should wake waiters.
    fn matches(&self, value: i64) -> bool;
}

/// The default predicate: the counter reached zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsZero;

impl CounterPredicate for IsZero {
    fn matches(&self, value: i64) -> bool {
        value == 0
    }
}

/// Predicate matching one specific value.
#[derive(Debug, Clone, Copy)]
pub struct IsEqualTo(pub i64);

impl CounterPredicate for IsEqualTo {
    fn matches(&self, value: i64) -> bool {
        value == self.0
    }
}

/// A counter that wakes waiters when a predicate holds on its value.
///
/// The usual pattern is a join: start the counter at the number of
/// outstanding jobs, have every job call
/// [`decrement_and_notify_one`](Self::decrement_and_notify_one), and
/// [`wait`](Self::wait) for zero.
#[derive(Debug)]
pub struct Counter<P = IsZero> {
    value: Mutex<i64>,
    cond: Condvar,
    predicate: P,
}

impl Counter<IsZero> {
    /// Creates a counter that announces zero.
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self::with_predicate(initial, IsZero)
    }
}

impl<P: CounterPredicate> Counter<P> {
    /// Creates a counter with a caller-chosen predicate.
    #[must_use]
    pub fn with_predicate(initial: i64, predicate: P) -> Self {
        Self {
            value: Mutex::new(initial),
            cond: Condvar::new(),
            predicate,
        }
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> i64 {
        *self.value.lock()
    }

    /// Adds one without waking anybody.
    pub fn increment(&self) {
        *self.value.lock() += 1;
    }

    /// Subtracts one without waking anybody.
    pub fn decrement(&self) {
        *self.value.lock() -= 1;
    }

    /// Adds one; wakes one waiter if the predicate holds on the new value.
    pub fn increment_and_notify_one(&self) {
        self.apply(1, false);
    }

    /// Adds one; wakes every waiter if the predicate holds on the new value.
    pub fn increment_and_notify_all(&self) {
        self.apply(1, true);
    }

    /// Subtracts one; wakes one waiter if the predicate holds on the new
    /// value.
    pub fn decrement_and_notify_one(&self) {
        self.apply(-1, false);
    }

    /// Subtracts one; wakes every waiter if the predicate holds on the new
    /// value.
    pub fn decrement_and_notify_all(&self) {
        self.apply(-1, true);
    }

    /// Blocks until the predicate holds on the current value.
    pub fn wait(&self) {
        let mut value = self.value.lock();
        while !self.predicate.matches(*value) {
            self.cond.wait(&mut value);
        }
    }

    fn apply(&self, delta: i64, notify_all: bool) {
        let new_value = {
            let mut value = self.value.lock();
            *value += delta;
            *value
        };
        if self.predicate.matches(new_value) {
            if notify_all {
                self.cond.notify_all();
            } else {
                self.cond.notify_one();
            }
        }
    }
}
