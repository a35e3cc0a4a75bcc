//! Single-value event.

use parking_lot::{Condvar, Mutex};

/// An [`Event`](crate::sync::Event) that carries a value.
///
/// One object serves both sides: a producer stores a value with
/// `set_and_notify_*`, a consumer takes it with [`wait`](Self::wait).
/// Taking the value resets the event, so the object can be reused for the
/// next round.
#[derive(Debug)]
pub struct ValueEvent<T> {
    value: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T> ValueEvent<T> {
    /// Creates an empty value event.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Stores a value and wakes one waiter. A value that was never taken
    /// is replaced.
    pub fn set_and_notify_one(&self, value: T) {
        *self.value.lock() = Some(value);
        self.cond.notify_one();
    }

    /// Stores a value and wakes every waiter; exactly one of them takes it.
    pub fn set_and_notify_all(&self, value: T) {
        *self.value.lock() = Some(value);
        self.cond.notify_all();
    }

    /// Blocks until a value is stored, then takes it.
    pub fn wait(&self) -> T {
        let mut value = self.value.lock();
        loop {
            if let Some(value) = value.take() {
                return value;
            }
            self.cond.wait(&mut value);
        }
    }
}

impl<T> Default for ValueEvent<T> {
    fn default() -> Self {
        Self::new()
    }
}
