//! Counting semaphore.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore over a non-negative resource count.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` resources.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Adds `permits` resources and wakes one waiter.
    pub fn set_and_notify_one(&self, permits: usize) {
        *self.permits.lock() += permits;
        self.cond.notify_one();
    }

    /// Adds `permits` resources and wakes every waiter.
    pub fn set_and_notify_all(&self, permits: usize) {
        *self.permits.lock() += permits;
        self.cond.notify_all();
    }

    /// Blocks until a resource is available, then takes it.
    pub fn wait(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes one resource; alias for [`wait`](Self::wait).
    pub fn acquire(&self) {
        self.wait();
    }

    /// Returns one resource; shorthand for `set_and_notify_one(1)`.
    pub fn release(&self) {
        self.set_and_notify_one(1);
    }

    /// Returns the number of available resources without blocking.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
