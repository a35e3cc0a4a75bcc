//! Single-flag event.

use parking_lot::{Condvar, Mutex};

/// A boolean flag that threads can wait on.
///
/// [`wait`](Self::wait) blocks until the flag is set and resets it on the
/// way out, so one `set_and_notify_one` releases exactly one waiter.
#[derive(Debug, Default)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Sets the flag and wakes one waiter.
    pub fn set_and_notify_one(&self) {
        *self.flag.lock() = true;
        self.cond.notify_one();
    }

    /// Sets the flag and wakes every waiter.
    ///
    /// The first waiter through resets the flag; the rest go back to sleep
    /// until the event is set again.
    pub fn set_and_notify_all(&self) {
        *self.flag.lock() = true;
        self.cond.notify_all();
    }

    /// Blocks until the flag is set, then resets it.
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cond.wait(&mut flag);
        }
        *flag = false;
    }

    /// Returns the flag without blocking or resetting.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }
}
