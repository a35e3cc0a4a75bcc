//! Deadlock-free ordered mutex.
//!
//! [`OrderedMutex`] lets call sites take any number of mutexes in any order
//! without deadlocking. Each thread keeps an address-ordered table of the
//! ordered mutexes it holds. A contended acquisition releases every held
//! mutex whose address is greater than the target, takes the target, then
//! re-acquires the released set in ascending address order. Every thread
//! holding several ordered mutexes therefore holds them in one global
//! order, and no waits-for cycle can close.
//!
//! The price is re-entrancy: a re-acquisition may take a mutex this thread
//! already holds through another guard, so guards hand out `&T` only, the
//! same contract as `parking_lot::ReentrantMutex`. Put a `Cell` or an
//! atomic inside for mutation. State read before a nested `lock` call may
//! change while that call resolves contention; re-read it afterwards.

use std::cell::{RefCell, UnsafeCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use parking_lot::lock_api::RawReentrantMutex;
use parking_lot::{RawMutex, RawThreadId};
use smallvec::SmallVec;

type RawLock = RawReentrantMutex<RawMutex, RawThreadId>;

thread_local! {
    /// Addresses of every ordered mutex this thread holds, ascending; one
    /// entry per acquisition.
    static HELD: RefCell<SmallVec<[usize; 8]>> = const { RefCell::new(SmallVec::new_const()) };
}

/// Inserts at the multiset upper bound and returns the position, so equal
/// addresses (re-entrant acquisitions) sit below the new entry.
fn insert(held: &mut SmallVec<[usize; 8]>, address: usize) -> usize {
    let position = held.partition_point(|&a| a <= address);
    held.insert(position, address);
    position
}

/// Removes one entry for `address`.
fn remove(held: &mut SmallVec<[usize; 8]>, address: usize) {
    let position = held.partition_point(|&a| a < address);
    debug_assert_eq!(held.get(position), Some(&address));
    held.remove(position);
}

/// # Safety
/// `address` must be the raw lock of a live `OrderedMutex` the current
/// thread holds at least one acquisition on; the guard borrowing it keeps
/// it alive.
unsafe fn raw_from_address<'a>(address: usize) -> &'a RawLock {
    unsafe { &*(address as *const RawLock) }
}

/// A mutex that cooperates with every other `OrderedMutex` held by the
/// current thread to keep acquisition deadlock-free.
///
/// ```
/// use std::cell::Cell;
/// use stealpool::sync::OrderedMutex;
///
/// static A: OrderedMutex<Cell<u32>> = OrderedMutex::new(Cell::new(0));
/// static B: OrderedMutex<Cell<u32>> = OrderedMutex::new(Cell::new(0));
///
/// // Another thread may lock B before A; neither order can deadlock.
/// let a = A.lock();
/// let b = B.lock();
/// a.set(a.get() + 1);
/// b.set(b.get() + 1);
/// ```
pub struct OrderedMutex<T: ?Sized> {
    raw: RawLock,
    data: UnsafeCell<T>,
}

// Guards only ever hand out `&T`, the re-entrant mutex contract.
unsafe impl<T: ?Sized + Send> Send for OrderedMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for OrderedMutex<T> {}

impl<T> OrderedMutex<T> {
    /// Creates an unlocked mutex.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawLock::INIT,
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the mutex and returns the value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> OrderedMutex<T> {
    fn address(&self) -> usize {
        &self.raw as *const RawLock as usize
    }

    /// Acquires the mutex.
    ///
    /// On contention, every held ordered mutex above this one's address is
    /// released, this one is acquired blocking, and the released set is
    /// re-acquired in ascending order.
    #[must_use]
    pub fn lock(&self) -> OrderedMutexGuard<'_, T> {
        let address = self.address();
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if self.raw.try_lock() {
                insert(&mut held, address);
                return;
            }

            // Contended. Register the pending acquisition first, so the
            // entries above it name exactly the mutexes to cycle.
            let position = insert(&mut held, address);
            for &above in &held[position + 1..] {
                // SAFETY: an entry above the pivot is a lock this thread
                // holds; the mutex behind it is alive and owned here.
                unsafe { raw_from_address(above).unlock() };
            }
            self.raw.lock();
            for &above in &held[position + 1..] {
                // SAFETY: as above; re-acquired in ascending address order.
                unsafe { raw_from_address(above) }.lock();
            }
        });
        OrderedMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Tries to acquire the mutex without blocking on it.
    ///
    /// On contention the same release/re-acquire cycle runs with a
    /// non-blocking attempt at this mutex; `None` means it stayed
    /// unavailable and the held set was restored.
    #[must_use]
    pub fn try_lock(&self) -> Option<OrderedMutexGuard<'_, T>> {
        let address = self.address();
        let acquired = HELD.with(|held| {
            let mut held = held.borrow_mut();
            if self.raw.try_lock() {
                insert(&mut held, address);
                return true;
            }

            let position = insert(&mut held, address);
            for &above in &held[position + 1..] {
                // SAFETY: see `lock`.
                unsafe { raw_from_address(above).unlock() };
            }
            let acquired = self.raw.try_lock();
            for &above in &held[position + 1..] {
                // SAFETY: see `lock`.
                unsafe { raw_from_address(above) }.lock();
            }
            if !acquired {
                held.remove(position);
            }
            acquired
        });
        acquired.then(|| OrderedMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }
}

impl<T: ?Sized> fmt::Debug for OrderedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMutex").finish_non_exhaustive()
    }
}

/// RAII guard for an [`OrderedMutex`]; the acquisition is released on drop.
#[must_use]
pub struct OrderedMutexGuard<'a, T: ?Sized> {
    mutex: &'a OrderedMutex<T>,
    /// Guards stay on the locking thread; the held-lock table is
    /// thread-local.
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for OrderedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the re-entrant lock, and only shared
        // access is ever handed out.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for OrderedMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard's acquisition inserted exactly one table entry
        // and took the raw lock once.
        unsafe { self.mutex.raw.unlock() };
        HELD.with(|held| remove(&mut held.borrow_mut(), self.mutex.address()));
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for OrderedMutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn held_addresses() -> Vec<usize> {
        HELD.with(|held| held.borrow().to_vec())
    }

    #[test]
    fn lock_gives_access_to_the_value() {
        let mutex = OrderedMutex::new(7_u32);
        assert_eq!(*mutex.lock(), 7);
        assert_eq!(mutex.into_inner(), 7);
    }

    #[test]
    fn reentrant_acquisition_from_one_thread() {
        let mutex = OrderedMutex::new(1_u32);
        let outer = mutex.lock();
        let inner = mutex.lock();
        assert_eq!(*outer + *inner, 2);
        assert_eq!(held_addresses().len(), 2);
        drop(inner);
        drop(outer);
        assert!(held_addresses().is_empty());
    }

    #[test]
    fn try_lock_respects_a_holder_on_another_thread() {
        let mutex = OrderedMutex::new(());
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        thread::scope(|scope| {
            let mutex = &mutex;
            scope.spawn(move || {
                let _guard = mutex.lock();
                locked_tx.send(()).expect("send");
                release_rx.recv().expect("recv");
            });
            locked_rx.recv().expect("recv");
            assert!(mutex.try_lock().is_none());
            release_tx.send(()).expect("send");
        });
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn held_table_is_sorted_and_emptied() {
        let first = OrderedMutex::new(0_u32);
        let second = OrderedMutex::new(0_u32);
        let third = OrderedMutex::new(0_u32);
        let a = first.lock();
        let b = third.lock();
        let c = second.lock();
        let held = held_addresses();
        assert_eq!(held.len(), 3);
        assert!(held.windows(2).all(|pair| pair[0] <= pair[1]));
        drop((a, b, c));
        assert!(held_addresses().is_empty());
    }
}
