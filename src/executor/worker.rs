//! Worker threads.
//!
//! Each worker services the queue its slot names, in three phases: drain
//! the queue, try to steal, wait on the queue's condvar. A worker whose
//! slot has been cleared (one of its own jobs released it) parks on its
//! suspend condvar until the executor hands it a queue again or stops.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::ExecutorShared;

/// Slot value meaning "no queue": the worker parks until reassigned.
pub(super) const DETACHED: usize = 0;

/// State shared between a worker thread and the executor.
pub(super) struct WorkerShared {
    /// Queue index + 1; [`DETACHED`] when the worker has no queue.
    pub(super) slot: AtomicUsize,
    /// Guards the suspend wait; assignments are published under it.
    pub(super) park: Mutex<()>,
    pub(super) unpark: Condvar,
}

impl WorkerShared {
    pub(super) fn assigned_to(queue_index: usize) -> Arc<Self> {
        Arc::new(Self {
            slot: AtomicUsize::new(queue_index + 1),
            park: Mutex::new(()),
            unpark: Condvar::new(),
        })
    }

    /// Publishes a new queue assignment and wakes the worker.
    ///
    /// The store happens under the park mutex, so a worker between its slot
    /// check and its wait cannot miss the notification.
    pub(super) fn resume(&self, queue_index: usize) {
        {
            let _park = self.park.lock();
            self.slot.store(queue_index + 1, Ordering::Release);
        }
        self.unpark.notify_one();
    }
}

struct RegistryEntry {
    executor: Weak<ExecutorShared>,
    worker: Arc<WorkerShared>,
}

thread_local! {
    static CURRENT: RefCell<Option<RegistryEntry>> = const { RefCell::new(None) };
}

/// Clears the registry when the worker loop exits, however it exits.
struct RegistryGuard;

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.borrow_mut().take());
    }
}

/// Runs `f` with the calling thread's registry entry, if the thread is a
/// worker.
pub(super) fn with_current<R>(
    f: impl FnOnce(&Weak<ExecutorShared>, &Arc<WorkerShared>) -> R,
) -> Option<R> {
    CURRENT.with(|current| {
        let entry = current.borrow();
        entry.as_ref().map(|entry| f(&entry.executor, &entry.worker))
    })
}

/// Worker thread entry point.
pub(super) fn worker_main(executor: Arc<ExecutorShared>, me: Arc<WorkerShared>) {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(RegistryEntry {
            executor: Arc::downgrade(&executor),
            worker: Arc::clone(&me),
        });
    });
    let _registry = RegistryGuard;
    trace!("worker started");

    loop {
        let slot = me.slot.load(Ordering::Acquire);
        if slot == DETACHED {
            if !park(&executor, &me) {
                break;
            }
            continue;
        }
        if !service(&executor, &me, slot - 1) {
            break;
        }
    }
    trace!("worker exiting");
}

/// Parks a detached worker until it is reassigned. Returns `false` when the
/// executor is stopping.
fn park(executor: &ExecutorShared, me: &WorkerShared) -> bool {
    let mut park = me.park.lock();
    loop {
        if executor.stop.load(Ordering::Acquire) {
            return false;
        }
        if me.slot.load(Ordering::Acquire) != DETACHED {
            return true;
        }
        me.unpark.wait(&mut park);
    }
}

/// Services one queue until it runs dry, a release detaches this worker, or
/// the executor stops. Returns `false` on stop.
fn service(executor: &ExecutorShared, me: &WorkerShared, queue_index: usize) -> bool {
    let assignment = queue_index + 1;
    let queue = &executor.queues[queue_index];

    // Phase 1: drain the queue.
    loop {
        let job = {
            let mut inner = queue.inner.lock();
            if executor.stop.load(Ordering::Acquire) {
                return false;
            }
            inner.jobs.pop_front()
        };
        let Some(job) = job else { break };
        job.run();
        if me.slot.load(Ordering::Acquire) != assignment {
            // The job released this worker; a replacement owns the queue now.
            return true;
        }
    }

    // Phase 2: steal. On success the next pass drains the loot.
    if executor.steal_into(queue_index) {
        return true;
    }

    // Phase 3: wait for a submission.
    let job = {
        let mut inner = queue.inner.lock();
        loop {
            if executor.stop.load(Ordering::Acquire) {
                return false;
            }
            if let Some(job) = inner.jobs.pop_front() {
                break job;
            }
            queue.ready.wait(&mut inner);
        }
    };
    job.run();
    true
}
