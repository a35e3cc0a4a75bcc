//! Work-stealing executor.
//!
//! The executor owns one queue per worker thread. Submissions pick a queue
//! round-robin and allocate the job from that queue's local pool; an idle
//! worker scans its neighbors and moves the newer half of the first
//! sufficiently loaded queue onto its own. A job that is about to block for
//! a long time can hand its queue to a replacement worker with
//! [`release_current_worker`].

mod job;
mod pool;
mod queue;
mod worker;

use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::error::{BuildError, ReleaseError, SubmitError};
use job::RawJob;
use queue::{steal_half, TaskQueue};
use worker::{worker_main, WorkerShared, DETACHED};

/// Default number of jobs a victim must hold before a thief takes half.
pub const DEFAULT_STEAL_THRESHOLD: usize = 8;

const DEFAULT_THREAD_NAME_PREFIX: &str = "stealpool-worker-";

/// Configures and builds an [`Executor`].
///
/// ```
/// let executor = stealpool::Builder::new()
///     .thread_count(2)
///     .steal_threshold(4)
///     .build()?;
/// assert_eq!(executor.thread_count(), 2);
/// # Ok::<(), stealpool::BuildError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    thread_count: Option<usize>,
    steal_threshold: usize,
    thread_name_prefix: String,
}

impl Builder {
    /// Creates a builder with the defaults: one worker per hardware thread
    /// and a steal threshold of [`DEFAULT_STEAL_THRESHOLD`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            thread_count: None,
            steal_threshold: DEFAULT_STEAL_THRESHOLD,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// Sets the number of worker threads (and queues). Zero is rejected at
    /// [`build`](Self::build).
    #[must_use]
    pub fn thread_count(mut self, count: usize) -> Self {
        self.thread_count = Some(count);
        self
    }

    /// Sets the minimum victim queue length for stealing. Values below 2
    /// are rejected at [`build`](Self::build).
    #[must_use]
    pub fn steal_threshold(mut self, threshold: usize) -> Self {
        self.steal_threshold = threshold;
        self
    }

    /// Sets the prefix for worker thread names; the worker's spawn ordinal
    /// is appended.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validates the configuration and starts the workers.
    pub fn build(self) -> Result<Executor, BuildError> {
        let thread_count = match self.thread_count {
            Some(0) => return Err(BuildError::ZeroThreads),
            Some(count) => count,
            None => thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };
        if self.steal_threshold < 2 {
            return Err(BuildError::StealThreshold(self.steal_threshold));
        }

        let queues = (0..thread_count)
            .map(|_| Arc::new(TaskQueue::new()))
            .collect();
        let executor = Executor {
            shared: Arc::new(ExecutorShared {
                queues,
                next_queue: AtomicUsize::new(0),
                stop: AtomicBool::new(false),
                steal_threshold: self.steal_threshold,
                thread_name_prefix: self.thread_name_prefix,
                next_worker_id: AtomicUsize::new(0),
                workers: Mutex::new(WorkerSet::default()),
            }),
        };

        for queue_index in 0..thread_count {
            match ExecutorShared::spawn_worker(&executor.shared, queue_index) {
                Ok(handle) => executor.shared.workers.lock().all.push(handle),
                // Dropping the partial executor joins the workers already
                // running.
                Err(err) => return Err(BuildError::Spawn(err)),
            }
        }
        Ok(executor)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

struct WorkerHandle {
    worker: Arc<WorkerShared>,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct WorkerSet {
    /// Every worker ever spawned; joined at teardown.
    all: Vec<WorkerHandle>,
    /// Workers parked by a release, available for reuse.
    suspended: Vec<Arc<WorkerShared>>,
}

pub(crate) struct ExecutorShared {
    queues: Vec<Arc<TaskQueue>>,
    next_queue: AtomicUsize,
    stop: AtomicBool,
    steal_threshold: usize,
    thread_name_prefix: String,
    next_worker_id: AtomicUsize,
    workers: Mutex<WorkerSet>,
}

impl ExecutorShared {
    fn spawn_worker(shared: &Arc<Self>, queue_index: usize) -> io::Result<WorkerHandle> {
        let worker = WorkerShared::assigned_to(queue_index);
        let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let join = thread::Builder::new()
            .name(format!("{}{id}", shared.thread_name_prefix))
            .spawn({
                let shared = Arc::clone(shared);
                let worker = Arc::clone(&worker);
                move || worker_main(shared, worker)
            })?;
        Ok(WorkerHandle { worker, join })
    }

    /// Work-stealing scan: victims from the thief's successor, wrapping
    /// around. Each thief/victim mutex pair is taken in queue-index order,
    /// the one order every thread agrees on.
    fn steal_into(&self, thief_index: usize) -> bool {
        let queue_count = self.queues.len();
        for offset in 1..queue_count {
            let victim_index = (thief_index + offset) % queue_count;
            let thief = &self.queues[thief_index];
            let victim = &self.queues[victim_index];
            let moved = if thief_index < victim_index {
                let mut thief_inner = thief.inner.lock();
                let mut victim_inner = victim.inner.lock();
                steal_half(&mut victim_inner, &mut thief_inner, self.steal_threshold)
            } else {
                let mut victim_inner = victim.inner.lock();
                let mut thief_inner = thief.inner.lock();
                steal_half(&mut victim_inner, &mut thief_inner, self.steal_threshold)
            };
            if moved > 0 {
                trace!(victim = victim_index, moved, "stole jobs");
                return true;
            }
        }
        false
    }

    fn submit(&self, f: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        let index = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        let queue = &self.queues[index];
        {
            let mut inner = queue.inner.lock();
            // Checked under the queue mutex: teardown drains each queue
            // under the same mutex after raising the flag, so a job admitted
            // here is always executed or drained, never stranded.
            if self.stop.load(Ordering::Acquire) {
                return Err(SubmitError::ShuttingDown);
            }
            let job = RawJob::new_in(&mut inner.pool, Arc::clone(queue), f)
                .ok_or(SubmitError::AllocationFailed)?;
            inner.jobs.push_back(job);
        }
        queue.ready.notify_one();
        Ok(())
    }

    fn release_worker(
        shared: &Arc<Self>,
        current: &Arc<WorkerShared>,
    ) -> Result<(), ReleaseError> {
        let mut workers = shared.workers.lock();
        if shared.stop.load(Ordering::Acquire) {
            // Teardown owns every worker now; leave the binding alone.
            return Ok(());
        }
        let slot = current.slot.swap(DETACHED, Ordering::AcqRel);
        if slot == DETACHED {
            return Err(ReleaseError::AlreadyReleased);
        }
        let queue_index = slot - 1;

        if let Some(parked) = workers.suspended.pop() {
            parked.resume(queue_index);
            debug!(queue = queue_index, "worker released; reusing a suspended worker");
        } else {
            match Self::spawn_worker(shared, queue_index) {
                Ok(handle) => {
                    workers.all.push(handle);
                    debug!(queue = queue_index, "worker released; spawned a replacement");
                }
                Err(err) => {
                    // No replacement: the caller keeps its queue.
                    current.slot.store(slot, Ordering::Release);
                    return Err(ReleaseError::Spawn(err));
                }
            }
        }
        workers.suspended.push(Arc::clone(current));
        Ok(())
    }
}

/// Fixed-size work-stealing job executor.
///
/// Dropping the executor signals every worker to stop, joins them, and
/// destroys queued jobs that never ran.
///
/// ```
/// use std::sync::Arc;
/// use stealpool::{sync::Counter, Executor};
///
/// let executor = Executor::new(2)?;
/// let done = Arc::new(Counter::new(1));
/// {
///     let done = Arc::clone(&done);
///     executor.submit(move || done.decrement_and_notify_one());
/// }
/// done.wait();
/// # Ok::<(), stealpool::BuildError>(())
/// ```
pub struct Executor {
    shared: Arc<ExecutorShared>,
}

impl Executor {
    /// Builds an executor with `thread_count` workers and default settings.
    pub fn new(thread_count: usize) -> Result<Self, BuildError> {
        Builder::new().thread_count(thread_count).build()
    }

    /// Returns a [`Builder`] for non-default settings.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Number of worker queues; constant for the executor's lifetime.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Submits a job, picking the target queue round-robin.
    ///
    /// # Panics
    /// Panics on the conditions [`try_submit`](Self::try_submit) reports.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(err) = self.try_submit(f) {
            panic!("submit failed: {err}");
        }
    }

    /// Submits a job, reporting shutdown and allocation failure instead of
    /// panicking.
    pub fn try_submit<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(f)
    }

    /// Returns a cloneable submission handle.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns a handle to the executor the calling thread works for, if
    /// the calling thread is a worker (jobs run on workers, so this works
    /// from inside a job).
    #[must_use]
    pub fn current() -> Option<Handle> {
        worker::with_current(|executor, _| {
            executor.upgrade().map(|shared| Handle { shared })
        })
        .flatten()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("thread_count", &self.thread_count())
            .finish_non_exhaustive()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        debug!("executor stopping");
        self.shared.stop.store(true, Ordering::Release);

        // Lock-then-notify, so a waiter between its stop check and its wait
        // cannot miss the wakeup.
        for queue in &self.shared.queues {
            drop(queue.inner.lock());
            queue.ready.notify_all();
        }

        let handles = {
            let mut workers = self.shared.workers.lock();
            workers.suspended.clear();
            std::mem::take(&mut workers.all)
        };
        for handle in &handles {
            drop(handle.worker.park.lock());
            handle.worker.unpark.notify_all();
        }
        for handle in handles {
            if handle.join.join().is_err() {
                error!("worker thread panicked");
            }
        }

        // The workers are gone; destroy whatever never ran.
        for queue in &self.shared.queues {
            let jobs: Vec<RawJob> = {
                let mut inner = queue.inner.lock();
                inner.jobs.drain(..).collect()
            };
            if !jobs.is_empty() {
                debug!(count = jobs.len(), "discarding jobs that never ran");
            }
            for job in jobs {
                job.discard();
            }
        }
    }
}

/// Cloneable submission handle to an [`Executor`].
///
/// A handle does not keep the pool running: once the executor is dropped,
/// submissions through surviving handles return
/// [`SubmitError::ShuttingDown`].
#[derive(Clone)]
pub struct Handle {
    shared: Arc<ExecutorShared>,
}

impl Handle {
    /// Number of worker queues.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Submits a job; see [`Executor::submit`].
    ///
    /// # Panics
    /// Panics on the conditions [`try_submit`](Self::try_submit) reports.
    pub fn submit<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(err) = self.try_submit(f) {
            panic!("submit failed: {err}");
        }
    }

    /// Submits a job; see [`Executor::try_submit`].
    pub fn try_submit<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(f)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("thread_count", &self.thread_count())
            .finish_non_exhaustive()
    }
}

/// Detaches the calling worker from its queue for the remainder of the
/// current job and installs a replacement worker on that queue.
///
/// Call this at the start of a job that is going to block for a long time:
/// the queue keeps flowing on the replacement while the current thread
/// blocks. The detached worker parks when the job finishes and is reused
/// for a later release. Returns once the replacement is responsible for
/// the queue.
///
/// # Errors
/// [`ReleaseError::NotAWorker`] when called from a thread that is not a
/// worker, [`ReleaseError::AlreadyReleased`] when the current job already
/// released its worker, and [`ReleaseError::Spawn`] when no replacement
/// could be started (the caller then keeps its queue).
pub fn release_current_worker() -> Result<(), ReleaseError> {
    worker::with_current(|executor, current| {
        let Some(shared) = executor.upgrade() else {
            return Err(ReleaseError::NotAWorker);
        };
        ExecutorShared::release_worker(&shared, current)
    })
    .unwrap_or(Err(ReleaseError::NotAWorker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(Executor::new(0), Err(BuildError::ZeroThreads)));
    }

    #[test]
    fn undersized_steal_threshold_is_rejected() {
        let result = Builder::new().thread_count(1).steal_threshold(1).build();
        assert!(matches!(result, Err(BuildError::StealThreshold(1))));
    }

    #[test]
    fn default_builder_uses_hardware_parallelism() {
        let executor = Builder::new().build().expect("build");
        assert!(executor.thread_count() >= 1);
    }
}
