//! Pool-allocated, type-erased job cells.
//!
//! A job is one heap block holding a fixed header followed by the caller's
//! closure. The header carries everything needed to run the closure and to
//! hand the block back: the cell layout, the owning queue, and two erased
//! entry points. A stolen job still deallocates through the queue that
//! allocated it, which is the only reason the back-pointer exists.

use std::alloc::Layout;
use std::fmt;
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::error;

use super::pool::BlockPool;
use super::queue::TaskQueue;

struct JobHeader {
    /// Layout of the whole cell; handed back to the pool on release.
    layout: Layout,
    /// The queue whose pool allocated this cell.
    owner: ManuallyDrop<Arc<TaskQueue>>,
    /// Moves the closure out and runs it.
    invoke: unsafe fn(NonNull<JobHeader>),
    /// Drops the closure without running it.
    drop_payload: unsafe fn(NonNull<JobHeader>),
}

#[repr(C)]
struct JobCell<F> {
    header: JobHeader,
    payload: ManuallyDrop<F>,
}

/// Owning pointer to a job cell.
///
/// Every `RawJob` is consumed by exactly one of [`run`](Self::run) or
/// [`discard`](Self::discard); both return the cell to its owning pool.
pub(super) struct RawJob {
    cell: NonNull<JobHeader>,
}

// The payload is constrained to `Send` at construction and the queue
// back-pointer is an `Arc`.
unsafe impl Send for RawJob {}

impl RawJob {
    /// Writes a new job cell into `pool`, which must belong to `owner`.
    ///
    /// The caller holds `owner`'s mutex; the pool is only reachable through
    /// it. `None` means allocation failed, and `f` is dropped.
    pub(super) fn new_in<F>(pool: &mut BlockPool, owner: Arc<TaskQueue>, f: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let layout = Layout::new::<JobCell<F>>();
        let block = pool.allocate(layout)?;
        let cell = block.cast::<JobCell<F>>();
        // SAFETY: `block` is a fresh, exclusively owned allocation of
        // `layout`.
        unsafe {
            cell.as_ptr().write(JobCell {
                header: JobHeader {
                    layout,
                    owner: ManuallyDrop::new(owner),
                    invoke: invoke_payload::<F>,
                    drop_payload: drop_payload::<F>,
                },
                payload: ManuallyDrop::new(f),
            });
        }
        Some(Self { cell: cell.cast() })
    }

    /// Runs the job, then returns its memory to the owning queue's pool.
    ///
    /// A panicking job is unwound, logged, and suppressed; the cell is
    /// released either way.
    pub(super) fn run(self) {
        let cell = self.cell;
        // SAFETY: `self` owns the cell and is consumed; the payload is live.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
            ((*cell.as_ptr()).invoke)(cell);
        }));
        if outcome.is_err() {
            error!("job panicked; the panic does not leave the worker");
        }
        // SAFETY: invoke vacated the payload, normally or through the unwind.
        unsafe { release(cell) };
    }

    /// Drops the closure without running it and releases the cell.
    ///
    /// Teardown path for jobs still queued when the executor stops.
    pub(super) fn discard(self) {
        let cell = self.cell;
        // SAFETY: `self` owns the cell; the payload has not been taken.
        unsafe {
            ((*cell.as_ptr()).drop_payload)(cell);
            release(cell);
        }
    }
}

impl fmt::Debug for RawJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawJob").finish_non_exhaustive()
    }
}

unsafe fn invoke_payload<F: FnOnce()>(cell: NonNull<JobHeader>) {
    let cell = cell.cast::<JobCell<F>>();
    // Move the closure out: the call consumes it, and an unwinding call
    // drops it on the way through.
    let f = unsafe { ManuallyDrop::take(&mut (*cell.as_ptr()).payload) };
    f();
}

unsafe fn drop_payload<F>(cell: NonNull<JobHeader>) {
    let cell = cell.cast::<JobCell<F>>();
    unsafe { ManuallyDrop::drop(&mut (*cell.as_ptr()).payload) };
}

/// Returns the cell's block to the pool of the queue that allocated it,
/// taking that queue's lock. The payload must already be gone.
unsafe fn release(cell: NonNull<JobHeader>) {
    let (owner, layout) = unsafe {
        let header = &mut *cell.as_ptr();
        (ManuallyDrop::take(&mut header.owner), header.layout)
    };
    let mut inner = owner.inner.lock();
    // SAFETY: the block came from this pool with this layout, and nothing
    // references the cell any more.
    unsafe { inner.pool.deallocate(cell.cast(), layout) };
}
