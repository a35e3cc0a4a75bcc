//! Per-worker job queue.
//!
//! One queue per worker: a FIFO of job cells plus the pool those cells come
//! from, both behind a single mutex. Submissions push to the back, the
//! owning worker pops from the front, and thieves take the back half.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::job::RawJob;
use super::pool::BlockPool;

pub(super) struct QueueInner {
    pub(super) jobs: VecDeque<RawJob>,
    pub(super) pool: BlockPool,
}

pub(super) struct TaskQueue {
    pub(super) inner: Mutex<QueueInner>,
    pub(super) ready: Condvar,
}

impl TaskQueue {
    pub(super) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                jobs: VecDeque::new(),
                pool: BlockPool::new(),
            }),
            ready: Condvar::new(),
        }
    }
}

/// Moves the newer (back) half of `victim`'s jobs onto the back of `thief`.
///
/// The caller holds both queue mutexes. Nothing moves unless the victim
/// holds at least `threshold` jobs; returns the number moved.
pub(super) fn steal_half(victim: &mut QueueInner, thief: &mut QueueInner, threshold: usize) -> usize {
    let len = victim.jobs.len();
    if len < threshold {
        return 0;
    }
    let count = len / 2;
    let mut stolen = victim.jobs.split_off(len - count);
    thief.jobs.append(&mut stolen);
    count
}
