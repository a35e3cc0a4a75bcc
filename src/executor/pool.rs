//! Per-queue memory pool for job cells.
//!
//! Each queue owns one [`BlockPool`]. The pool performs no synchronization
//! of its own: every call happens while the owning queue's mutex is held,
//! which the `&mut` receiver enforces.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Free blocks retained per layout class before falling back to the global
/// allocator.
const MAX_FREE_PER_CLASS: usize = 128;

struct LayoutClass {
    layout: Layout,
    free: Vec<NonNull<u8>>,
}

/// Unsynchronized free-list pool of raw blocks, bucketed by exact layout.
///
/// Job cells for a given closure type share one layout, so a queue under
/// steady load recycles the same handful of classes without touching the
/// global allocator.
pub(super) struct BlockPool {
    classes: Vec<LayoutClass>,
}

// Cached blocks carry no data; the pool crosses threads only inside its
// queue, under that queue's mutex.
unsafe impl Send for BlockPool {}

impl BlockPool {
    pub(super) const fn new() -> Self {
        Self { classes: Vec::new() }
    }

    /// Hands out a block of exactly `layout`, reusing a cached block when
    /// one is available. `None` means the global allocator is exhausted.
    pub(super) fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        if let Some(class) = self.classes.iter_mut().find(|c| c.layout == layout) {
            if let Some(block) = class.free.pop() {
                return Some(block);
            }
        }
        // SAFETY: a job cell always contains its header, so the size is
        // non-zero.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    /// Returns a block previously handed out by [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// `block` must come from this pool's `allocate` with the same `layout`,
    /// and nothing may reference it afterwards.
    pub(super) unsafe fn deallocate(&mut self, block: NonNull<u8>, layout: Layout) {
        if let Some(class) = self.classes.iter_mut().find(|c| c.layout == layout) {
            if class.free.len() < MAX_FREE_PER_CLASS {
                class.free.push(block);
            } else {
                unsafe { alloc::dealloc(block.as_ptr(), layout) };
            }
            return;
        }
        self.classes.push(LayoutClass {
            layout,
            free: vec![block],
        });
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        for class in &mut self.classes {
            for block in class.free.drain(..) {
                // SAFETY: every cached block came from the global allocator
                // with this class's layout.
                unsafe { alloc::dealloc(block.as_ptr(), class.layout) };
            }
        }
    }
}
