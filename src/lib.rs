//! A fixed-size work-stealing job executor.
//!
//! `stealpool` runs opaque jobs on a fixed pool of worker threads. Each
//! worker owns a queue with a local memory pool; submissions go round-robin
//! and allocate the job cell inside the target queue, and an idle worker
//! steals the newer half of the first loaded neighbor it finds. A job that
//! is about to block for a long time can detach its worker with
//! [`release_current_worker`] so the queue keeps flowing on a replacement.
//!
//! The [`sync`] module ships the blocking primitives commonly used with
//! the pool, including [`sync::OrderedMutex`], which keeps arbitrary
//! multi-mutex call sites deadlock-free. The [`engine`] module wraps one
//! executor in a process-global singleton with explicit init/teardown.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use stealpool::{sync::Counter, Executor};
//!
//! let executor = Executor::new(4)?;
//! let hits = Arc::new(AtomicUsize::new(0));
//! let done = Arc::new(Counter::new(100));
//! for _ in 0..100 {
//!     let hits = Arc::clone(&hits);
//!     let done = Arc::clone(&done);
//!     executor.submit(move || {
//!         hits.fetch_add(1, Ordering::Relaxed);
//!         done.decrement_and_notify_one();
//!     });
//! }
//! done.wait();
//! assert_eq!(hits.load(Ordering::Relaxed), 100);
//! # Ok::<(), stealpool::BuildError>(())
//! ```

#![warn(missing_docs)]

pub mod engine;
mod error;
mod executor;
pub mod sync;

pub use error::{BuildError, EngineError, ReleaseError, SubmitError};
pub use executor::{
    release_current_worker, Builder, Executor, Handle, DEFAULT_STEAL_THRESHOLD,
};
