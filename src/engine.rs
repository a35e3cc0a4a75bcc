//! Process-global execution engine.
//!
//! A thin convenience layer owning one [`Executor`] in a process-singleton
//! slot, for programs that would rather call free functions than thread an
//! executor handle through every call site. Lifecycle is explicit:
//! [`init`] (or [`init_default`]) before the first [`execute`],
//! [`shutdown`] when done.

use parking_lot::Mutex;

use crate::error::EngineError;
use crate::executor::{Builder, Executor};

static ENGINE: Mutex<Option<Executor>> = Mutex::new(None);

/// Starts the global engine with `thread_count` workers.
///
/// # Errors
/// [`EngineError::AlreadyInitialized`] when the engine is running, or a
/// [`EngineError::Build`] from the underlying executor.
pub fn init(thread_count: usize) -> Result<(), EngineError> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(EngineError::AlreadyInitialized);
    }
    *slot = Some(Executor::new(thread_count)?);
    Ok(())
}

/// Starts the global engine with one worker per hardware thread.
///
/// # Errors
/// Same as [`init`].
pub fn init_default() -> Result<(), EngineError> {
    let mut slot = ENGINE.lock();
    if slot.is_some() {
        return Err(EngineError::AlreadyInitialized);
    }
    *slot = Some(Builder::new().build()?);
    Ok(())
}

/// Submits a job to the global engine.
///
/// # Errors
/// [`EngineError::NotInitialized`] before [`init`] or after [`shutdown`],
/// or a [`EngineError::Submit`] from the underlying executor.
pub fn execute<F>(f: F) -> Result<(), EngineError>
where
    F: FnOnce() + Send + 'static,
{
    match &*ENGINE.lock() {
        Some(executor) => Ok(executor.try_submit(f)?),
        None => Err(EngineError::NotInitialized),
    }
}

/// Number of workers in the global engine, if it is running.
#[must_use]
pub fn thread_count() -> Option<usize> {
    ENGINE.lock().as_ref().map(Executor::thread_count)
}

/// Stops the global engine: joins every worker and destroys jobs that
/// never ran. A no-op when the engine is not running.
///
/// The executor is dropped outside the singleton lock, so a job calling
/// [`execute`] during shutdown gets an error instead of deadlocking the
/// join.
pub fn shutdown() {
    let engine = ENGINE.lock().take();
    drop(engine);
}
