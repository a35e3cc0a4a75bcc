//! Error types for the executor and the global engine.
//!
//! Each failure domain gets its own enum: configuration problems surface at
//! build time, submission problems at submit time, and worker-release
//! problems at the release call. Nothing here is stringly typed.

use std::io;

use thiserror::Error;

/// Errors reported while building an [`Executor`](crate::Executor).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configured thread count was zero.
    #[error("thread count must be greater than zero")]
    ZeroThreads,

    /// The configured steal threshold was below the minimum of 2.
    #[error("steal threshold must be at least 2, got {0}")]
    StealThreshold(usize),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Errors reported when a job cannot be accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The executor has begun tearing down; no further jobs are accepted.
    #[error("executor is shutting down")]
    ShuttingDown,

    /// The job cell could not be allocated.
    #[error("job allocation failed")]
    AllocationFailed,
}

/// Errors reported by [`release_current_worker`](crate::release_current_worker).
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The calling thread is not a worker of any executor.
    #[error("release_current_worker called outside a worker thread")]
    NotAWorker,

    /// The current job already released its worker.
    #[error("the current worker was already released")]
    AlreadyReleased,

    /// No replacement worker could be spawned; the caller keeps its queue.
    #[error("failed to spawn replacement worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Errors reported by the process-global [`engine`](crate::engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has not been initialized.
    #[error("execution engine is not initialized")]
    NotInitialized,

    /// The engine is already running.
    #[error("execution engine is already initialized")]
    AlreadyInitialized,

    /// The underlying executor could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The underlying executor rejected the job.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}
