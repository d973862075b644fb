//! Error types shared by the queue, promise and pool modules.

use std::io;

use thiserror::Error;

/// Result alias for fallible pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors raised by the pool and its primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// A pool was configured with zero workers.
    #[error("worker count must be positive")]
    InvalidWorkerCount,

    /// The pool is shutting down or has stopped and accepts no more work.
    #[error("thread pool has been shut down")]
    Stopped,

    /// A promise was resolved twice.
    #[error("promise already holds a value")]
    AlreadySet,

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A failure inside user work, delivered through the task's promise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task panicked; carries the panic message when one was available.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// What a worker hands back for every submitted task.
pub type TaskResult<R> = std::result::Result<R, TaskError>;
