//! Error types for the worker pool.

use thiserror::Error;

/// Errors that can occur while setting up parallel execution.
#[derive(Error, Debug)]
pub enum ParallelError {
    /// A pool was requested with zero workers.
    #[error("worker pool needs at least one worker")]
    ZeroWorkers,

    /// The underlying thread pool could not be created.
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

/// Result type for worker pool operations.
pub type Result<T> = std::result::Result<T, ParallelError>;
