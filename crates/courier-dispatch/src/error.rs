//! Error types for dispatch operations.
//!
//! Provider failures are deliberately coarse: the worker does not classify
//! retriable versus permanent errors, the retry budget alone decides whether
//! another attempt happens.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failures surfaced by the queue, provider, workers, and schedulers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Provider returned something other than 202 Accepted.
    #[error("unexpected provider status: {status}")]
    UnexpectedStatus {
        /// HTTP status code the provider returned.
        status: u16,
    },

    /// Transport-level failure reaching the provider.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Worker pool did not drain within the shutdown budget.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Configured shutdown budget.
        timeout: Duration,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {message}")]
    WorkerPanic {
        /// Index of the panicked worker.
        worker_id: usize,
        /// Join error description.
        message: String,
    },
}
