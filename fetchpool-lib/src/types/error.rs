use thiserror::Error;

/// Possible errors when interacting with `fetchpool_lib`.
///
/// Ordinary fetch failures (connection errors, timeouts, non-success
/// statuses) are not errors in this sense; they are captured per item in
/// [`crate::FetchResult`]. `ErrorKind` covers misconfiguration and batch-level
/// failures only.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A limiter was constructed with invalid parameters
    #[error("Invalid limiter configuration: {0}")]
    InvalidLimiterConfig(String),
    /// An admission was requested with a non-positive token cost
    #[error("Admission cost must be positive, got {0}")]
    InvalidCost(f64),
    /// The batch was stopped before every item completed
    #[error("Batch was cancelled before all items completed")]
    BatchCancelled,
    /// The HTTP client could not be configured
    #[error("Failed to build HTTP client")]
    BuildClient(#[source] reqwest::Error),
    /// A worker task panicked or was aborted
    #[error("Worker task failed to complete: {0}")]
    WorkerPanic(#[from] tokio::task::JoinError),
}
