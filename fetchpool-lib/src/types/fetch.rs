use std::fmt;

use serde::Serialize;

/// The outcome of fetching a single URL.
///
/// Produced exactly once per work item, whether the fetch succeeded or not.
/// Network errors, timeouts, and non-success statuses are recorded in
/// [`error`](FetchResult::error) rather than propagated, so a batch always
/// yields one `FetchResult` per input URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    /// The URL as it was given to the fetcher
    pub url: String,
    /// Whether the fetch completed with a success status
    pub ok: bool,
    /// HTTP status code, if a response was received at all
    pub status_code: Option<u16>,
    /// Number of body bytes read
    pub bytes_read: usize,
    /// Wall time spent on this fetch, in seconds
    pub elapsed_seconds: f64,
    /// Failure description for `ok == false` results
    pub error: Option<String>,
}

impl FetchResult {
    /// A completed fetch with a success status.
    #[must_use]
    pub fn success(url: &str, status_code: u16, bytes_read: usize, elapsed_seconds: f64) -> Self {
        Self {
            url: url.to_string(),
            ok: true,
            status_code: Some(status_code),
            bytes_read,
            elapsed_seconds,
            error: None,
        }
    }

    /// A fetch that failed before any response arrived.
    #[must_use]
    pub fn failure(url: &str, error: String, elapsed_seconds: f64) -> Self {
        Self {
            url: url.to_string(),
            ok: false,
            status_code: None,
            bytes_read: 0,
            elapsed_seconds,
            error: Some(error),
        }
    }

    /// A fetch that received a response with a non-success status.
    #[must_use]
    pub fn http_failure(
        url: &str,
        status_code: u16,
        bytes_read: usize,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            url: url.to_string(),
            ok: false,
            status_code: Some(status_code),
            bytes_read,
            elapsed_seconds,
            error: Some(format!("unexpected status: {status_code}")),
        }
    }

    /// Elapsed time in milliseconds, for display purposes.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_seconds * 1000.0
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status_code, &self.error) {
            (Some(status), None) => write!(
                f,
                "{} [{status}] {} bytes in {:.1}ms",
                self.url,
                self.bytes_read,
                self.elapsed_ms()
            ),
            (Some(status), Some(error)) => {
                write!(f, "{} [{status}] FAILED: {error}", self.url)
            }
            (None, error) => write!(
                f,
                "{} FAILED: {}",
                self.url,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
