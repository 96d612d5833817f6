use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Result;
use crate::ErrorKind;

/// Default cap on concurrently in-flight fetches across all hosts
const DEFAULT_TOTAL_CONCURRENCY: usize = 50;

/// Default cap on concurrently in-flight fetches per host
const DEFAULT_PER_HOST_CONCURRENCY: usize = 10;

/// Default per-host token bucket capacity
const DEFAULT_BUCKET_CAPACITY: f64 = 5.0;

/// Default per-host refill rate in tokens per second
const DEFAULT_REFILL_PER_SECOND: f64 = 5.0;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the dispatcher work queue
const DEFAULT_WORK_QUEUE_CAPACITY: usize = 500;

/// Rate limiting and concurrency configuration for a fetch run.
///
/// The global and per-host caps are independent: a host at its own cap never
/// occupies a global slot while it waits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum concurrently in-flight fetches across all hosts
    #[serde(default = "default_total_concurrency")]
    pub total_concurrency: usize,

    /// Maximum concurrently in-flight fetches per host
    #[serde(default = "default_per_host_concurrency")]
    pub per_host_concurrency: usize,

    /// Token capacity of each per-host bucket
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: f64,

    /// Refill rate of each per-host bucket, in tokens per second
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Timeout applied to each individual request
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Bound on the dispatcher work queue; producers block once it is full
    #[serde(default = "default_work_queue_capacity")]
    pub work_queue_capacity: usize,
}

const fn default_total_concurrency() -> usize {
    DEFAULT_TOTAL_CONCURRENCY
}

const fn default_per_host_concurrency() -> usize {
    DEFAULT_PER_HOST_CONCURRENCY
}

const fn default_bucket_capacity() -> f64 {
    DEFAULT_BUCKET_CAPACITY
}

const fn default_refill_per_second() -> f64 {
    DEFAULT_REFILL_PER_SECOND
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_work_queue_capacity() -> usize {
    DEFAULT_WORK_QUEUE_CAPACITY
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            total_concurrency: default_total_concurrency(),
            per_host_concurrency: default_per_host_concurrency(),
            bucket_capacity: default_bucket_capacity(),
            refill_per_second: default_refill_per_second(),
            request_timeout: default_request_timeout(),
            work_queue_capacity: default_work_queue_capacity(),
        }
    }
}

impl RateLimitConfig {
    /// Check the configuration for values that cannot drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`] for zero concurrency
    /// limits, a zero queue capacity, a non-positive bucket capacity, or a
    /// negative refill rate. Invalid values are never silently clamped.
    pub fn validate(&self) -> Result<()> {
        if self.total_concurrency == 0 {
            return Err(ErrorKind::InvalidLimiterConfig(
                "total_concurrency must be >= 1".to_string(),
            ));
        }
        if self.per_host_concurrency == 0 {
            return Err(ErrorKind::InvalidLimiterConfig(
                "per_host_concurrency must be >= 1".to_string(),
            ));
        }
        if self.work_queue_capacity == 0 {
            return Err(ErrorKind::InvalidLimiterConfig(
                "work_queue_capacity must be >= 1".to_string(),
            ));
        }
        if !self.bucket_capacity.is_finite() || self.bucket_capacity <= 0.0 {
            return Err(ErrorKind::InvalidLimiterConfig(format!(
                "bucket_capacity must be > 0, got {}",
                self.bucket_capacity
            )));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second < 0.0 {
            return Err(ErrorKind::InvalidLimiterConfig(format!(
                "refill_per_second must be >= 0, got {}",
                self.refill_per_second
            )));
        }
        Ok(())
    }
}
