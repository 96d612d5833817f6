use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::bucket::TokenBucket;
use super::key::HostKey;

/// Token cost of one admitted unit of work.
const UNIT_COST: f64 = 1.0;

/// How long a worker sleeps before re-polling a closed rate gate.
const ADMISSION_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Request counters for a single host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    /// Total number of completed requests to this host
    pub total_requests: u64,
    /// Requests that completed with a success status
    pub successes: u64,
    /// Requests that failed or returned a non-success status
    pub failures: u64,
}

impl HostStats {
    /// Record one completed request.
    pub fn record_outcome(&mut self, ok: bool) {
        self.total_requests += 1;
        if ok {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    /// Fraction of requests that succeeded. A host with no requests yet
    /// reports 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successes as f64 / self.total_requests as f64
        }
    }
}

/// Per-host admission control.
///
/// Each host combines two independent gates:
/// - a [`Semaphore`] capping concurrently in-flight requests, and
/// - a [`TokenBucket`] capping the request rate.
///
/// [`admit`](HostLimiter::admit) takes the in-flight slot first, then polls
/// the rate gate. The returned [`HostPermit`] frees the slot when dropped,
/// on every exit path.
#[derive(Debug)]
pub struct HostLimiter {
    /// The hostname this limiter manages
    pub key: HostKey,
    semaphore: Arc<Semaphore>,
    bucket: TokenBucket,
    stats: Mutex<HostStats>,
}

impl HostLimiter {
    pub(crate) fn new(key: HostKey, max_concurrent: usize, bucket: TokenBucket) -> Self {
        Self {
            key,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            bucket,
            stats: Mutex::new(HostStats::default()),
        }
    }

    /// Wait until this host admits one more unit of work.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore has been closed, which never happens as no
    /// code path closes it.
    pub async fn admit(&self) -> HostPermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("host semaphore closed unexpectedly");

        loop {
            let admitted = self
                .bucket
                .allow(UNIT_COST)
                // UNIT_COST is a positive constant
                .expect("unit admission cost was rejected");
            if admitted {
                break;
            }
            log::debug!(
                "host {} rate gate closed, retrying in {}ms",
                self.key,
                ADMISSION_RETRY_DELAY.as_millis()
            );
            tokio::time::sleep(ADMISSION_RETRY_DELAY).await;
        }

        HostPermit { _permit: permit }
    }

    /// Record the outcome of one completed request.
    ///
    /// # Panics
    ///
    /// Panics if the statistics mutex is poisoned.
    pub fn record_outcome(&self, ok: bool) {
        self.stats.lock().unwrap().record_outcome(ok);
    }

    /// A snapshot of this host's counters.
    ///
    /// # Panics
    ///
    /// Panics if the statistics mutex is poisoned.
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.stats.lock().unwrap().clone()
    }

    /// Currently free in-flight slots.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// RAII guard for one admitted unit of work on a host.
///
/// Dropping the permit frees the host's in-flight slot; the rate-gate tokens
/// it consumed are replenished by time alone.
#[derive(Debug)]
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}
