use std::sync::Mutex;
use std::time::Instant;

use crate::types::Result;
use crate::ErrorKind;

/// Mutable bucket state, guarded by the bucket's own lock.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: f64,
}

/// A continuous-refill token bucket.
///
/// Tokens accrue at `refill_per_second` up to `capacity`; refill is not
/// discretized into ticks, so fractional-second intervals earn fractional
/// credit. [`allow`](TokenBucket::allow) consumes tokens atomically and never
/// blocks; callers that want to wait poll it.
///
/// Time is injectable via [`allow_at`](TokenBucket::allow_at) for
/// deterministic tests. The production path uses a monotonic clock anchored
/// at construction.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    epoch: Instant,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// # Errors
    ///
    /// Fails fast with [`ErrorKind::InvalidLimiterConfig`] if `capacity` is
    /// not positive or `refill_per_second` is negative. Invalid parameters
    /// are never silently clamped.
    pub fn new(capacity: f64, refill_per_second: f64) -> Result<Self> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(ErrorKind::InvalidLimiterConfig(format!(
                "capacity must be > 0, got {capacity}"
            )));
        }
        if !refill_per_second.is_finite() || refill_per_second < 0.0 {
            return Err(ErrorKind::InvalidLimiterConfig(format!(
                "refill rate must be >= 0, got {refill_per_second}"
            )));
        }

        Ok(Self {
            capacity,
            refill_per_second,
            epoch: Instant::now(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: 0.0,
            }),
        })
    }

    /// Try to take `cost` tokens at the current monotonic time.
    ///
    /// Returns `Ok(true)` if the bucket admitted the request and consumed
    /// the tokens, `Ok(false)` if the balance was insufficient (the balance
    /// is left untouched).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidCost`] if `cost` is not positive.
    ///
    /// # Panics
    ///
    /// Panics if the bucket lock is poisoned.
    pub fn allow(&self, cost: f64) -> Result<bool> {
        self.allow_at(cost, self.epoch.elapsed().as_secs_f64())
    }

    /// [`allow`](TokenBucket::allow) with an explicit time, in seconds on the
    /// bucket's own timeline. Deterministic variant for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidCost`] if `cost` is not positive.
    ///
    /// # Panics
    ///
    /// Panics if the bucket lock is poisoned.
    pub fn allow_at(&self, cost: f64, now: f64) -> Result<bool> {
        if !cost.is_finite() || cost <= 0.0 {
            return Err(ErrorKind::InvalidCost(cost));
        }

        let mut state = self.state.lock().unwrap();

        // Refill first. Clock readings are monotonic in production, but an
        // injected `now` may step backwards; earn no credit in that case.
        let elapsed = (now - state.last_refill).max(0.0);
        state.tokens = self
            .capacity
            .min(state.tokens + elapsed * self.refill_per_second);
        state.last_refill = now;

        if state.tokens >= cost {
            state.tokens -= cost;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Maximum token balance.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate in tokens per second.
    #[must_use]
    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        self.state.lock().unwrap().tokens
    }
}
