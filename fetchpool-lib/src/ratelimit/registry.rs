use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use super::bucket::TokenBucket;
use super::config::RateLimitConfig;
use super::host::{HostLimiter, HostStats};
use super::key::HostKey;
use crate::types::Result;

/// Lazily creates and caches one [`HostLimiter`] per host key.
///
/// The registry guarantees that at most one limiter instance ever exists per
/// key, even when multiple workers race to first-access the same key. Growth
/// is proportional to the number of distinct hosts observed in a run, not to
/// the number of requests.
///
/// A registry is owned by whoever drives the batch (constructor injection
/// into [`crate::FetchPool`]); there is no process-wide singleton.
#[derive(Debug)]
pub struct LimiterRegistry {
    hosts: DashMap<HostKey, Arc<HostLimiter>>,
    config: RateLimitConfig,
}

impl LimiterRegistry {
    /// Create an empty registry.
    ///
    /// The configuration is validated here, once, so that later
    /// [`get_or_create`](LimiterRegistry::get_or_create) calls cannot fail on
    /// misconfiguration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ErrorKind::InvalidLimiterConfig`] for an invalid
    /// configuration.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            hosts: DashMap::new(),
            config,
        })
    }

    /// Get the limiter for `key`, creating it on first access.
    ///
    /// # Panics
    ///
    /// Panics if the validated bucket parameters are rejected, which would be
    /// an internal invariant violation.
    #[must_use]
    pub fn get_or_create(&self, key: &HostKey) -> Arc<HostLimiter> {
        if let Some(limiter) = self.hosts.get(key) {
            return limiter.clone();
        }

        let bucket = TokenBucket::new(self.config.bucket_capacity, self.config.refill_per_second)
            // parameters were validated when the registry was built
            .expect("validated bucket parameters were rejected");
        let limiter = Arc::new(HostLimiter::new(
            key.clone(),
            self.config.per_host_concurrency,
            bucket,
        ));

        // Another worker may have created the limiter between the lookup
        // above and this insert; the entry API resolves the race in favor of
        // whichever instance landed first.
        match self.hosts.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => entry.insert(limiter).clone(),
        }
    }

    /// Number of distinct hosts observed so far.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Snapshot of per-host statistics for every host seen so far.
    #[must_use]
    pub fn all_host_stats(&self) -> HashMap<String, HostStats> {
        self.hosts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect()
    }

    /// The configuration this registry builds limiters from.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
