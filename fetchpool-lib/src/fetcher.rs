//! The default unit of work: a GET request through a shared `reqwest`
//! client.
//!
//! Ordinary failures never escape as errors. Connection problems, timeouts,
//! and non-success statuses are all folded into the returned
//! [`FetchResult`], so the dispatcher always gets exactly one result per
//! item.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;

use crate::ratelimit::{HostKey, RateLimitConfig};
use crate::types::Result;
use crate::{ErrorKind, FetchPool, FetchResult};

/// User agent sent by the default fetcher
const USER_AGENT: &str = concat!("fetchpool/", env!("CARGO_PKG_VERSION"));

/// Fetches single URLs, reporting every outcome as a [`FetchResult`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Create a fetcher whose requests time out after `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BuildClient`] if the underlying HTTP client
    /// cannot be configured.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(ErrorKind::BuildClient)?;
        Ok(Self { client })
    }

    /// GET `url` and read the whole body.
    ///
    /// Infallible by design: whatever happens on the wire ends up inside the
    /// returned [`FetchResult`].
    pub async fn fetch(&self, url: &str) -> FetchResult {
        log::debug!("fetch start: {url}");
        let start = Instant::now();
        let outcome = self.get(url).await;
        let elapsed = start.elapsed().as_secs_f64();

        let result = match outcome {
            Ok((status, bytes_read)) if status.is_success() => {
                FetchResult::success(url, status.as_u16(), bytes_read, elapsed)
            }
            Ok((status, bytes_read)) => {
                FetchResult::http_failure(url, status.as_u16(), bytes_read, elapsed)
            }
            Err(error) => FetchResult::failure(url, error.to_string(), elapsed),
        };

        log::debug!(
            "fetch done: {url} ok={} status={:?} bytes={} elapsed_ms={:.3}",
            result.ok,
            result.status_code,
            result.bytes_read,
            result.elapsed_ms()
        );
        result
    }

    async fn get(&self, url: &str) -> std::result::Result<(StatusCode, usize), reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.len()))
    }
}

/// Fetch a batch of URLs under the given limits and return one
/// [`FetchResult`] per URL, in input order.
///
/// This is the library's all-in-one entry point: it builds a [`FetchPool`]
/// and a [`Fetcher`] from `config`, runs the batch, and records per-host
/// outcome statistics along the way.
///
/// ```no_run
/// use fetchpool_lib::ratelimit::RateLimitConfig;
/// use fetchpool_lib::{fetch_batch, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let urls = vec!["https://example.com".to_string()];
///     let results = fetch_batch(urls, RateLimitConfig::default()).await?;
///     for result in &results {
///         println!("{result}");
///     }
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns an error for an invalid configuration or if a worker task
/// panics; individual fetch failures are reported inside the results.
pub async fn fetch_batch(
    urls: Vec<String>,
    config: RateLimitConfig,
) -> Result<Vec<FetchResult>> {
    let pool = FetchPool::new(config)?;
    fetch_batch_with_pool(&pool, urls, config.request_timeout).await
}

/// [`fetch_batch`] over a caller-owned pool, so that several batches share
/// the same registry and host statistics.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or a worker task
/// panics.
pub async fn fetch_batch_with_pool(
    pool: &FetchPool,
    urls: Vec<String>,
    request_timeout: Duration,
) -> Result<Vec<FetchResult>> {
    let fetcher = Arc::new(Fetcher::new(request_timeout)?);
    let registry = Arc::clone(pool.registry());

    pool.run(urls, move |url| {
        let fetcher = Arc::clone(&fetcher);
        let registry = Arc::clone(&registry);
        async move {
            let result = fetcher.fetch(&url).await;
            registry
                .get_or_create(&HostKey::resolve(&url))
                .record_outcome(result.ok);
            result
        }
    })
    .await
}
