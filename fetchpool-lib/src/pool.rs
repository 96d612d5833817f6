//! The concurrent dispatch engine.
//!
//! A [`FetchPool`] runs a batch of URLs through a fixed worker pool while
//! enforcing two independent caps: a global in-flight limit (one semaphore
//! shared by all workers) and a per-host limit (semaphore + token bucket,
//! managed by the [`LimiterRegistry`]). Workers acquire the per-host gate
//! first and the global slot strictly after it, so a host stuck at its own
//! cap never pins global capacity that other hosts could use.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, mpsc};

use crate::ratelimit::{HostKey, LimiterRegistry, RateLimitConfig};
use crate::types::Result;
use crate::{ErrorKind, StopSignal};

/// One unit of queued work: the original position and the raw URL.
#[derive(Debug)]
struct WorkItem {
    index: usize,
    url: String,
}

/// A worker pool that fetches batches of URLs under global and per-host
/// admission control.
///
/// The pool owns its [`LimiterRegistry`] by default; use
/// [`with_registry`](FetchPool::with_registry) to share per-host limiters
/// across several batches.
///
/// ```
/// use fetchpool_lib::{FetchPool, Result};
/// use fetchpool_lib::ratelimit::RateLimitConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let pool = FetchPool::new(RateLimitConfig::default())?;
///     let urls = vec![
///         "https://a.example/1".to_string(),
///         "https://b.example/2".to_string(),
///     ];
///     let lengths = pool.run(urls, |url| async move { url.len() }).await?;
///     assert_eq!(lengths.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FetchPool {
    registry: Arc<LimiterRegistry>,
    global_semaphore: Arc<Semaphore>,
    config: RateLimitConfig,
}

impl FetchPool {
    /// Create a pool with its own fresh [`LimiterRegistry`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`] for an invalid
    /// configuration.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        let registry = Arc::new(LimiterRegistry::new(config)?);
        Ok(Self::with_registry(registry))
    }

    /// Create a pool around an externally owned registry, so that several
    /// batches share per-host limiters. The global in-flight semaphore is
    /// fresh per pool.
    #[must_use]
    pub fn with_registry(registry: Arc<LimiterRegistry>) -> Self {
        let config = *registry.config();
        Self {
            registry,
            global_semaphore: Arc::new(Semaphore::new(config.total_concurrency)),
            config,
        }
    }

    /// The registry backing this pool.
    #[must_use]
    pub const fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// Run `unit_of_work` over every URL and collect the outputs in input
    /// order, one output per input.
    ///
    /// The unit of work is expected to capture its own failures in its
    /// output (see [`crate::FetchResult`]); the pool treats the output as
    /// opaque data.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker task panics. Never errors for failures
    /// inside the unit of work.
    pub async fn run<T, F, Fut>(&self, urls: Vec<String>, unit_of_work: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let stop = StopSignal::new();
        self.run_with_stop(urls, unit_of_work, &stop).await
    }

    /// [`run`](FetchPool::run), racing the whole batch against a stop
    /// signal.
    ///
    /// A stop fired mid-batch unblocks every worker promptly — whether it is
    /// waiting to dequeue, waiting for admission, or mid-fetch — and all
    /// held permits are released. If the batch did not complete, the call
    /// returns [`ErrorKind::BatchCancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::BatchCancelled`] if the stop signal cut the
    /// batch short, or an error if a worker task panics.
    ///
    /// # Panics
    ///
    /// Panics if the dispatcher fails to produce exactly one output per
    /// input without having been cancelled.
    pub async fn run_with_stop<T, F, Fut>(
        &self,
        urls: Vec<String>,
        unit_of_work: F,
        stop: &StopSignal,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let item_count = urls.len();
        if item_count == 0 {
            return Ok(Vec::new());
        }

        let (tx, rx) = mpsc::channel::<WorkItem>(self.config.work_queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let slots: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..item_count).map(|_| None).collect()));

        // Feed the bounded queue from a separate task; when workers lag, the
        // queue exerts backpressure on this producer instead of buffering
        // the whole batch.
        let mut producer_stop = stop.listener();
        let producer = tokio::spawn(async move {
            for (index, url) in urls.into_iter().enumerate() {
                tokio::select! {
                    sent = tx.send(WorkItem { index, url }) => {
                        if sent.is_err() {
                            // every worker is gone
                            break;
                        }
                    }
                    () = producer_stop.stopped() => break,
                }
            }
        });

        // Worker count follows the original formula: enough workers to
        // saturate the global cap, but never more than there are items.
        // With fewer items than `total_concurrency`, per-host caps above
        // the item count are therefore unreachable.
        let worker_count = item_count.min(self.config.total_concurrency);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let rx = Arc::clone(&rx);
            let slots = Arc::clone(&slots);
            let registry = Arc::clone(&self.registry);
            let global = Arc::clone(&self.global_semaphore);
            let work = unit_of_work.clone();
            let mut stop_rx = stop.listener();

            workers.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            dequeued = rx.recv() => match dequeued {
                                Some(item) => item,
                                None => break,
                            },
                            () = stop_rx.stopped() => break,
                        }
                    };

                    let key = HostKey::resolve(&item.url);
                    let limiter = registry.get_or_create(&key);

                    // Per-host gate first. The global slot is acquired
                    // strictly after it passes, so a host waiting at its own
                    // cap does not occupy global capacity.
                    let host_permit = tokio::select! {
                        permit = limiter.admit() => permit,
                        () = stop_rx.stopped() => break,
                    };

                    let global_permit = tokio::select! {
                        acquired = global.clone().acquire_owned() => {
                            acquired.expect("global semaphore closed unexpectedly")
                        }
                        () = stop_rx.stopped() => break,
                    };

                    let output = tokio::select! {
                        output = work(item.url) => output,
                        () = stop_rx.stopped() => break,
                    };

                    // Release in reverse acquisition order before recording
                    // the result. Early exits above release the same guards
                    // by drop.
                    drop(global_permit);
                    drop(host_permit);

                    slots.lock().await[item.index] = Some(output);
                }
            }));
        }

        let worker_results = futures::future::join_all(workers).await;

        // All worker handles have finished; drop our receiver so a producer
        // still blocked on a full queue observes the closed channel.
        drop(rx);
        producer.await?;
        for joined in worker_results {
            joined?;
        }

        let mut slots = slots.lock().await;
        let results: Vec<T> = slots.drain(..).flatten().collect();
        if results.len() != item_count && stop.is_stopped() {
            return Err(ErrorKind::BatchCancelled);
        }
        assert_eq!(
            results.len(),
            item_count,
            "dispatcher must produce exactly one output per input"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// In-flight counters shared with the instrumented unit of work.
    #[derive(Debug, Default)]
    struct Inflight {
        global: usize,
        per_host: std::collections::HashMap<String, usize>,
        max_global: usize,
        max_per_host: std::collections::HashMap<String, usize>,
    }

    fn config(total: usize, per_host: usize) -> RateLimitConfig {
        RateLimitConfig {
            total_concurrency: total,
            per_host_concurrency: per_host,
            // generous bucket so only the semaphores shape these tests
            bucket_capacity: 10_000.0,
            refill_per_second: 10_000.0,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = FetchPool::new(RateLimitConfig::default()).unwrap();
        let results: Vec<usize> = pool.run(Vec::new(), |url| async move { url.len() }).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_one_result_per_item_in_input_order() {
        let pool = FetchPool::new(config(4, 2)).unwrap();
        let urls: Vec<String> = (0..25)
            .map(|i| format!("https://h{}.example/{i}", i % 3))
            .collect();

        let results = pool
            .run(urls.clone(), |url| async move {
                // uneven delays shuffle completion order
                let jitter = url.bytes().map(u64::from).sum::<u64>() % 7;
                tokio::time::sleep(Duration::from_millis(jitter)).await;
                url
            })
            .await
            .unwrap();

        assert_eq!(results, urls);
    }

    #[tokio::test]
    async fn test_pool_respects_global_and_per_host_caps() {
        let total = 7;
        let per_host = 3;
        let pool = FetchPool::new(config(total, per_host)).unwrap();

        let mut urls = vec!["https://a.example/x".to_string(); 20];
        urls.extend(vec!["https://b.example/y".to_string(); 20]);

        let inflight = Arc::new(StdMutex::new(Inflight::default()));
        let observer = Arc::clone(&inflight);

        let results = pool
            .run(urls.clone(), move |url| {
                let inflight = Arc::clone(&observer);
                async move {
                    let host = HostKey::resolve(&url).as_str().to_string();
                    {
                        let mut counts = inflight.lock().unwrap();
                        counts.global += 1;
                        *counts.per_host.entry(host.clone()).or_default() += 1;
                        counts.max_global = counts.max_global.max(counts.global);
                        let host_count = counts.per_host[&host];
                        let max = counts.max_per_host.entry(host.clone()).or_default();
                        *max = (*max).max(host_count);
                    }

                    tokio::time::sleep(Duration::from_millis(20)).await;

                    {
                        let mut counts = inflight.lock().unwrap();
                        counts.global -= 1;
                        *counts.per_host.get_mut(&host).unwrap() -= 1;
                    }
                    host
                }
            })
            .await
            .unwrap();

        assert_eq!(results.len(), urls.len());
        assert_eq!(results.iter().filter(|h| *h == "a.example").count(), 20);
        assert_eq!(results.iter().filter(|h| *h == "b.example").count(), 20);

        let counts = inflight.lock().unwrap();
        assert!(
            counts.max_global <= total,
            "global cap exceeded: {} > {total}",
            counts.max_global
        );
        for (host, max) in &counts.max_per_host {
            assert!(
                *max <= per_host,
                "per-host cap exceeded for {host}: {max} > {per_host}"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_urls_still_produce_results() {
        let pool = FetchPool::new(config(4, 2)).unwrap();
        let urls = vec![
            "not a url".to_string(),
            "https://ok.example/".to_string(),
            "::::".to_string(),
        ];

        let results = pool
            .run(urls, |url| async move { HostKey::resolve(&url).as_str().to_string() })
            .await
            .unwrap();

        assert_eq!(results, vec!["unknown", "ok.example", "unknown"]);
        assert_eq!(pool.registry().host_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_returns_error_and_leaks_no_permits() {
        let registry = Arc::new(LimiterRegistry::new(config(4, 4)).unwrap());
        let pool = FetchPool::with_registry(Arc::clone(&registry));

        let stop = StopSignal::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.stop();
        });

        let urls = vec!["https://slow.example/x".to_string(); 50];
        let outcome = pool
            .run_with_stop(urls, |_url| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                1_u8
            }, &stop)
            .await;
        assert!(matches!(outcome, Err(ErrorKind::BatchCancelled)));

        // A fresh batch over the same registry must still reach the full
        // configured concurrency; leaked host permits would cap it lower
        // (or hang it outright).
        let pool = FetchPool::with_registry(registry);
        let inflight = Arc::new(StdMutex::new((0_usize, 0_usize)));
        let observer = Arc::clone(&inflight);

        let urls = vec!["https://slow.example/x".to_string(); 8];
        let results = tokio::time::timeout(
            Duration::from_secs(10),
            pool.run(urls, move |_url| {
                let inflight = Arc::clone(&observer);
                async move {
                    {
                        let mut counts = inflight.lock().unwrap();
                        counts.0 += 1;
                        counts.1 = counts.1.max(counts.0);
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    inflight.lock().unwrap().0 -= 1;
                }
            }),
        )
        .await
        .expect("batch after cancellation did not complete")
        .unwrap();

        assert_eq!(results.len(), 8);
        let max_inflight = inflight.lock().unwrap().1;
        assert_eq!(
            max_inflight, 4,
            "expected the full configured concurrency after cancellation"
        );
    }

    #[tokio::test]
    async fn test_stop_before_run_cancels_immediately() {
        let pool = FetchPool::new(config(2, 2)).unwrap();
        let stop = StopSignal::new();
        stop.stop();

        let urls = vec!["https://a.example/x".to_string(); 4];
        let outcome = pool
            .run_with_stop(urls, |_url| async move { 1_u8 }, &stop)
            .await;
        assert!(matches!(outcome, Err(ErrorKind::BatchCancelled)));
    }

    #[tokio::test]
    async fn test_small_queue_applies_backpressure_without_deadlock() {
        let cfg = RateLimitConfig {
            work_queue_capacity: 2,
            ..config(3, 3)
        };
        let pool = FetchPool::new(cfg).unwrap();
        let urls: Vec<String> = (0..40).map(|i| format!("https://q.example/{i}")).collect();

        let results = pool
            .run(urls.clone(), |url| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                url
            })
            .await
            .unwrap();
        assert_eq!(results, urls);
    }
}
