//! `fetchpool` is a library for fetching batches of URLs concurrently while
//! respecting a global in-flight cap and independent per-host rate limits.
//!
//! "Hello world" example:
//!
//! ```no_run
//! use fetchpool_lib::ratelimit::RateLimitConfig;
//! use fetchpool_lib::{fetch_batch, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let urls = vec![
//!         "https://example.com".to_string(),
//!         "https://example.org".to_string(),
//!     ];
//!     let results = fetch_batch(urls, RateLimitConfig::default()).await?;
//!     for result in &results {
//!         println!("{result}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For more control, build a [`FetchPool`] yourself and supply your own unit
//! of work; the pool only handles admission, dispatch, and ordered result
//! collection. Latency statistics over the collected results come from
//! [`stats::summarize`].

mod fetcher;
mod pool;
mod types;

pub mod ratelimit;
pub mod stats;

pub use fetcher::{fetch_batch, fetch_batch_with_pool, Fetcher};
pub use pool::FetchPool;
pub use types::*;
