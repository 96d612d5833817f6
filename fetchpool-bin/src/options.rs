use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use fetchpool_lib::ratelimit::RateLimitConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5555;
const DEFAULT_MAX_LINE_BYTES: usize = 8192;

#[derive(Debug, Parser)]
#[command(
    name = "fetchpool",
    version,
    about = "A rate-limited, concurrency-capped batch URL fetcher",
    propagate_version = true
)]
pub(crate) struct Opts {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Fetch a batch of URLs and report latency statistics
    Fetch(FetchArgs),
    /// Run the line-based command server
    Serve(ServeArgs),
}

/// Limits shared by every way of driving a batch.
#[derive(Debug, clap::Args)]
pub(crate) struct LimitArgs {
    /// Maximum concurrently in-flight requests across all hosts
    #[arg(long, default_value_t = 50)]
    pub(crate) max_concurrency: usize,

    /// Maximum concurrently in-flight requests per host
    #[arg(long, default_value_t = 10)]
    pub(crate) host_concurrency: usize,

    /// Per-host token bucket capacity
    #[arg(long, default_value_t = 5.0)]
    pub(crate) bucket_capacity: f64,

    /// Per-host token bucket refill rate, in tokens per second
    #[arg(long, default_value_t = 5.0)]
    pub(crate) refill_per_second: f64,

    /// Per-request timeout, e.g. `10s` or `2500ms`
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub(crate) timeout: Duration,

    /// Capacity of the dispatcher work queue
    #[arg(long, default_value_t = 500)]
    pub(crate) queue_capacity: usize,
}

impl LimitArgs {
    pub(crate) fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            total_concurrency: self.max_concurrency,
            per_host_concurrency: self.host_concurrency,
            bucket_capacity: self.bucket_capacity,
            refill_per_second: self.refill_per_second,
            request_timeout: self.timeout,
            work_queue_capacity: self.queue_capacity,
        }
    }
}

/// Output format for the final latency summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StatsFormat {
    /// One human-readable line
    Compact,
    /// A JSON object with all summary fields
    Json,
}

#[derive(Debug, clap::Args)]
pub(crate) struct FetchArgs {
    /// URLs to fetch
    pub(crate) urls: Vec<String>,

    /// Read additional URLs from a file, one per line (`#` starts a comment)
    #[arg(long, value_name = "FILE")]
    pub(crate) urls_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) limits: LimitArgs,

    /// Output format for the final summary
    #[arg(long, value_enum, default_value = "compact")]
    pub(crate) format: StatsFormat,

    /// Print one line per fetched URL
    #[arg(short, long)]
    pub(crate) verbose: bool,

    /// Show per-host statistics after the summary
    #[arg(long)]
    pub(crate) host_stats: bool,
}

#[derive(Debug, clap::Args)]
pub(crate) struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "FETCHPOOL_HOST", default_value = DEFAULT_HOST)]
    pub(crate) host: String,

    /// Port to bind
    #[arg(long, env = "FETCHPOOL_PORT", default_value_t = DEFAULT_PORT)]
    pub(crate) port: u16,

    /// Maximum accepted request line length, in bytes
    #[arg(long, env = "FETCHPOOL_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub(crate) max_line_bytes: usize,

    /// Gate commands through a server-level token bucket
    #[arg(long)]
    pub(crate) limiter: bool,

    /// Token bucket capacity for `--limiter`
    #[arg(long, default_value_t = 5.0)]
    pub(crate) limiter_capacity: f64,

    /// Token bucket refill rate for `--limiter`, in tokens per second
    #[arg(long, default_value_t = 1.0)]
    pub(crate) limiter_refill: f64,
}
