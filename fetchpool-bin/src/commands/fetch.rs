use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use fetchpool_lib::ratelimit::HostStats;
use fetchpool_lib::{fetch_batch_with_pool, stats, FetchPool};

use crate::options::{FetchArgs, StatsFormat};

/// Fetch the batch and print the latency report.
pub(crate) async fn fetch(args: &FetchArgs) -> Result<ExitCode> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.urls_file {
        urls.extend(read_urls(path)?);
    }
    if urls.is_empty() {
        bail!("no URLs given; pass them as arguments or via --urls-file");
    }

    let config = args.limits.to_config();
    let pool = FetchPool::new(config)?;

    let started = Instant::now();
    let results = fetch_batch_with_pool(&pool, urls, config.request_timeout).await?;
    let wall = started.elapsed().as_secs_f64();

    if args.verbose {
        for result in &results {
            println!("{result}");
        }
    }

    let ok_latencies: Vec<f64> = results
        .iter()
        .filter(|result| result.ok)
        .map(|result| result.elapsed_seconds)
        .collect();
    let summary = stats::summarize(&ok_latencies, Some(wall));

    match args.format {
        StatsFormat::Compact => {
            println!(
                "urls={} ok={} failed={} total_s={wall:.3}",
                results.len(),
                ok_latencies.len(),
                results.len() - ok_latencies.len()
            );
            println!("{summary}");
        }
        StatsFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    if args.host_stats {
        print_host_stats(&pool.registry().all_host_stats());
    }

    Ok(if results.iter().any(|result| result.ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Read URLs from a file, one per line. Blank lines and `#` comments are
/// skipped.
fn read_urls(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read URL file `{}`", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Print per-host counters, busiest hosts first.
fn print_host_stats(all_stats: &HashMap<String, HostStats>) {
    let mut sorted: Vec<_> = all_stats.iter().collect();
    sorted.sort_by_key(|(_, stats)| std::cmp::Reverse(stats.total_requests));

    println!("host stats:");
    for (host, stats) in sorted {
        println!(
            "  {host}: requests={} ok={} failed={}",
            stats.total_requests, stats.successes, stats.failures
        );
    }
}
