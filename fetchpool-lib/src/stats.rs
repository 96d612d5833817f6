//! Post-hoc latency statistics over a completed batch.

use std::fmt;

use serde::Serialize;

/// Aggregate latency statistics for one batch.
///
/// Derived and immutable: a summary is recomputed from the full latency list
/// per batch, never updated incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Number of latencies that entered the summary
    pub count: usize,
    /// Sum of all latencies, in seconds
    pub total_seconds: f64,
    /// Completed requests per second of wall time
    pub rps: f64,
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Median latency in milliseconds
    pub p50_ms: f64,
    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,
    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,
    /// Smallest latency in milliseconds
    pub min_ms: f64,
    /// Largest latency in milliseconds
    pub max_ms: f64,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p50={:.1}ms p95={:.1}ms p99={:.1}ms mean={:.1}ms min={:.1}ms max={:.1}ms rps={:.1}",
            self.p50_ms, self.p95_ms, self.p99_ms, self.mean_ms, self.min_ms, self.max_ms, self.rps
        )
    }
}

/// Linear-interpolated quantile over sorted values, `q` in `[0, 1]`.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only,
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lower = pos.floor() as usize;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let upper = pos.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                #[allow(clippy::cast_precision_loss)]
                let weight = pos - lower as f64;
                sorted[lower] * (1.0 - weight) + sorted[upper] * weight
            }
        }
    }
}

/// Summarize a batch of latencies, given in seconds.
///
/// Negative and non-finite values are filtered out. With
/// `total_wall_seconds` present and positive, `rps` is computed against that
/// wall time; with it absent, the sum of the latencies stands in. An empty
/// input yields an all-zero summary.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(latencies_s: &[f64], total_wall_seconds: Option<f64>) -> LatencySummary {
    let mut values: Vec<f64> = latencies_s
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect();
    values.sort_by(f64::total_cmp);

    let count = values.len();
    if count == 0 {
        return LatencySummary::default();
    }

    let total_seconds: f64 = values.iter().sum();
    let rps = match total_wall_seconds {
        Some(wall) if wall > 0.0 => count as f64 / wall,
        Some(_) => 0.0,
        None if total_seconds > 0.0 => count as f64 / total_seconds,
        None => 0.0,
    };

    LatencySummary {
        count,
        total_seconds,
        rps,
        mean_ms: total_seconds / count as f64 * 1000.0,
        p50_ms: quantile(&values, 0.50) * 1000.0,
        p95_ms: quantile(&values, 0.95) * 1000.0,
        p99_ms: quantile(&values, 0.99) * 1000.0,
        min_ms: values[0] * 1000.0,
        max_ms: values[count - 1] * 1000.0,
    }
}
