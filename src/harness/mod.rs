//! Benchmark harness.
//!
//! Provisions a data key once, then times a fixed number of sequential encrypt
//! operations, each on a brand-new client. Statistics and the histogram are computed
//! exactly once, after the loop, from the frozen sample sequence.

pub mod histogram;
pub mod percentiles;
pub mod report;
pub mod runner;
pub mod stats;

use std::io::Write;

pub use histogram::{Bucket, LatencyHistogram, DEFAULT_BUCKETS};
pub use percentiles::LatencyPercentiles;
pub use report::BenchmarkReport;
pub use runner::{BenchmarkRunner, RunTimings};
pub use stats::RunSummary;

use crate::error::Result;
use crate::provider::KmsProvider;

/// Set up, run, and reduce one benchmark.
///
/// Progress goes to `out`. Any failure, setup included, aborts before a report exists.
pub async fn run_benchmark<P: KmsProvider, W: Write>(
    runner: &BenchmarkRunner<P>,
    provider_label: &str,
    n_buckets: usize,
    out: &mut W,
) -> Result<Option<BenchmarkReport>> {
    let key = runner.setup().await?;
    tracing::debug!(key_id = %key.key_id, "Data key ready");

    let timings = runner.run(&key, out).await?;
    tracing::info!(
        requests = timings.iteration_secs.len(),
        duration_secs = timings.total_duration_secs,
        "Run complete"
    );

    BenchmarkReport::from_timings(provider_label, &timings, n_buckets)
}
