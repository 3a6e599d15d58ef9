//! Summary statistics over a completed run.

use serde::{Deserialize, Serialize};

/// Aggregate figures for one run, computed once after the loop finishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: usize,
    /// Measured around the whole loop, so it includes per-iteration overhead
    pub total_duration_secs: f64,
    /// `None` when the run duration is not positive
    pub requests_per_second: Option<f64>,
    pub max_request_secs: f64,
    /// Lower median: element `n / 2` of the sorted samples
    pub median_request_secs: f64,
}

impl RunSummary {
    /// Reduce the per-iteration samples and the whole-run duration.
    ///
    /// Returns `None` for an empty sample sequence. The samples are copied before
    /// sorting, so the caller's iteration order is preserved.
    pub fn compute(samples: &[f64], total_duration_secs: f64) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let total_requests = samples.len();
        let max_request_secs = sorted[total_requests - 1];
        let median_request_secs = sorted[total_requests / 2];

        Some(Self {
            total_requests,
            total_duration_secs,
            requests_per_second: requests_per_second(total_requests, total_duration_secs),
            max_request_secs,
            median_request_secs,
        })
    }
}

/// Throughput over the whole run
pub fn requests_per_second(total_requests: usize, total_duration_secs: f64) -> Option<f64> {
    if total_duration_secs > 0.0 && total_duration_secs.is_finite() {
        Some(total_requests as f64 / total_duration_secs)
    } else {
        None
    }
}
