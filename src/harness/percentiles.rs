//! Tail percentiles using HdrHistogram, reported alongside the fixed buckets.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Highest trackable latency: 10 minutes in microseconds
const MAX_TRACKABLE_US: u64 = 600_000_000;

/// Percentile breakdown in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub min_secs: f64,
    pub mean_secs: f64,
    pub p50_secs: f64,
    pub p90_secs: f64,
    pub p99_secs: f64,
    pub p999_secs: f64,
    pub count: u64,
}

impl LatencyPercentiles {
    /// Record the samples at microsecond resolution with 3 significant figures
    pub fn from_samples(samples: &[f64]) -> Result<Self> {
        let mut hist = Histogram::<u64>::new_with_bounds(1, MAX_TRACKABLE_US, 3)
            .map_err(|e| BenchError::Internal(anyhow::anyhow!("histogram bounds: {}", e)))?;

        for &sample in samples {
            let us = (sample * 1_000_000.0).round() as u64;
            hist.saturating_record(us.max(1));
        }

        if hist.len() == 0 {
            return Ok(Self::empty());
        }

        Ok(Self {
            min_secs: to_secs(hist.min()),
            mean_secs: hist.mean() / 1_000_000.0,
            p50_secs: to_secs(hist.value_at_quantile(0.50)),
            p90_secs: to_secs(hist.value_at_quantile(0.90)),
            p99_secs: to_secs(hist.value_at_quantile(0.99)),
            p999_secs: to_secs(hist.value_at_quantile(0.999)),
            count: hist.len(),
        })
    }

    /// All-zero placeholder for a run without samples
    pub fn empty() -> Self {
        Self {
            min_secs: 0.0,
            mean_secs: 0.0,
            p50_secs: 0.0,
            p90_secs: 0.0,
            p99_secs: 0.0,
            p999_secs: 0.0,
            count: 0,
        }
    }
}

fn to_secs(us: u64) -> f64 {
    us as f64 / 1_000_000.0
}
