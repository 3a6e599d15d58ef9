//! Fixed-width latency histogram spanning `[0, max]`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucket count used when none is configured
pub const DEFAULT_BUCKETS: usize = 10;

/// One equal-width slice of the observed duration range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lower_secs: f64,
    pub upper_secs: f64,
    pub count: usize,
    pub percentage: f64,
    /// Only the last bucket includes its upper bound
    pub inclusive_upper: bool,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracket = if self.inclusive_upper { ']' } else { ')' };
        write!(
            f,
            "[{:.2}-{:.2}s{} : {} ({:.2}%)",
            self.lower_secs, self.upper_secs, bracket, self.count, self.percentage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Width of every bucket; zero when all samples are zero
    pub range_secs: f64,
    pub buckets: Vec<Bucket>,
}

impl LatencyHistogram {
    /// Partition the samples into `n_buckets` equal-width buckets.
    ///
    /// Every sample lands in exactly one bucket. The maximum sample, whose index
    /// computes to `n_buckets`, is kept in the last bucket. When the maximum is
    /// zero the width is zero and all samples go to the last bucket.
    pub fn compute(samples: &[f64], n_buckets: usize) -> Self {
        let n_buckets = n_buckets.max(1);
        let max = samples.iter().copied().fold(0.0_f64, f64::max);
        let range_secs = max / n_buckets as f64;

        let mut counts = vec![0usize; n_buckets];
        for &sample in samples {
            counts[bucket_index(sample, range_secs, n_buckets)] += 1;
        }

        let total = samples.len();
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(idx, count)| Bucket {
                lower_secs: range_secs * idx as f64,
                upper_secs: range_secs * (idx + 1) as f64,
                count,
                percentage: percentage(count, total),
                inclusive_upper: idx == n_buckets - 1,
            })
            .collect();

        Self {
            range_secs,
            buckets,
        }
    }

    /// Sum of all bucket counts
    pub fn total_count(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

/// Bucket for a single sample, always within `0..n_buckets`
pub fn bucket_index(sample: f64, range_secs: f64, n_buckets: usize) -> usize {
    let last = n_buckets.saturating_sub(1);
    if range_secs <= 0.0 || !range_secs.is_finite() {
        return last;
    }

    // Negative and NaN quotients saturate to 0 in the cast
    let idx = (sample / range_secs).floor() as usize;
    idx.min(last)
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * (count as f64 / total as f64)
}
