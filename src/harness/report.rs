//! Report generation for a completed run.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use super::histogram::LatencyHistogram;
use super::percentiles::LatencyPercentiles;
use super::runner::RunTimings;
use super::stats::RunSummary;
use crate::error::Result;

/// Complete benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Provider label, e.g. "aws (eu-west-1)"
    pub provider: String,
    pub summary: RunSummary,
    pub histogram: LatencyHistogram,
    pub percentiles: LatencyPercentiles,
}

impl BenchmarkReport {
    /// Build the report from the frozen timings of a finished run.
    ///
    /// Returns `None` when the run produced no samples.
    pub fn from_timings(
        provider: impl Into<String>,
        timings: &RunTimings,
        n_buckets: usize,
    ) -> Result<Option<Self>> {
        let samples = &timings.iteration_secs;
        let Some(summary) = RunSummary::compute(samples, timings.total_duration_secs) else {
            return Ok(None);
        };

        Ok(Some(Self {
            provider: provider.into(),
            summary,
            histogram: LatencyHistogram::compute(samples, n_buckets),
            percentiles: LatencyPercentiles::from_samples(samples)?,
        }))
    }

    /// Write the statistics block and histogram
    pub fn write_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let s = &self.summary;

        writeln!(out)?;
        writeln!(out, "Total requests run    : {}", s.total_requests)?;
        writeln!(out, "Duration              : {:.2}s", s.total_duration_secs)?;
        match s.requests_per_second {
            Some(rps) => writeln!(out, "Avg requests/sec      : {:.2}", rps)?,
            None => writeln!(out, "Avg requests/sec      : n/a")?,
        }
        writeln!(out, "Max request time      : {:.2}s", s.max_request_secs)?;
        writeln!(out, "Median request time   : {:.2}s", s.median_request_secs)?;
        writeln!(out, "Histogram")?;
        for bucket in &self.histogram.buckets {
            writeln!(out, "{}", bucket)?;
        }
        out.flush()
    }

    /// Print the report to stdout
    pub fn print_text(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.write_text(&mut lock)
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings(samples: &[f64], total: f64) -> RunTimings {
        RunTimings {
            iteration_secs: samples.to_vec(),
            total_duration_secs: total,
        }
    }

    fn render(report: &BenchmarkReport) -> String {
        let mut out = Vec::new();
        report.write_text(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_layout() {
        let report = BenchmarkReport::from_timings(
            "mock",
            &timings(&[0.05, 0.15, 0.25, 0.35, 0.45], 2.5),
            5,
        )
        .unwrap()
        .unwrap();

        let expected = "\n\
            Total requests run    : 5\n\
            Duration              : 2.50s\n\
            Avg requests/sec      : 2.00\n\
            Max request time      : 0.45s\n\
            Median request time   : 0.25s\n\
            Histogram\n\
            [0.00-0.09s) : 1 (20.00%)\n\
            [0.09-0.18s) : 1 (20.00%)\n\
            [0.18-0.27s) : 1 (20.00%)\n\
            [0.27-0.36s) : 1 (20.00%)\n\
            [0.36-0.45s] : 1 (20.00%)\n";
        assert_eq!(render(&report), expected);
    }

    #[test]
    fn test_zero_duration_prints_na() {
        let report = BenchmarkReport::from_timings("mock", &timings(&[0.0, 0.0], 0.0), 2)
            .unwrap()
            .unwrap();

        assert_eq!(report.summary.requests_per_second, None);
        let text = render(&report);
        assert!(text.contains("Avg requests/sec      : n/a\n"));
        assert!(text.contains("[0.00-0.00s] : 2 (100.00%)\n"));
    }

    #[test]
    fn test_exactly_n_bucket_lines() {
        let samples: Vec<f64> = (1..=37).map(|i| i as f64 * 0.01).collect();
        let report = BenchmarkReport::from_timings("mock", &timings(&samples, 1.0), 7)
            .unwrap()
            .unwrap();

        let text = render(&report);
        let bucket_lines = text.lines().skip_while(|l| *l != "Histogram").skip(1).count();
        assert_eq!(bucket_lines, 7);
        assert_eq!(report.histogram.total_count(), 37);
    }

    #[test]
    fn test_empty_run_has_no_report() {
        let report = BenchmarkReport::from_timings("mock", &timings(&[], 0.0), 10).unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_json_contains_percentiles() {
        let report = BenchmarkReport::from_timings("aws (us-east-1)", &timings(&[0.1, 0.2], 0.4), 2)
            .unwrap()
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["provider"], "aws (us-east-1)");
        assert_eq!(json["summary"]["total_requests"], 2);
        assert_eq!(json["percentiles"]["count"], 2);
        assert_eq!(json["histogram"]["buckets"].as_array().unwrap().len(), 2);
    }
}
