//! Sequential iteration loop with a fresh KMS client per request.

use std::io::Write;
use std::time::Instant;

use crate::error::{BenchError, Result};
use crate::provider::{DataKeyRef, KmsClient, KmsProvider};

/// Marker written after every completed tenth of the run
const PROGRESS_MARKER: &str = ".";

/// Timings collected by one complete run
#[derive(Debug, Clone, PartialEq)]
pub struct RunTimings {
    /// Per-iteration seconds, in iteration order
    pub iteration_secs: Vec<f64>,
    /// Seconds around the whole loop
    pub total_duration_secs: f64,
}

/// Benchmark runner that drives the provider one request at a time
pub struct BenchmarkRunner<P> {
    provider: P,
    total_requests: usize,
    payload: Vec<u8>,
}

impl<P: KmsProvider> BenchmarkRunner<P> {
    /// Create a new benchmark runner
    pub fn new(provider: P, total_requests: usize, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            provider,
            total_requests,
            payload: payload.into(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn total_requests(&self) -> usize {
        self.total_requests
    }

    /// Provision the data key all iterations reuse. Not timed.
    pub async fn setup(&self) -> Result<DataKeyRef> {
        self.provider.create_data_key().await
    }

    /// Run every iteration, writing progress to `out`.
    ///
    /// The first failing iteration aborts the run; samples collected so far are dropped.
    pub async fn run<W: Write>(&self, key: &DataKeyRef, out: &mut W) -> Result<RunTimings> {
        let total = self.total_requests;
        let step = progress_step(total);
        let mut iteration_secs = Vec::with_capacity(total);

        writeln!(out, "Sending {} requests ... begin", total)?;
        out.flush()?;

        let run_start = Instant::now();
        for iteration in 0..total {
            let start = Instant::now();

            if let Err(e) = self.invoke_once(key).await {
                tracing::error!(iteration, error = %e, "Operation failed, aborting run");
                // Terminate the progress line before the error is reported
                let _ = writeln!(out);
                return Err(BenchError::operation(iteration, e));
            }

            let elapsed = start.elapsed().as_secs_f64();
            iteration_secs.push(elapsed);
            tracing::debug!(iteration, elapsed_ms = elapsed * 1000.0, "Request completed");

            if (iteration + 1) % step == 0 {
                write!(out, "{}", PROGRESS_MARKER)?;
                out.flush()?;
            }
        }
        let total_duration_secs = run_start.elapsed().as_secs_f64();

        writeln!(out)?;
        writeln!(out, "Sending {} requests ... end", total)?;
        out.flush()?;

        Ok(RunTimings {
            iteration_secs,
            total_duration_secs,
        })
    }

    /// Acquire a new client, encrypt once, and release the client on every path
    async fn invoke_once(&self, key: &DataKeyRef) -> Result<()> {
        let mut client = self.provider.connect().await?;
        let outcome = client.encrypt(&self.payload, key).await;
        client.close().await;
        outcome.map(|_| ())
    }
}

/// Iterations between progress markers; never zero
pub fn progress_step(total_requests: usize) -> usize {
    (total_requests / 10).max(1)
}
