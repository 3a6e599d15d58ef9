use anyhow::Result;
use std::io::{self, Write};
use std::time::Duration;

use kms_latency_bench::config::Config;
use kms_latency_bench::harness::{self, BenchmarkRunner};
use kms_latency_bench::provider::AnyProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // stdout carries the report, so logs go to stderr
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::info!("🚀 KMS latency bench starting...");
    tracing::info!(
        provider = %config.provider,
        requests = config.total_requests,
        buckets = config.n_buckets,
        "Benchmark configured"
    );

    let provider = AnyProvider::start(
        &config.provider,
        Duration::from_secs(config.request_timeout),
    )
    .await?;
    let mut runner =
        BenchmarkRunner::new(provider, config.total_requests, config.payload.as_bytes());

    // Keep stdout pure JSON when it is requested
    let mut progress: Box<dyn Write> = if config.json_output {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let outcome = harness::run_benchmark(
        &runner,
        &config.provider.to_string(),
        config.n_buckets,
        &mut progress,
    )
    .await;
    runner.provider_mut().shutdown();

    let report = match outcome {
        Ok(Some(report)) => report,
        Ok(None) => anyhow::bail!("Run produced no samples"),
        Err(e) => {
            tracing::error!("❌ Benchmark aborted: {}", e);
            return Err(e.into());
        }
    };

    if config.json_output {
        writeln!(io::stdout().lock(), "{}", report.to_json())?;
    } else {
        report.print_text()?;
    }

    tracing::info!("👋 Benchmark complete");
    Ok(())
}
