use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bucketgate::config::{BucketgateConfig, LogConfig, LogFormat};
use bucketgate::demo::{run_bursts, run_sequential};
use bucketgate::ratelimit::RateLimiter;

/// Drive requests through a token bucket or leaky bucket limiter.
#[derive(Debug, Parser)]
#[command(name = "bucketgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How requests are issued
    #[arg(short, long, value_enum, default_value_t = Mode::Sequential)]
    mode: Mode,

    /// Override the configured log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One request at a time, retrying denied requests
    Sequential,
    /// Concurrent bursts, denied requests are dropped
    Bursts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BucketgateConfig::from_file(path)?,
        None => BucketgateConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }

    init_tracing(&config.log);

    info!("Starting bucketgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        strategy = %config.limiter.strategy(),
        mode = ?cli.mode,
        "Configuration loaded"
    );

    let limiter = Arc::new(RateLimiter::from_config(&config.limiter)?);

    let report = match cli.mode {
        Mode::Sequential => run_sequential(limiter.as_ref(), &config.demo).await,
        Mode::Bursts => run_bursts(limiter.clone(), &config.demo).await,
    };

    limiter.stop().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} admitted, {} denied in {}ms",
            report.strategy, report.admitted, report.denied, report.elapsed_ms
        );
    }

    info!("bucketgate stopped");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    match log.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }
}
