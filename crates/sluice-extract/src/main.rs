//! sluice - extract one configured job to a versioned file
//!
//! # Usage
//!
//! ```bash
//! # Extract with a timestamp version and the configured default format
//! sluice daily_orders
//!
//! # Explicit version (fails if it already exists), CSV output
//! sluice daily_orders --version v1 --format csv --annotation "backfill"
//!
//! # Alternate config, debug logging
//! sluice daily_orders -c other.yaml -v
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sluice_extract::{JobRunner, OutputFormat, RunOptions};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Stream a SQL query result into a versioned Parquet or CSV file")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Job name from the configuration
    job: String,

    /// Version label; defaults to the current timestamp
    #[arg(long)]
    version: Option<String>,

    /// Free-text note stored in the run metadata
    #[arg(long, default_value = "")]
    annotation: String,

    /// Path to configuration file
    #[arg(short, long, default_value = "pipeline_config.yaml")]
    config: PathBuf,

    /// Output format; defaults to storage.default_format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Log file, written in addition to stderr
    #[arg(long, default_value = "pipeline_execution.log")]
    log_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, &cli.log_file);

    let result = run(cli).await;
    if let Err(e) = &result {
        error!("pipeline failed: {:#}", e);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut runner = JobRunner::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let options = RunOptions {
        version: cli.version,
        annotation: cli.annotation,
        format: cli.format,
        command: std::env::args().collect::<Vec<_>>().join(" "),
    };

    let metadata = runner
        .run(&cli.job, &options)
        .await
        .with_context(|| format!("Job '{}' failed", cli.job))?;

    info!(
        "Job '{}' version {} complete: {} rows in {:.2}s",
        metadata.job, metadata.version, metadata.rows, metadata.duration_sec
    );
    Ok(())
}

fn init_logging(verbose: bool, log_file: &std::path::Path) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let Some(name) = log_file.file_name() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    };

    let appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();
    Some(guard)
}
