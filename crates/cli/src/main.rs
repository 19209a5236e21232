//! Time-series anomaly detector CLI
//!
//! Fetches one metric series, scores it against a rolling-median baseline
//! and prints the anomaly report as JSON on stdout.

mod output;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anomaly_lib::{
    ConfigError, DetectError, Detector, DetectorMetrics, FileFetcher, PrometheusFetcher,
    SeriesFetcher,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use output::OutputFormat;
use settings::{Overrides, Settings};

/// Exit status for invalid or missing configuration
const EXIT_CONFIG: u8 = 2;
/// Exit status for backend and I/O failures
const EXIT_FAILURE: u8 = 1;

/// Time-series anomaly detector
#[derive(Parser)]
#[command(name = "anomaly-detect")]
#[command(author, version, about = "Detect anomalies in a Prometheus metric series", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Settings file (TOML); defaults to ~/.config/aiops-anomaly/config.toml
    #[arg(long, short, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Replay a saved query_range response instead of querying the backend
    #[arg(long, short, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write run metrics in text exposition format to this file
    #[arg(long, value_name = "PATH")]
    pub metrics_file: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(long, short)]
    pub verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{:#}", err));
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Logs go to stderr; stdout carries only the report
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides)?;
    let config = settings.into_detector_config()?;

    let fetcher: Box<dyn SeriesFetcher> = match &cli.input {
        Some(path) => {
            info!(path = %path.display(), "Replaying saved response");
            Box::new(FileFetcher::new(path))
        }
        None => Box::new(PrometheusFetcher::from_config(&config)?),
    };

    let metrics = DetectorMetrics::new().context("Failed to register detector metrics")?;
    let detector = Detector::new(&config)?.with_metrics(metrics.clone());
    let range = config.time_range(chrono::Utc::now().timestamp());

    let result = detector.run(fetcher.as_ref(), &range).await;

    if let Some(path) = &cli.metrics_file {
        if let Err(e) = metrics.write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    let analysis = result.context("Detection run failed")?;
    let json = output::render_json(&analysis.report).context("Failed to serialize report")?;

    if let Some(path) = &cli.output {
        std::fs::write(path, format!("{}\n", json))
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    match cli.format {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Table => output::print_report(&analysis, &config),
    }

    Ok(())
}

/// Configuration problems exit with 2, everything else with 1
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_CONFIG;
    }
    match err.downcast_ref::<DetectError>() {
        Some(DetectError::Config(_)) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}
