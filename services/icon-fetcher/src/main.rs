//! ICON forecast fetch service.
//!
//! Downloads DWD ICON global single-level fields, remaps them to a regular
//! lat/lon grid and writes clipped GeoTIFF rasters:
//! - Daily trigger at a configured time of day (UTC)
//! - One-shot mode for the currently expected run
//! - Explicit run mode for manual backfills
//! - Optional Prometheus metrics endpoint

mod config;
mod scheduler;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use nwp_common::ModelRun;
use nwp_pipeline::{CancellationToken, ProcessRunner, RunPipeline, STAGE_OUTCOMES_METRIC};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::ServiceConfig;
use scheduler::{target_run, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "icon-fetcher")]
#[command(about = "Fetch, regrid and rasterize ICON forecast fields")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "ICON_CONFIG", default_value = "config/icon.yaml")]
    config: PathBuf,

    /// Process the currently expected run once and exit
    #[arg(long, conflicts_with = "run")]
    once: bool,

    /// Process a specific model run (YYYYMMDDHH) and exit
    #[arg(long)]
    run: Option<ModelRun>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Port for the Prometheus metrics endpoint (disabled when unset)
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %args.config.display(), "Starting ICON fetcher");

    let config = ServiceConfig::load(&args.config)?;

    if let Some(port) = args.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::describe_counter!(
            STAGE_OUTCOMES_METRIC,
            "Stage outcomes per unit, labelled by stage and outcome"
        );
        info!(port, "Prometheus metrics exporter initialized");
    }

    let pipeline = RunPipeline::new(config.pipeline.clone(), Arc::new(ProcessRunner))
        .context("Failed to initialize pipeline")?;
    let mut scheduler = Scheduler::new(pipeline, config.schedule.clone());

    // Ctrl+C stops waiting immediately; a running pipeline stops at the next stage barrier
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_token.cancel();
    });

    let explicit = match (args.run, args.once) {
        (Some(run), _) => Some(run),
        (None, true) => Some(target_run(&config.schedule, Utc::now())),
        (None, false) => None,
    };

    match explicit {
        Some(run) => {
            info!(run = %run, "Running single pipeline pass");
            let report = scheduler.run_once(run, &cancel).await?;
            if report.failures() > 0 {
                warn!(run = %run, failures = report.failures(), "Pass finished with failed units");
            }
        }
        None => {
            info!(
                trigger_time = %config.schedule.trigger_time,
                lag_hours = config.schedule.lag_hours,
                "Starting daily schedule"
            );
            scheduler.run_forever(cancel).await;
        }
    }

    info!(state = ?scheduler.state(), "ICON fetcher stopped");
    Ok(())
}
