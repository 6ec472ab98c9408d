//! DFS sweep runner
//!
//! Loads the sweep configuration, enumerates the test matrix and runs every
//! configuration against the controller, the RF tool and the traffic
//! service. Results land in two CSV files under the output directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dfs_common::ids;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use dfs_runner::config::RunnerConfig;
use dfs_runner::controller::CliRunner;
use dfs_runner::driver::Driver;
use dfs_runner::matrix;
use dfs_runner::radar::RadarTool;
use dfs_runner::report::ResultsWriter;
use dfs_runner::telemetry::HttpTelemetry;
use dfs_runner::traffic::HttpTraffic;

/// DFS compliance sweep.
#[derive(Parser, Debug)]
#[command(name = "dfs-runner", about = "Verify AP channel vacate behaviour under radar")]
struct Cli {
    /// Sweep configuration (TOML).
    #[arg(long, default_value = "dfs.toml")]
    config: PathBuf,

    /// Directory for the result CSV files.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix for the result CSV files.
    #[arg(long, default_value = "dfs")]
    prefix: String,

    /// Print the enumerated test ids and exit.
    #[arg(long, default_value_t = false)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Fatal preconditions are checked here, before any device is touched.
    let config = RunnerConfig::load(&cli.config)
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;

    let sweep = matrix::enumerate(&config.matrix);
    if cli.list {
        for id in matrix::listing(&sweep) {
            println!("{id}");
        }
        return Ok(());
    }

    let run_id = ids::run_id();
    tracing::info!(
        run_id = %run_id,
        configurations = sweep.configurations.len(),
        skipped = sweep.skipped,
        controller = %config.controller.host,
        series = %config.controller.series,
        "dfs-runner starting"
    );

    let telemetry = HttpTelemetry::new(&config.telemetry.url, config.telemetry.request_timeout)?;
    let traffic = HttpTraffic::new(
        &config.telemetry.url,
        config.telemetry.request_timeout,
        config.traffic.clone(),
    )?;
    let radar = Arc::new(RadarTool::new(config.radar.clone()));
    let runner = CliRunner;
    let mut writer = ResultsWriter::create(&cli.output_dir, &cli.prefix, &run_id)?;

    // ── Shutdown handling ───────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let driver = Driver::new(&config, &runner, &telemetry, &traffic, radar);
    let summary = driver.run(&sweep, &mut writer, shutdown_rx).await?;

    tracing::info!(
        results = %writer.results_path().display(),
        passed = summary.passed,
        runs = summary.runs,
        "dfs-runner stopped"
    );
    Ok(())
}
