pub mod cli;

use std::{process, time::Duration};

use anyhow::bail;
use clap::Parser;
use stakescope_analyzer::{AnalyzerConfig, ChainAnalyzer, Metrics};
use stakescope_beacon_api::{BeaconApiClient, client::DEFAULT_REQUEST_TIMEOUT};
use stakescope_consensus::{
    constants::{SECONDS_PER_SLOT, SLOTS_PER_EPOCH},
    epoch_at_slot,
};
use stakescope_db::DbService;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ValWindowConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("stakescope exited with error: {err:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Rewards(config) => {
            init_logging(&config.log_level)?;
            run_analyzer(config.into_analyzer_config()?).await
        }
        Commands::Blocks(config) => {
            init_logging(&config.log_level)?;
            let forced = Metrics {
                block: true,
                ..Default::default()
            };
            run_analyzer(config.into_analyzer_config(forced)?).await
        }
        Commands::States(config) => {
            init_logging(&config.log_level)?;
            let forced = Metrics {
                epoch: true,
                ..Default::default()
            };
            run_analyzer(config.into_analyzer_config(forced)?).await
        }
        Commands::ValWindow(config) => {
            init_logging(&config.log_level)?;
            run_val_window(config).await
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    if !matches!(level, "debug" | "info" | "warn" | "error") {
        bail!("unknown log level: {level} (debug|warn|info|error)");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().parse_lossy(level))
        .init();
    Ok(())
}

/// Run the analyzer to completion, draining the pipeline gracefully when a
/// shutdown signal arrives first.
async fn run_analyzer(config: AnalyzerConfig) -> anyhow::Result<()> {
    let analyzer = ChainAnalyzer::new(config).await?;
    let stop = analyzer.stop_handle();
    let mut run = tokio::spawn(analyzer.run());

    tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, draining before exit");
            stop.stop();
            run.await?
        }
    }
}

/// Once per epoch, delete reward rows that fell behind the configured
/// window.
async fn run_val_window(config: ValWindowConfig) -> anyhow::Result<()> {
    let client = BeaconApiClient::new(config.bn_endpoint, DEFAULT_REQUEST_TIMEOUT)?;
    let db = DbService::connect(&config.db_url, 1).await?;
    let mut ticker =
        tokio::time::interval(Duration::from_secs(SECONDS_PER_SLOT * SLOTS_PER_EPOCH));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let head_slot = client.request_current_head_slot().await?;
                let head_epoch = epoch_at_slot(head_slot);
                let Some(horizon) = head_epoch.checked_sub(config.num_epochs) else {
                    continue;
                };
                let removed = db.prune_rewards_before(horizon).await?;
                info!("pruned {removed} reward rows below epoch {horizon}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    db.close().await
}
