use std::{path::Path, str::FromStr, time::Duration};

use anyhow::{Context, bail};
use serde::Deserialize;
use url::Url;

/// Which download loop(s) the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Bounded slot range, then exit.
    Historical,
    /// Follow the chain head from the finalized tail.
    Finalized,
    /// Both at once.
    Hybrid,
}

impl DownloadMode {
    pub fn runs_historical(&self) -> bool {
        matches!(self, DownloadMode::Historical | DownloadMode::Hybrid)
    }

    pub fn runs_finalized(&self) -> bool {
        matches!(self, DownloadMode::Finalized | DownloadMode::Hybrid)
    }
}

impl FromStr for DownloadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "historical" => DownloadMode::Historical,
            "finalized" => DownloadMode::Finalized,
            "hybrid" => DownloadMode::Hybrid,
            _ => bail!("unknown download mode: {s} (historical|finalized|hybrid)"),
        })
    }
}

/// Which fact families get derived and persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub block: bool,
    pub epoch: bool,
    pub transactions: bool,
    pub rewards: bool,
}

impl Metrics {
    /// Parse the comma-separated `--metrics` list. Transactions cannot be
    /// expanded without their blocks, and rewards need the epoch pipeline,
    /// so those are pulled in implicitly.
    pub fn parse(list: &str) -> anyhow::Result<Self> {
        let mut metrics = Metrics::default();
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            match item {
                "block" => metrics.block = true,
                "epoch" => metrics.epoch = true,
                "transactions" => metrics.transactions = true,
                "rewards" => metrics.rewards = true,
                _ => bail!("unknown metric: {item} (block|epoch|transactions|rewards)"),
            }
        }
        if metrics.transactions {
            metrics.block = true;
        }
        if metrics.rewards {
            metrics.epoch = true;
        }
        Ok(metrics)
    }
}

/// `--custom-pools-file` entry: a label applied to the reward rows of the
/// listed validators.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolValidators {
    pub pool_name: String,
    pub val_idxs: Vec<u64>,
}

pub fn read_custom_pools_file(path: &Path) -> anyhow::Result<Vec<PoolValidators>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read custom pools file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("could not parse custom pools file {}", path.display()))
}

/// `--validator-indexes` file: a top-level JSON array of validator indices.
pub fn read_validator_indexes(path: &Path) -> anyhow::Result<Vec<u64>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("could not read validator indexes file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("could not parse validator indexes file {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub bn_endpoint: Url,
    /// Execution client, required only when transaction metrics are on.
    pub el_endpoint: Option<Url>,
    pub db_url: String,
    pub init_slot: u64,
    pub final_slot: u64,
    pub download_mode: DownloadMode,
    pub metrics: Metrics,
    /// Rewards are restricted to these indices when non-empty.
    pub validator_indexes: Vec<u64>,
    pub pool_validators: Vec<PoolValidators>,
    /// Also persist rows for validators without duties in the scored epoch.
    pub missing_vals: bool,
    pub worker_num: usize,
    pub db_worker_num: usize,
    pub request_timeout: Duration,
}

impl AnalyzerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.download_mode.runs_historical() && self.final_slot <= self.init_slot {
            bail!(
                "provided slot range isn't valid: {}..{}",
                self.init_slot,
                self.final_slot
            );
        }
        if self.metrics.transactions && self.el_endpoint.is_none() {
            bail!("transaction metrics need an execution client endpoint");
        }
        Ok(())
    }
}
