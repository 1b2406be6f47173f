use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blob_estimator::{auto_alphas, constant_demand_series, DemandRegime, DemandScalars};
use core_types::{InputSeries, ScoreWeights, SimulationConfig};
use serde::{Deserialize, Serialize};
use sweep_engine::{SweepGrid, SWEEP_MAX_BLOCKS};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "configs/feesim.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct DemandConfig {
    pub(crate) l2_gas_per_l2_block: f64,
    pub(crate) l2_block_time_sec: f64,
    pub(crate) regime: DemandRegime,
    /// Derive feedforward alphas from the cost of an average proposal.
    pub(crate) auto_alpha: bool,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            l2_gas_per_l2_block: 1_000_000.0,
            l2_block_time_sec: 2.0,
            regime: DemandRegime::Base,
            auto_alpha: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct SweepSection {
    pub(crate) max_range_len: usize,
    pub(crate) top: usize,
    pub(crate) grid: SweepGrid,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            max_range_len: SWEEP_MAX_BLOCKS,
            top: 10,
            grid: SweepGrid::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct FeesimConfig {
    pub(crate) simulation: SimulationConfig,
    pub(crate) scoring: ScoreWeights,
    pub(crate) demand: DemandConfig,
    pub(crate) sweep: SweepSection,
}

impl FeesimConfig {
    pub(crate) fn demand_scalars(&self) -> DemandScalars {
        DemandScalars::derive(
            self.demand.l2_gas_per_l2_block,
            self.demand.l2_block_time_sec,
            self.demand.regime,
            self.simulation.post_every_blocks,
        )
    }

    /// Simulation config with auto alphas filled in when enabled.
    pub(crate) fn effective_simulation(&self) -> SimulationConfig {
        let mut cfg = self.simulation.clone();
        if self.demand.auto_alpha {
            let alphas = auto_alphas(
                cfg.l1_gas_used,
                cfg.blob_mode,
                cfg.fixed_num_blobs,
                &cfg.blob_model,
                self.demand_scalars().base_gas_per_proposal,
            );
            tracing::info!(
                alpha_gas = alphas.alpha_gas,
                alpha_blob = alphas.alpha_blob,
                blobs = alphas.blobs,
                "auto feedforward alphas"
            );
            cfg.alpha_gas = alphas.alpha_gas;
            cfg.alpha_blob = alphas.alpha_blob;
        }
        cfg
    }

    /// Fill a missing demand series with the configured constant demand.
    pub(crate) fn complete_inputs(&self, mut inputs: InputSeries) -> InputSeries {
        if inputs.l2_gas_per_l1_block.is_empty() {
            let gas = self.demand_scalars().gas_per_l1_block;
            inputs.l2_gas_per_l1_block = constant_demand_series(inputs.len(), gas);
        }
        inputs
    }
}

pub(crate) fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| {
            std::env::var("FEESIM_CONFIG_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub(crate) fn parse_config(raw: &str) -> Result<FeesimConfig> {
    toml::from_str(raw).context("parse feesim config")
}

pub(crate) fn load_config(path: &Path) -> Result<FeesimConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(FeesimConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("config {}", path.display()))
}

pub(crate) fn load_series(path: &Path) -> Result<InputSeries> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read series {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse series {}", path.display()))
}
