use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blob gas consumed by a single EIP-4844 blob.
pub const BLOB_GAS_PER_BLOB: f64 = 131_072.0;
pub const WEI_PER_GWEI: f64 = 1e9;
pub const WEI_PER_ETH: f64 = 1e18;
pub const L1_BLOCK_TIME_SECONDS: f64 = 12.0;

pub const DEFAULT_POST_EVERY_BLOCKS: u64 = 10;
pub const DEFAULT_LAG_BLOCKS: u64 = 5;
pub const DEFAULT_DERIV_BETA: f64 = 0.8;
pub const DEFAULT_I_MAX: f64 = 10.0;
pub const DEFAULT_EIP1559_DENOMINATOR: u64 = 8;
pub const DEFAULT_ARB_INITIAL_PRICE_GWEI: f64 = 0.001;
pub const DEFAULT_ARB_INERTIA: u64 = 10;
pub const DEFAULT_ARB_EQUIL_UNITS: f64 = 96_000_000.0;

/// `lo.max(hi.min(x))`. Unlike `f64::clamp` this never panics on a reversed
/// or NaN bound; a NaN `x` resolves to `lo`.
#[inline]
pub fn clamp_num(x: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(x))
}

#[inline]
pub fn finite_or(x: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        fallback
    }
}

/// Finite and at least `floor`, otherwise `fallback` (then floored).
#[inline]
pub fn non_negative_or(x: f64, fallback: f64, floor: f64) -> f64 {
    finite_or(x, fallback).max(floor)
}

/// Whole-number config fields that also take floats and negatives. Finite
/// values are floored at 0, non-finite ones fall back to the field default.
mod count {
    use std::fmt;

    use serde::de::{self, Deserializer, Visitor};

    use super::{
        DEFAULT_ARB_INERTIA, DEFAULT_EIP1559_DENOMINATOR, DEFAULT_LAG_BLOCKS,
        DEFAULT_POST_EVERY_BLOCKS,
    };

    struct CountVisitor(u64);

    impl<'de> Visitor<'de> for CountVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(v.max(0) as u64)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            if v.is_finite() {
                Ok(v.max(0.0).floor() as u64)
            } else {
                Ok(self.0)
            }
        }
    }

    fn lenient<'de, D: Deserializer<'de>>(d: D, fallback: u64) -> Result<u64, D::Error> {
        d.deserialize_any(CountVisitor(fallback))
    }

    pub(super) fn or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        lenient(d, 0)
    }

    pub(super) fn or_lag<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        lenient(d, DEFAULT_LAG_BLOCKS)
    }

    pub(super) fn or_post_every<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        lenient(d, DEFAULT_POST_EVERY_BLOCKS)
    }

    pub(super) fn or_denominator<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        lenient(d, DEFAULT_EIP1559_DENOMINATOR)
    }

    pub(super) fn or_inertia<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        lenient(d, DEFAULT_ARB_INERTIA)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("range of {len} blocks exceeds the limit of {max} blocks")]
    RangeTooLarge { len: usize, max: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    #[default]
    Taiko,
    Eip1559,
    Arbitrum,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Taiko => "taiko",
            Self::Eip1559 => "eip1559",
            Self::Arbitrum => "arbitrum",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobMode {
    #[default]
    Fixed,
    Dynamic,
}

/// Which controller terms are active. Only a label for the simulation itself;
/// [`ControllerMode::apply`] turns it into concrete gains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ControllerMode {
    #[default]
    #[serde(rename = "ff")]
    Ff,
    #[serde(rename = "p")]
    P,
    #[serde(rename = "pi")]
    Pi,
    #[serde(rename = "pd")]
    Pd,
    #[serde(rename = "pdi")]
    Pdi,
    #[serde(rename = "pi+ff")]
    PiFf,
    #[serde(rename = "pdi+ff")]
    PdiFf,
}

impl ControllerMode {
    /// Zero the gains (and feedforward alphas) this mode switches off.
    pub fn apply(self, cfg: &mut SimulationConfig) {
        let zero_alphas = |cfg: &mut SimulationConfig| {
            cfg.alpha_gas = 0.0;
            cfg.alpha_blob = 0.0;
        };
        match self {
            Self::Ff => {
                cfg.kp = 0.0;
                cfg.ki = 0.0;
                cfg.kd = 0.0;
            }
            Self::P => {
                zero_alphas(cfg);
                cfg.ki = 0.0;
                cfg.kd = 0.0;
            }
            Self::Pi => {
                zero_alphas(cfg);
                cfg.kd = 0.0;
            }
            Self::Pd => {
                zero_alphas(cfg);
                cfg.ki = 0.0;
            }
            Self::Pdi => zero_alphas(cfg),
            Self::PiFf => cfg.kd = 0.0,
            Self::PdiFf => {}
        }
        cfg.controller_mode = self;
    }
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Ff => "ff",
            Self::P => "p",
            Self::Pi => "pi",
            Self::Pd => "pd",
            Self::Pdi => "pdi",
            Self::PiFf => "pi+ff",
            Self::PdiFf => "pdi+ff",
        };
        f.write_str(value)
    }
}

/// Byte-budget model used to size a proposal's blobs from its L2 gas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobModel {
    pub tx_gas: f64,
    pub tx_bytes: f64,
    pub batch_overhead_bytes: f64,
    pub compression_ratio: f64,
    /// Fraction of a blob's raw capacity that is actually usable, in (0, 1].
    pub blob_utilization: f64,
    pub min_blobs_per_proposal: f64,
}

impl Default for BlobModel {
    fn default() -> Self {
        Self {
            tx_gas: 70_000.0,
            tx_bytes: 120.0,
            batch_overhead_bytes: 1_200.0,
            compression_ratio: 1.0,
            blob_utilization: 0.95,
            min_blobs_per_proposal: 1.0,
        }
    }
}

impl BlobModel {
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        Self {
            tx_gas: non_negative_or(self.tx_gas, d.tx_gas, 1.0),
            tx_bytes: non_negative_or(self.tx_bytes, d.tx_bytes, 0.0),
            batch_overhead_bytes: non_negative_or(
                self.batch_overhead_bytes,
                d.batch_overhead_bytes,
                0.0,
            ),
            compression_ratio: non_negative_or(self.compression_ratio, d.compression_ratio, 1e-9),
            blob_utilization: clamp_num(
                finite_or(self.blob_utilization, d.blob_utilization),
                1e-9,
                1.0,
            ),
            min_blobs_per_proposal: non_negative_or(
                self.min_blobs_per_proposal,
                d.min_blobs_per_proposal,
                0.0,
            )
            .floor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Eip1559Config {
    #[serde(deserialize_with = "count::or_denominator")]
    pub max_change_denominator: u64,
}

impl Default for Eip1559Config {
    fn default() -> Self {
        Self {
            max_change_denominator: DEFAULT_EIP1559_DENOMINATOR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArbitrumConfig {
    pub initial_price_gwei: f64,
    #[serde(deserialize_with = "count::or_inertia")]
    pub inertia: u64,
    /// Equilibrium units: surplus is spread over this many L2 gas units.
    pub equil_units: f64,
}

impl Default for ArbitrumConfig {
    fn default() -> Self {
        Self {
            initial_price_gwei: DEFAULT_ARB_INITIAL_PRICE_GWEI,
            inertia: DEFAULT_ARB_INERTIA,
            equil_units: DEFAULT_ARB_EQUIL_UNITS,
        }
    }
}

/// Immutable per-run configuration. Fees are in wei per L2 gas, vault amounts
/// in ETH. Call [`SimulationConfig::sanitized`] before use; the simulator does
/// so itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub mechanism: Mechanism,
    pub controller_mode: ControllerMode,
    /// Blocks per settlement.
    #[serde(deserialize_with = "count::or_post_every")]
    pub post_every_blocks: u64,
    pub l1_gas_used: f64,
    pub blob_mode: BlobMode,
    #[serde(deserialize_with = "count::or_zero")]
    pub fixed_num_blobs: u64,
    pub blob_model: BlobModel,
    pub priority_fee_wei: f64,
    /// Feedforward lag in L1 blocks.
    #[serde(deserialize_with = "count::or_lag")]
    pub dff_blocks: u64,
    /// Feedback observation lag in L1 blocks; 0 behaves like 1.
    #[serde(deserialize_with = "count::or_lag")]
    pub dfb_blocks: u64,
    /// Derivative smoothing factor in [0, 1].
    pub deriv_beta: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub p_term_min_wei: f64,
    pub i_min: f64,
    pub i_max: f64,
    pub min_fee_wei: f64,
    pub max_fee_wei: f64,
    pub alpha_gas: f64,
    pub alpha_blob: f64,
    pub initial_vault_eth: f64,
    pub target_vault_eth: f64,
    pub eip1559: Eip1559Config,
    pub arbitrum: ArbitrumConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mechanism: Mechanism::Taiko,
            controller_mode: ControllerMode::Ff,
            post_every_blocks: DEFAULT_POST_EVERY_BLOCKS,
            l1_gas_used: 0.0,
            blob_mode: BlobMode::Fixed,
            fixed_num_blobs: 0,
            blob_model: BlobModel::default(),
            priority_fee_wei: 0.0,
            dff_blocks: DEFAULT_LAG_BLOCKS,
            dfb_blocks: DEFAULT_LAG_BLOCKS,
            deriv_beta: DEFAULT_DERIV_BETA,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            p_term_min_wei: 0.0,
            i_min: 0.0,
            i_max: DEFAULT_I_MAX,
            min_fee_wei: 0.0,
            max_fee_wei: 0.0,
            alpha_gas: 0.0,
            alpha_blob: 0.0,
            initial_vault_eth: 0.0,
            target_vault_eth: 0.0,
            eip1559: Eip1559Config::default(),
            arbitrum: ArbitrumConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Copy with every field forced into its valid domain. Non-finite values
    /// fall back to the field default; negative values are floored.
    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let i_min = finite_or(self.i_min, d.i_min);
        let i_max = finite_or(self.i_max, d.i_max);
        let min_fee_wei = non_negative_or(self.min_fee_wei, 0.0, 0.0);
        let max_fee_wei = finite_or(self.max_fee_wei, min_fee_wei).max(min_fee_wei);
        Self {
            mechanism: self.mechanism,
            controller_mode: self.controller_mode,
            post_every_blocks: self.post_every_blocks.max(1),
            l1_gas_used: non_negative_or(self.l1_gas_used, 0.0, 0.0),
            blob_mode: self.blob_mode,
            fixed_num_blobs: self.fixed_num_blobs,
            blob_model: self.blob_model.sanitized(),
            priority_fee_wei: non_negative_or(self.priority_fee_wei, 0.0, 0.0),
            dff_blocks: self.dff_blocks,
            dfb_blocks: self.dfb_blocks.max(1),
            deriv_beta: clamp_num(finite_or(self.deriv_beta, d.deriv_beta), 0.0, 1.0),
            kp: non_negative_or(self.kp, 0.0, 0.0),
            ki: non_negative_or(self.ki, 0.0, 0.0),
            kd: non_negative_or(self.kd, 0.0, 0.0),
            p_term_min_wei: finite_or(self.p_term_min_wei, 0.0),
            i_min: i_min.min(i_max),
            i_max: i_min.max(i_max),
            min_fee_wei,
            max_fee_wei,
            alpha_gas: non_negative_or(self.alpha_gas, 0.0, 0.0),
            alpha_blob: non_negative_or(self.alpha_blob, 0.0, 0.0),
            initial_vault_eth: non_negative_or(self.initial_vault_eth, 0.0, 0.0),
            target_vault_eth: non_negative_or(self.target_vault_eth, 0.0, 0.0),
            eip1559: Eip1559Config {
                max_change_denominator: self.eip1559.max_change_denominator.max(1),
            },
            arbitrum: ArbitrumConfig {
                initial_price_gwei: non_negative_or(
                    self.arbitrum.initial_price_gwei,
                    d.arbitrum.initial_price_gwei,
                    0.0,
                ),
                inertia: self.arbitrum.inertia.max(1),
                equil_units: non_negative_or(
                    self.arbitrum.equil_units,
                    d.arbitrum.equil_units,
                    1.0,
                ),
            },
        }
    }

    pub fn fee_range_wei(&self) -> f64 {
        (self.max_fee_wei - self.min_fee_wei).max(0.0)
    }

    pub fn max_fee_gwei(&self) -> f64 {
        self.max_fee_wei / WEI_PER_GWEI
    }
}

/// Aligned per-L1-block input series. Index = block offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputSeries {
    pub base_fee_gwei: Vec<f64>,
    pub blob_fee_gwei: Vec<f64>,
    #[serde(default)]
    pub l2_gas_per_l1_block: Vec<f64>,
    /// Optional block numbers, used only to label posting blocks.
    #[serde(default)]
    pub blocks: Option<Vec<u64>>,
}

impl InputSeries {
    pub fn len(&self) -> usize {
        self.base_fee_gwei.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ensure the series are non-empty and aligned; returns the common length.
    pub fn validate(&self) -> Result<usize, SimError> {
        let n = self.base_fee_gwei.len();
        if n == 0 {
            return Err(SimError::InvalidInput("input series are empty".to_string()));
        }
        if self.blob_fee_gwei.len() != n || self.l2_gas_per_l1_block.len() != n {
            return Err(SimError::InvalidInput(format!(
                "series lengths differ: base_fee={} blob_fee={} l2_gas={}",
                n,
                self.blob_fee_gwei.len(),
                self.l2_gas_per_l1_block.len()
            )));
        }
        if let Some(blocks) = &self.blocks {
            if blocks.len() != n {
                return Err(SimError::InvalidInput(format!(
                    "block label series has {} entries, expected {}",
                    blocks.len(),
                    n
                )));
            }
        }
        Ok(n)
    }

    /// Copy of `[start, end]` (inclusive). Caller validates the bounds.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            base_fee_gwei: self.base_fee_gwei[start..=end].to_vec(),
            blob_fee_gwei: self.blob_fee_gwei[start..=end].to_vec(),
            l2_gas_per_l1_block: self.l2_gas_per_l1_block[start..=end].to_vec(),
            blocks: self.blocks.as_ref().map(|b| b[start..=end].to_vec()),
        }
    }
}

/// Inclusive block range of a run plus the global index of input position 0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimRange {
    pub start: usize,
    pub end: usize,
    /// Added to the input index to obtain the global index the posting cadence
    /// is aligned to.
    pub block_index_offset: u64,
}

impl SimRange {
    pub fn full(len: usize) -> Self {
        Self {
            start: 0,
            end: len.saturating_sub(1),
            block_index_offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn validate(&self, series_len: usize) -> Result<(), SimError> {
        if self.end < self.start {
            return Err(SimError::InvalidInput(format!(
                "range end {} precedes range start {}",
                self.end, self.start
            )));
        }
        if self.end >= series_len {
            return Err(SimError::InvalidInput(format!(
                "range end {} is past the series end ({} blocks)",
                self.end, series_len
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClampState {
    #[default]
    #[serde(rename = "none")]
    Unclamped,
    Min,
    Max,
}

/// Component-level outputs, collected only when requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationBreakdown {
    pub gas_cost_eth: Vec<Option<f64>>,
    pub blob_cost_eth: Vec<Option<f64>>,
    pub posting_cost_eth: Vec<Option<f64>>,
    pub required_fee_gwei: Vec<Option<f64>>,
    pub gas_fee_component_gwei: Vec<Option<f64>>,
    pub blob_fee_component_gwei: Vec<Option<f64>>,
    pub feedforward_fee_gwei: Vec<Option<f64>>,
    pub p_term_fee_gwei: Vec<Option<f64>>,
    pub i_term_fee_gwei: Vec<Option<f64>>,
    pub d_term_fee_gwei: Vec<Option<f64>>,
    pub feedback_fee_gwei: Vec<Option<f64>>,
    /// Settlement blocks only.
    pub posting_revenue_eth: Vec<Option<f64>>,
    /// Settlement blocks only.
    pub posting_pnl_eth: Vec<Option<f64>>,
    /// Settlement blocks only.
    pub post_break_even: Vec<Option<bool>>,
    pub deficit_eth: Vec<Option<f64>>,
    pub epsilon: Vec<Option<f64>>,
    pub derivative: Vec<Option<f64>>,
    pub integral: Vec<Option<f64>>,
    pub clamp_state: Vec<Option<ClampState>>,
    /// Block labels of every settlement, in order.
    pub posting_blocks: Vec<u64>,
}

impl SimulationBreakdown {
    pub fn with_len(n: usize) -> Self {
        Self {
            gas_cost_eth: vec![None; n],
            blob_cost_eth: vec![None; n],
            posting_cost_eth: vec![None; n],
            required_fee_gwei: vec![None; n],
            gas_fee_component_gwei: vec![None; n],
            blob_fee_component_gwei: vec![None; n],
            feedforward_fee_gwei: vec![None; n],
            p_term_fee_gwei: vec![None; n],
            i_term_fee_gwei: vec![None; n],
            d_term_fee_gwei: vec![None; n],
            feedback_fee_gwei: vec![None; n],
            posting_revenue_eth: vec![None; n],
            posting_pnl_eth: vec![None; n],
            post_break_even: vec![None; n],
            deficit_eth: vec![None; n],
            epsilon: vec![None; n],
            derivative: vec![None; n],
            integral: vec![None; n],
            clamp_state: vec![None; n],
            posting_blocks: Vec::new(),
        }
    }
}

/// Simulation output, one slot per input block; `None` outside the run range.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSeries {
    pub charged_fee_gwei: Vec<Option<f64>>,
    pub vault_eth: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<SimulationBreakdown>,
}

impl OutputSeries {
    pub fn len(&self) -> usize {
        self.charged_fee_gwei.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charged_fee_gwei.is_empty()
    }
}

/// Inputs to a single controller step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepInputs {
    /// Position within the run (0 on the first simulated block).
    pub local_index: usize,
    pub epsilon: f64,
    /// Lagged L1 base fee (wei).
    pub base_fee_ff_wei: f64,
    /// Lagged L1 blob base fee (wei).
    pub blob_base_fee_ff_wei: f64,
}

/// Controller output for one block. Mechanisms without a term leave it at 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeeParts {
    pub charged_fee_wei: f64,
    pub gas_component_wei: f64,
    pub blob_component_wei: f64,
    pub feedforward_wei: f64,
    pub p_term_wei: f64,
    pub i_term_wei: f64,
    pub d_term_wei: f64,
    pub feedback_wei: f64,
    pub integral: f64,
    pub derivative: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementInputs {
    /// Vault balance right after the settlement was booked.
    pub vault_eth: f64,
    /// L2 gas attributed to the settled proposal.
    pub l2_gas_per_proposal: f64,
}

/// Per-run fee-setting state machine. Each run owns exactly one.
pub trait FeeController: Send {
    fn mechanism(&self) -> Mechanism;

    /// Fee charged for the current block.
    fn step(&mut self, inputs: &StepInputs) -> FeeParts;

    /// Called once per settlement block after the vault was updated.
    fn on_settlement(&mut self, _inputs: &SettlementInputs) {}
}

/// Scoring weights and the deficit deadband. Negative weights count as 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub deadband_pct: f64,
    pub w_health: f64,
    pub w_ux: f64,
    pub w_draw: f64,
    pub w_under: f64,
    pub w_area: f64,
    pub w_streak: f64,
    pub w_post_be: f64,
    pub w_std: f64,
    pub w_p95: f64,
    pub w_p99: f64,
    pub w_max_step: f64,
    pub w_clamp: f64,
    pub w_level: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            deadband_pct: 5.0,
            w_health: 0.75,
            w_ux: 0.25,
            w_draw: 0.35,
            w_under: 0.25,
            w_area: 0.2,
            w_streak: 0.1,
            w_post_be: 0.2,
            w_std: 0.2,
            w_p95: 0.2,
            w_p99: 0.1,
            w_max_step: 0.05,
            w_clamp: 0.05,
            w_level: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreMetrics {
    pub n: usize,
    pub deadband_pct: f64,
    pub max_drawdown_eth: f64,
    pub under_target_ratio: f64,
    pub post_break_even_ratio: f64,
    pub deficit_area_band: f64,
    pub worst_streak: usize,
    pub fee_std: f64,
    pub step_p95: f64,
    pub step_p99: f64,
    pub max_step: f64,
    pub clamp_max_ratio: f64,
    pub u_level: f64,
    pub d_draw: f64,
    pub d_under: f64,
    pub d_area: f64,
    pub d_streak: f64,
    pub d_post: f64,
    pub u_std: f64,
    pub u_p95: f64,
    pub u_p99: f64,
    pub u_max: f64,
    pub u_clamp: f64,
    pub health_badness: f64,
    pub ux_badness: f64,
    pub total_badness: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_display() {
        assert_eq!(Mechanism::Eip1559.to_string(), "eip1559");
        assert_eq!(ControllerMode::PdiFf.to_string(), "pdi+ff");
    }

    #[test]
    fn sanitize_orders_bounds_and_floors_lags() {
        let cfg = SimulationConfig {
            post_every_blocks: 0,
            dfb_blocks: 0,
            i_min: 4.0,
            i_max: -2.0,
            min_fee_wei: 5e8,
            max_fee_wei: 1e8,
            deriv_beta: 3.0,
            kp: -1.0,
            target_vault_eth: f64::NAN,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(cfg.post_every_blocks, 1);
        assert_eq!(cfg.dfb_blocks, 1);
        assert_eq!((cfg.i_min, cfg.i_max), (-2.0, 4.0));
        assert_eq!(cfg.max_fee_wei, cfg.min_fee_wei);
        assert_eq!(cfg.fee_range_wei(), 0.0);
        assert_eq!(cfg.deriv_beta, 1.0);
        assert_eq!(cfg.kp, 0.0);
        assert_eq!(cfg.target_vault_eth, 0.0);
    }

    #[test]
    fn blob_model_sanitize_substitutes_floors() {
        let model = BlobModel {
            tx_gas: 0.0,
            compression_ratio: -3.0,
            blob_utilization: 7.0,
            min_blobs_per_proposal: f64::INFINITY,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(model.tx_gas, 1.0);
        assert_eq!(model.compression_ratio, 1e-9);
        assert_eq!(model.blob_utilization, 1.0);
        assert_eq!(model.min_blobs_per_proposal, 1.0);
    }

    #[test]
    fn controller_mode_presets_zero_expected_terms() {
        let base = SimulationConfig {
            kp: 1.0,
            ki: 0.5,
            kd: 0.25,
            alpha_gas: 0.1,
            alpha_blob: 0.2,
            ..Default::default()
        };

        let mut ff = base.clone();
        ControllerMode::Ff.apply(&mut ff);
        assert_eq!((ff.kp, ff.ki, ff.kd), (0.0, 0.0, 0.0));
        assert_eq!(ff.alpha_gas, 0.1);

        let mut pi = base.clone();
        ControllerMode::Pi.apply(&mut pi);
        assert_eq!((pi.kp, pi.ki, pi.kd), (1.0, 0.5, 0.0));
        assert_eq!((pi.alpha_gas, pi.alpha_blob), (0.0, 0.0));
        assert_eq!(pi.controller_mode, ControllerMode::Pi);

        let mut full = base.clone();
        ControllerMode::PdiFf.apply(&mut full);
        assert_eq!(full.kd, base.kd);
        assert_eq!(full.alpha_blob, base.alpha_blob);
    }

    #[test]
    fn config_parses_partial_toml_with_defaults() {
        let raw = r#"
            mechanism = "eip1559"
            controller_mode = "pi+ff"
            min_fee_wei = 1e7
            max_fee_wei = 1e9

            [eip1559]
            max_change_denominator = 4
        "#;
        let cfg: SimulationConfig = toml::from_str(raw).expect("parse config");
        assert_eq!(cfg.mechanism, Mechanism::Eip1559);
        assert_eq!(cfg.controller_mode, ControllerMode::PiFf);
        assert_eq!(cfg.eip1559.max_change_denominator, 4);
        assert_eq!(cfg.post_every_blocks, DEFAULT_POST_EVERY_BLOCKS);
        assert_eq!(cfg.arbitrum, ArbitrumConfig::default());
    }

    #[test]
    fn whole_number_fields_floor_odd_values() {
        let raw = r#"
            post_every_blocks = -1
            fixed_num_blobs = -3
            dff_blocks = 2.5
            dfb_blocks = nan

            [eip1559]
            max_change_denominator = 0.5

            [arbitrum]
            inertia = inf
        "#;
        let cfg: SimulationConfig = toml::from_str(raw).expect("parse config");
        assert_eq!(cfg.post_every_blocks, 0);
        assert_eq!(cfg.fixed_num_blobs, 0);
        assert_eq!(cfg.dff_blocks, 2);
        assert_eq!(cfg.dfb_blocks, DEFAULT_LAG_BLOCKS);
        assert_eq!(cfg.eip1559.max_change_denominator, 0);
        assert_eq!(cfg.arbitrum.inertia, DEFAULT_ARB_INERTIA);

        let clean = cfg.sanitized();
        assert_eq!(clean.post_every_blocks, 1);
        assert_eq!(clean.dff_blocks, 2);
        assert_eq!(clean.dfb_blocks, 5);
        assert_eq!(clean.eip1559.max_change_denominator, 1);
        assert_eq!(clean.arbitrum.inertia, 10);

        let json: SimulationConfig =
            serde_json::from_str(r#"{"post_every_blocks": 12, "dff_blocks": 3.9}"#)
                .expect("parse json");
        assert_eq!((json.post_every_blocks, json.dff_blocks), (12, 3));
        assert!(toml::from_str::<SimulationConfig>("dff_blocks = \"two\"").is_err());
    }

    #[test]
    fn clamp_state_serializes_as_tag() {
        let raw = serde_json::to_string(&ClampState::Unclamped).expect("serialize");
        assert_eq!(raw, "\"none\"");
        let parsed: ClampState = serde_json::from_str("\"max\"").expect("deserialize");
        assert_eq!(parsed, ClampState::Max);
    }

    #[test]
    fn input_series_validation() {
        let empty = InputSeries::default();
        assert!(matches!(empty.validate(), Err(SimError::InvalidInput(_))));

        let ragged = InputSeries {
            base_fee_gwei: vec![1.0, 2.0],
            blob_fee_gwei: vec![1.0],
            l2_gas_per_l1_block: vec![0.0, 0.0],
            blocks: None,
        };
        assert!(ragged.validate().is_err());

        let ok = InputSeries {
            blob_fee_gwei: vec![1.0, 1.0],
            ..ragged
        };
        assert_eq!(ok.validate(), Ok(2));
        assert_eq!(ok.slice(1, 1).len(), 1);
    }

    #[test]
    fn sim_range_rejects_reversed_and_out_of_bounds() {
        let reversed = SimRange {
            start: 5,
            end: 2,
            block_index_offset: 0,
        };
        assert!(reversed.validate(10).is_err());
        assert!(SimRange::full(10).validate(10).is_ok());
        let past = SimRange {
            start: 0,
            end: 10,
            block_index_offset: 0,
        };
        assert!(past.validate(10).is_err());
    }
}
