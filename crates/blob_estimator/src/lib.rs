use core_types::{finite_or, BlobMode, BlobModel, BLOB_GAS_PER_BLOB, L1_BLOCK_TIME_SECONDS};
use serde::{Deserialize, Serialize};

const MIN_L2_BLOCK_TIME_SECONDS: f64 = 0.1;

/// Blobs needed to carry a proposal of `l2_gas_per_proposal` gas.
///
/// Zero or non-finite gas yields the model minimum; otherwise the compressed
/// batch size is divided by the usable bytes per blob and rounded up.
pub fn estimate_blob_count(l2_gas_per_proposal: f64, model: &BlobModel) -> u64 {
    let model = model.sanitized();
    let min_blobs = model.min_blobs_per_proposal;
    if !(l2_gas_per_proposal.is_finite() && l2_gas_per_proposal > 0.0) {
        return min_blobs as u64;
    }

    let tx_count = l2_gas_per_proposal / model.tx_gas;
    let uncompressed_bytes = model.batch_overhead_bytes + tx_count * model.tx_bytes;
    let compressed_bytes = uncompressed_bytes / model.compression_ratio;
    let bytes_per_blob = BLOB_GAS_PER_BLOB * model.blob_utilization;
    let required = if compressed_bytes > 0.0 {
        (compressed_bytes / bytes_per_blob).ceil()
    } else {
        0.0
    };
    min_blobs.max(required) as u64
}

/// Blob count under either sizing mode.
pub fn blobs_for_proposal(
    mode: BlobMode,
    fixed_num_blobs: u64,
    model: &BlobModel,
    l2_gas_per_proposal: f64,
) -> u64 {
    match mode {
        BlobMode::Fixed => fixed_num_blobs,
        BlobMode::Dynamic => estimate_blob_count(l2_gas_per_proposal, model),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DemandRegime {
    Low,
    #[default]
    Base,
    High,
}

impl DemandRegime {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Low => 0.7,
            Self::Base => 1.0,
            Self::High => 1.4,
        }
    }
}

/// L2 demand expressed per L1 block and per proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DemandScalars {
    pub l2_blocks_per_l1_block: f64,
    pub base_gas_per_l1_block: f64,
    pub regime_multiplier: f64,
    pub gas_per_l1_block: f64,
    pub base_gas_per_proposal: f64,
}

impl DemandScalars {
    pub fn derive(
        l2_gas_per_l2_block: f64,
        l2_block_time_sec: f64,
        regime: DemandRegime,
        post_every_blocks: u64,
    ) -> Self {
        let gas_per_l2_block = finite_or(l2_gas_per_l2_block, 0.0).max(0.0);
        let block_time =
            finite_or(l2_block_time_sec, L1_BLOCK_TIME_SECONDS).max(MIN_L2_BLOCK_TIME_SECONDS);
        let l2_blocks_per_l1_block = L1_BLOCK_TIME_SECONDS / block_time;
        let base_gas_per_l1_block = gas_per_l2_block * l2_blocks_per_l1_block;
        let regime_multiplier = regime.multiplier();
        Self {
            l2_blocks_per_l1_block,
            base_gas_per_l1_block,
            regime_multiplier,
            gas_per_l1_block: base_gas_per_l1_block * regime_multiplier,
            base_gas_per_proposal: base_gas_per_l1_block * post_every_blocks.max(1) as f64,
        }
    }
}

/// Feedforward weights that make the feedforward term alone cover posting cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AutoAlphas {
    pub alpha_gas: f64,
    pub alpha_blob: f64,
    pub blobs: u64,
}

pub fn auto_alphas(
    l1_gas_used: f64,
    blob_mode: BlobMode,
    fixed_num_blobs: u64,
    model: &BlobModel,
    l2_gas_per_proposal: f64,
) -> AutoAlphas {
    let blobs = blobs_for_proposal(blob_mode, fixed_num_blobs, model, l2_gas_per_proposal);
    if !(l2_gas_per_proposal.is_finite() && l2_gas_per_proposal > 0.0) {
        tracing::debug!(l2_gas_per_proposal, "no proposal gas, feedforward alphas zeroed");
        return AutoAlphas {
            alpha_gas: 0.0,
            alpha_blob: 0.0,
            blobs,
        };
    }
    AutoAlphas {
        alpha_gas: finite_or(l1_gas_used, 0.0).max(0.0) / l2_gas_per_proposal,
        alpha_blob: blobs as f64 * BLOB_GAS_PER_BLOB / l2_gas_per_proposal,
        blobs,
    }
}

pub fn constant_demand_series(len: usize, gas_per_l1_block: f64) -> Vec<f64> {
    vec![finite_or(gas_per_l1_block, 0.0).max(0.0); len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BlobModel {
        BlobModel {
            tx_gas: 70_000.0,
            tx_bytes: 120.0,
            batch_overhead_bytes: 1_200.0,
            compression_ratio: 1.0,
            blob_utilization: 0.95,
            min_blobs_per_proposal: 1.0,
        }
    }

    #[test]
    fn zero_gas_returns_minimum() {
        assert_eq!(estimate_blob_count(0.0, &model()), 1);
        assert_eq!(estimate_blob_count(-5.0, &model()), 1);
        assert_eq!(estimate_blob_count(f64::NAN, &model()), 1);
        let none = BlobModel {
            min_blobs_per_proposal: 0.0,
            ..model()
        };
        assert_eq!(estimate_blob_count(0.0, &none), 0);
    }

    #[test]
    fn blob_count_crosses_boundary() {
        let usable = BLOB_GAS_PER_BLOB * 0.95;
        // 1 tx of 1 byte per gas unit, no overhead: bytes == gas.
        let linear = BlobModel {
            tx_gas: 1.0,
            tx_bytes: 1.0,
            batch_overhead_bytes: 0.0,
            min_blobs_per_proposal: 0.0,
            ..model()
        };
        assert_eq!(estimate_blob_count(usable, &linear), 1);
        assert_eq!(estimate_blob_count(usable + 1.0, &linear), 2);
    }

    #[test]
    fn blob_count_is_monotone_in_gas() {
        let m = model();
        let mut last = 0;
        for step in 0..200 {
            let gas = step as f64 * 2_000_000.0;
            let blobs = estimate_blob_count(gas, &m);
            assert!(blobs >= last, "blobs decreased at gas={gas}");
            last = blobs;
        }
        assert!(last > 1);
    }

    #[test]
    fn compression_reduces_blob_count() {
        let raw = estimate_blob_count(500_000_000.0, &model());
        let compressed = estimate_blob_count(
            500_000_000.0,
            &BlobModel {
                compression_ratio: 4.0,
                ..model()
            },
        );
        assert!(compressed < raw);
    }

    #[test]
    fn fixed_mode_ignores_model() {
        assert_eq!(blobs_for_proposal(BlobMode::Fixed, 3, &model(), 1e12), 3);
    }

    #[test]
    fn demand_scalars_follow_block_time_and_regime() {
        let scalars = DemandScalars::derive(1_000_000.0, 2.0, DemandRegime::High, 10);
        assert_eq!(scalars.l2_blocks_per_l1_block, 6.0);
        assert_eq!(scalars.base_gas_per_l1_block, 6_000_000.0);
        assert!((scalars.gas_per_l1_block - 8_400_000.0).abs() < 1e-6);
        assert_eq!(scalars.base_gas_per_proposal, 60_000_000.0);

        let floored = DemandScalars::derive(100.0, 0.0, DemandRegime::Low, 0);
        assert!((floored.l2_blocks_per_l1_block - 120.0).abs() < 1e-9);
        assert_eq!(floored.base_gas_per_proposal, floored.base_gas_per_l1_block);
    }

    #[test]
    fn auto_alphas_cover_costs_per_gas() {
        let alphas = auto_alphas(100_000.0, BlobMode::Fixed, 2, &model(), 1_000_000.0);
        assert!((alphas.alpha_gas - 0.1).abs() < 1e-12);
        assert!((alphas.alpha_blob - 2.0 * BLOB_GAS_PER_BLOB / 1_000_000.0).abs() < 1e-12);

        let zero = auto_alphas(100_000.0, BlobMode::Fixed, 2, &model(), 0.0);
        assert_eq!((zero.alpha_gas, zero.alpha_blob), (0.0, 0.0));
    }

    #[test]
    fn constant_series_is_constant() {
        let series = constant_demand_series(32, 777.0);
        assert_eq!(series.len(), 32);
        assert!(series.iter().all(|&x| x == 777.0));
        assert!(constant_demand_series(3, -1.0).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn regime_round_trips_as_snake_case() {
        let parsed: DemandRegime = serde_json::from_str("\"high\"").expect("parse regime");
        assert_eq!(parsed, DemandRegime::High);
    }
}
