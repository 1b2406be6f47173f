use blob_estimator::blobs_for_proposal;
use core_types::{
    finite_or, ClampState, FeeController, InputSeries, OutputSeries, SettlementInputs, SimError,
    SimRange, SimulationBreakdown, SimulationConfig, StepInputs, BLOB_GAS_PER_BLOB, WEI_PER_ETH,
    WEI_PER_GWEI,
};
use fee_mechanism::build_controller;
use serde::{Deserialize, Serialize};

const BREAK_EVEN_TOLERANCE_ETH: f64 = 1e-12;
const CLAMP_TOLERANCE_WEI: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimOptions {
    pub collect_breakdown: bool,
}

/// `index - lag` if it does not fall before `floor`.
#[inline]
pub fn lag_lookup(index: usize, lag: u64, floor: usize) -> Option<usize> {
    let lag = usize::try_from(lag).ok()?;
    index.checked_sub(lag).filter(|&j| j >= floor)
}

#[inline]
fn gwei_to_wei(series: &[f64], i: usize) -> f64 {
    finite_or(series[i], 0.0) * WEI_PER_GWEI
}

/// Everything known about one block before the controller runs.
#[derive(Debug, Clone, Copy)]
struct BlockCosts {
    l2_gas: f64,
    l2_gas_per_proposal: f64,
    gas_cost_wei: f64,
    blob_cost_wei: f64,
}

impl BlockCosts {
    fn total_wei(&self) -> f64 {
        self.gas_cost_wei + self.blob_cost_wei
    }

    fn total_eth(&self) -> f64 {
        self.total_wei() / WEI_PER_ETH
    }
}

fn block_costs(cfg: &SimulationConfig, inputs: &InputSeries, i: usize) -> BlockCosts {
    let base_fee_wei = gwei_to_wei(&inputs.base_fee_gwei, i);
    let blob_fee_wei = gwei_to_wei(&inputs.blob_fee_gwei, i);
    let l2_gas = finite_or(inputs.l2_gas_per_l1_block[i], 0.0).max(0.0);
    let l2_gas_per_proposal = l2_gas * cfg.post_every_blocks as f64;
    let blobs = blobs_for_proposal(
        cfg.blob_mode,
        cfg.fixed_num_blobs,
        &cfg.blob_model,
        l2_gas_per_proposal,
    );
    BlockCosts {
        l2_gas,
        l2_gas_per_proposal,
        gas_cost_wei: cfg.l1_gas_used * (base_fee_wei + cfg.priority_fee_wei),
        blob_cost_wei: blobs as f64 * BLOB_GAS_PER_BLOB * blob_fee_wei,
    }
}

fn clamp_state(fee_wei: f64, cfg: &SimulationConfig) -> ClampState {
    if fee_wei <= cfg.min_fee_wei + CLAMP_TOLERANCE_WEI {
        ClampState::Min
    } else if fee_wei >= cfg.max_fee_wei - CLAMP_TOLERANCE_WEI {
        ClampState::Max
    } else {
        ClampState::Unclamped
    }
}

/// Simulate `range` of `inputs` block by block.
///
/// The output has one slot per input index; slots outside the range stay
/// `None`. Settlement happens where `(range.block_index_offset + i + 1)` is a
/// multiple of the posting cadence, so a sliced run with a matching offset
/// reproduces the full-series run exactly.
pub fn simulate_series(
    config: &SimulationConfig,
    inputs: &InputSeries,
    range: SimRange,
    options: SimOptions,
) -> Result<OutputSeries, SimError> {
    let full_len = inputs.validate()?;
    range.validate(full_len)?;

    let cfg = config.sanitized();
    let mut controller: Box<dyn FeeController> = build_controller(&cfg);
    let cadence = cfg.post_every_blocks;

    let mut out = OutputSeries {
        charged_fee_gwei: vec![None; full_len],
        vault_eth: vec![None; full_len],
        breakdown: options
            .collect_breakdown
            .then(|| SimulationBreakdown::with_len(full_len)),
    };

    let mut vault = cfg.initial_vault_eth;
    let mut pending_revenue_eth = 0.0;
    let mut local_vault: Vec<f64> = Vec::with_capacity(range.len());

    for (local, i) in (range.start..=range.end).enumerate() {
        let global_index = range.block_index_offset + i as u64;
        let costs = block_costs(&cfg, inputs, i);

        let ff_index = lag_lookup(i, cfg.dff_blocks, range.start).unwrap_or(range.start);
        let observed_vault = lag_lookup(local, cfg.dfb_blocks, 0)
            .map_or(cfg.initial_vault_eth, |j| local_vault[j]);
        let deficit_eth = cfg.target_vault_eth - observed_vault;
        let epsilon = if cfg.target_vault_eth > 0.0 {
            deficit_eth / cfg.target_vault_eth
        } else {
            0.0
        };

        let parts = controller.step(&StepInputs {
            local_index: local,
            epsilon,
            base_fee_ff_wei: gwei_to_wei(&inputs.base_fee_gwei, ff_index),
            blob_base_fee_ff_wei: gwei_to_wei(&inputs.blob_fee_gwei, ff_index),
        });
        let fee_wei = parts.charged_fee_wei;
        out.charged_fee_gwei[i] = Some(fee_wei / WEI_PER_GWEI);
        pending_revenue_eth += fee_wei * costs.l2_gas / WEI_PER_ETH;

        let posted = (global_index + 1) % cadence == 0;
        let mut posting_revenue_eth = None;
        if posted {
            let revenue = std::mem::take(&mut pending_revenue_eth);
            vault += revenue;
            vault -= costs.total_eth();
            controller.on_settlement(&SettlementInputs {
                vault_eth: vault,
                l2_gas_per_proposal: costs.l2_gas_per_proposal,
            });
            posting_revenue_eth = Some(revenue);
        }

        local_vault.push(vault);
        out.vault_eth[i] = Some(vault);

        if let Some(b) = out.breakdown.as_mut() {
            let total_eth = costs.total_eth();
            if let Some(revenue) = posting_revenue_eth {
                b.posting_revenue_eth[i] = Some(revenue);
                b.posting_pnl_eth[i] = Some(revenue - total_eth);
                b.post_break_even[i] = Some(revenue + BREAK_EVEN_TOLERANCE_ETH >= total_eth);
                let label = inputs
                    .blocks
                    .as_ref()
                    .map_or(global_index, |blocks| blocks[i]);
                b.posting_blocks.push(label);
            }
            b.gas_cost_eth[i] = Some(costs.gas_cost_wei / WEI_PER_ETH);
            b.blob_cost_eth[i] = Some(costs.blob_cost_wei / WEI_PER_ETH);
            b.posting_cost_eth[i] = Some(total_eth);
            b.required_fee_gwei[i] = (costs.l2_gas_per_proposal > 0.0)
                .then(|| costs.total_wei() / costs.l2_gas_per_proposal / WEI_PER_GWEI);
            b.gas_fee_component_gwei[i] = Some(parts.gas_component_wei / WEI_PER_GWEI);
            b.blob_fee_component_gwei[i] = Some(parts.blob_component_wei / WEI_PER_GWEI);
            b.feedforward_fee_gwei[i] = Some(parts.feedforward_wei / WEI_PER_GWEI);
            b.p_term_fee_gwei[i] = Some(parts.p_term_wei / WEI_PER_GWEI);
            b.i_term_fee_gwei[i] = Some(parts.i_term_wei / WEI_PER_GWEI);
            b.d_term_fee_gwei[i] = Some(parts.d_term_wei / WEI_PER_GWEI);
            b.feedback_fee_gwei[i] = Some(parts.feedback_wei / WEI_PER_GWEI);
            b.deficit_eth[i] = Some(deficit_eth);
            b.epsilon[i] = Some(epsilon);
            b.derivative[i] = Some(parts.derivative);
            b.integral[i] = Some(parts.integral);
            b.clamp_state[i] = Some(clamp_state(fee_wei, &cfg));
        }
    }

    tracing::debug!(
        mechanism = %cfg.mechanism,
        blocks = range.len(),
        final_vault_eth = vault,
        "simulation finished"
    );
    Ok(out)
}

/// Simulate `[i0, i1]` as an isolated run over the sliced inputs, aligned to
/// the global cadence, and place the result back into a full-length series.
pub fn replay_range(
    config: &SimulationConfig,
    inputs: &InputSeries,
    i0: usize,
    i1: usize,
    options: SimOptions,
) -> Result<OutputSeries, SimError> {
    let full_len = inputs.validate()?;
    SimRange {
        start: i0,
        end: i1,
        block_index_offset: 0,
    }
    .validate(full_len)?;

    let sliced = inputs.slice(i0, i1);
    let run = simulate_series(
        config,
        &sliced,
        SimRange {
            start: 0,
            end: i1 - i0,
            block_index_offset: i0 as u64,
        },
        options,
    )?;
    Ok(pad_to_full(run, i0, full_len))
}

fn pad<T: Clone>(values: Vec<Option<T>>, offset: usize, full_len: usize) -> Vec<Option<T>> {
    let mut padded = vec![None; full_len];
    for (j, v) in values.into_iter().enumerate() {
        padded[offset + j] = v;
    }
    padded
}

fn pad_to_full(run: OutputSeries, offset: usize, full_len: usize) -> OutputSeries {
    OutputSeries {
        charged_fee_gwei: pad(run.charged_fee_gwei, offset, full_len),
        vault_eth: pad(run.vault_eth, offset, full_len),
        breakdown: run.breakdown.map(|b| SimulationBreakdown {
            gas_cost_eth: pad(b.gas_cost_eth, offset, full_len),
            blob_cost_eth: pad(b.blob_cost_eth, offset, full_len),
            posting_cost_eth: pad(b.posting_cost_eth, offset, full_len),
            required_fee_gwei: pad(b.required_fee_gwei, offset, full_len),
            gas_fee_component_gwei: pad(b.gas_fee_component_gwei, offset, full_len),
            blob_fee_component_gwei: pad(b.blob_fee_component_gwei, offset, full_len),
            feedforward_fee_gwei: pad(b.feedforward_fee_gwei, offset, full_len),
            p_term_fee_gwei: pad(b.p_term_fee_gwei, offset, full_len),
            i_term_fee_gwei: pad(b.i_term_fee_gwei, offset, full_len),
            d_term_fee_gwei: pad(b.d_term_fee_gwei, offset, full_len),
            feedback_fee_gwei: pad(b.feedback_fee_gwei, offset, full_len),
            posting_revenue_eth: pad(b.posting_revenue_eth, offset, full_len),
            posting_pnl_eth: pad(b.posting_pnl_eth, offset, full_len),
            post_break_even: pad(b.post_break_even, offset, full_len),
            deficit_eth: pad(b.deficit_eth, offset, full_len),
            epsilon: pad(b.epsilon, offset, full_len),
            derivative: pad(b.derivative, offset, full_len),
            integral: pad(b.integral, offset, full_len),
            clamp_state: pad(b.clamp_state, offset, full_len),
            posting_blocks: b.posting_blocks,
        }),
    }
}
