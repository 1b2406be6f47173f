mod stats;

pub use stats::{normalized_weighted_sum, percentile};

use std::ops::Range;

use core_types::{ClampState, OutputSeries, ScoreMetrics, ScoreWeights, SimError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoreOptions {
    /// Skip indices whose fee or vault is missing instead of reading them as 0.
    pub skip_missing: bool,
    /// Normalize drawdown and area by 1 when the target vault is 0.
    pub fallback_target_denominator: bool,
}

#[derive(Debug, Default)]
struct Accumulator {
    max_drawdown_eth: f64,
    under_count: usize,
    deficit_area: f64,
    worst_streak: usize,
    cur_streak: usize,
    post_count: usize,
    post_break_even_count: usize,
    clamp_max_count: usize,
    fee_sum: f64,
    fee_sq_sum: f64,
    fee_count: usize,
    break_even_sum: f64,
    break_even_count: usize,
    steps: Vec<f64>,
    max_step: f64,
    fee_prev: Option<f64>,
}

/// Reduce the `range` slice of a simulated trajectory to health and UX
/// badness. Lower is better. Returns `None` for an empty range.
pub fn score(
    output: &OutputSeries,
    target_vault_eth: f64,
    max_fee_gwei: f64,
    weights: &ScoreWeights,
    range: Range<usize>,
    options: ScoreOptions,
) -> Result<Option<ScoreMetrics>, SimError> {
    if range.start > range.end {
        return Err(SimError::InvalidInput(format!(
            "score range end {} precedes start {}",
            range.end, range.start
        )));
    }
    if range.end > output.len() || range.end > output.vault_eth.len() {
        return Err(SimError::InvalidInput(format!(
            "score range end {} is past the output end ({} blocks)",
            range.end,
            output.len()
        )));
    }
    let n = range.len();
    if n == 0 {
        return Ok(None);
    }

    let target = if target_vault_eth.is_finite() {
        target_vault_eth
    } else {
        0.0
    };
    let fee_scale = if max_fee_gwei > 0.0 { max_fee_gwei } else { 1.0 };
    let deadband_floor = target * (1.0 - weights.deadband_pct / 100.0);
    let breakdown = output.breakdown.as_ref();

    let mut acc = Accumulator::default();
    for i in range {
        let raw_fee = output.charged_fee_gwei[i];
        let (fee, vault) = match (raw_fee, output.vault_eth[i]) {
            (Some(fee), Some(vault)) => (fee, vault),
            _ if options.skip_missing => continue,
            (fee, vault) => (fee.unwrap_or(0.0), vault.unwrap_or(0.0)),
        };

        if vault < deadband_floor {
            acc.under_count += 1;
            acc.cur_streak += 1;
            acc.worst_streak = acc.worst_streak.max(acc.cur_streak);
        } else {
            acc.cur_streak = 0;
        }
        acc.max_drawdown_eth = acc.max_drawdown_eth.max((target - vault).max(0.0));
        acc.deficit_area += (deadband_floor - vault).max(0.0);

        if let Some(b) = breakdown {
            if b.clamp_state.get(i).copied().flatten() == Some(ClampState::Max) {
                acc.clamp_max_count += 1;
            }
            if let Some(flag) = b.post_break_even.get(i).copied().flatten() {
                acc.post_count += 1;
                if flag {
                    acc.post_break_even_count += 1;
                }
            }
            if let Some(required) = b.required_fee_gwei.get(i).copied().flatten() {
                if required.is_finite() {
                    acc.break_even_sum += required;
                    acc.break_even_count += 1;
                }
            }
        }

        acc.fee_sum += fee;
        acc.fee_sq_sum += fee * fee;
        acc.fee_count += 1;
        if let Some(prev) = acc.fee_prev {
            let step = (fee - prev).abs();
            acc.steps.push(step);
            acc.max_step = acc.max_step.max(step);
        }
        // A missing sample starts no step; a step into one reads it as 0.
        acc.fee_prev = raw_fee;
    }

    let nf = n as f64;
    let fee_stats_count = if options.skip_missing {
        acc.fee_count
    } else {
        n
    };
    let (fee_mean, fee_var) = if fee_stats_count > 0 {
        let count = fee_stats_count as f64;
        let mean = acc.fee_sum / count;
        (mean, (acc.fee_sq_sum / count - mean * mean).max(0.0))
    } else {
        (0.0, 0.0)
    };
    let fee_std = fee_var.sqrt();
    let step_p95 = percentile(&acc.steps, 95.0);
    let step_p99 = percentile(&acc.steps, 99.0);
    let clamp_max_ratio = acc.clamp_max_count as f64 / nf;
    let break_even_mean = if acc.break_even_count > 0 {
        acc.break_even_sum / acc.break_even_count as f64
    } else {
        0.0
    };
    let under_target_ratio = acc.under_count as f64 / nf;
    let post_break_even_ratio = if acc.post_count > 0 {
        acc.post_break_even_count as f64 / acc.post_count as f64
    } else {
        1.0
    };

    let target_denom = if target > 0.0 {
        target
    } else if options.fallback_target_denominator {
        1.0
    } else {
        0.0
    };
    let d_draw = if target_denom > 0.0 {
        acc.max_drawdown_eth / target_denom
    } else {
        0.0
    };
    let d_area = if target_denom > 0.0 {
        acc.deficit_area / (target_denom * nf)
    } else {
        0.0
    };
    let d_under = under_target_ratio;
    let d_streak = acc.worst_streak as f64 / nf;
    let d_post = 1.0 - post_break_even_ratio;

    let u_std = fee_std / fee_scale;
    let u_p95 = step_p95 / fee_scale;
    let u_p99 = step_p99 / fee_scale;
    let u_max = acc.max_step / fee_scale;
    let u_clamp = clamp_max_ratio;
    let u_level = if break_even_mean > 0.0 {
        (fee_mean - break_even_mean).max(0.0) / break_even_mean
    } else {
        0.0
    };

    let w = weights;
    let health_badness = normalized_weighted_sum(
        &[d_draw, d_under, d_area, d_streak, d_post],
        &[w.w_draw, w.w_under, w.w_area, w.w_streak, w.w_post_be],
    );
    let ux_badness = normalized_weighted_sum(
        &[u_std, u_p95, u_p99, u_max, u_clamp, u_level],
        &[w.w_std, w.w_p95, w.w_p99, w.w_max_step, w.w_clamp, w.w_level],
    );
    let total_badness =
        normalized_weighted_sum(&[health_badness, ux_badness], &[w.w_health, w.w_ux]);

    tracing::debug!(n, health_badness, ux_badness, total_badness, "scored trajectory");
    Ok(Some(ScoreMetrics {
        n,
        deadband_pct: weights.deadband_pct,
        max_drawdown_eth: acc.max_drawdown_eth,
        under_target_ratio,
        post_break_even_ratio,
        deficit_area_band: acc.deficit_area,
        worst_streak: acc.worst_streak,
        fee_std,
        step_p95,
        step_p99,
        max_step: acc.max_step,
        clamp_max_ratio,
        u_level,
        d_draw,
        d_under,
        d_area,
        d_streak,
        d_post,
        u_std,
        u_p95,
        u_p99,
        u_max,
        u_clamp,
        health_badness,
        ux_badness,
        total_badness,
    }))
}
