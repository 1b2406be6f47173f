//! Exhaustive grid search over Taiko controller gains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use core_types::{
    ControllerMode, InputSeries, Mechanism, ScoreMetrics, ScoreWeights, SimError, SimRange,
    SimulationConfig,
};
use fee_simulator::{simulate_series, SimOptions};
use rayon::prelude::*;
use scorer::{score, ScoreOptions};
use serde::{Deserialize, Serialize};

pub const SWEEP_MAX_BLOCKS: usize = 200_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlphaVariant {
    /// Keep the base config's feedforward alphas.
    #[default]
    Current,
    /// Run without feedforward.
    Zero,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepGrid {
    pub modes: Vec<ControllerMode>,
    pub kp_values: Vec<f64>,
    pub ki_values: Vec<f64>,
    pub kd_values: Vec<f64>,
    pub i_max_values: Vec<f64>,
    pub alpha_variants: Vec<AlphaVariant>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            modes: vec![ControllerMode::Pdi, ControllerMode::PdiFf],
            kp_values: vec![0.0, 0.02, 0.05, 0.1, 0.2, 0.4, 0.8, 1.6],
            ki_values: vec![0.0, 0.001, 0.003, 0.01, 0.03, 0.1, 0.2, 0.5, 1.0],
            kd_values: vec![0.0],
            i_max_values: vec![5.0, 10.0, 100.0],
            alpha_variants: vec![AlphaVariant::Current, AlphaVariant::Zero],
        }
    }
}

impl SweepGrid {
    pub fn len(&self) -> usize {
        self.modes.len()
            * self.kp_values.len()
            * self.ki_values.len()
            * self.kd_values.len()
            * self.i_max_values.len()
            * self.alpha_variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, in mode > kp > ki > kd > iMax > alpha order.
    pub fn candidates(&self) -> Vec<SweepCandidate> {
        let mut out = Vec::with_capacity(self.len());
        for &mode in &self.modes {
            for &kp in &self.kp_values {
                for &ki in &self.ki_values {
                    for &kd in &self.kd_values {
                        for &i_max in &self.i_max_values {
                            for &alpha_variant in &self.alpha_variants {
                                out.push(SweepCandidate {
                                    index: out.len(),
                                    mode,
                                    alpha_variant,
                                    kp,
                                    ki,
                                    kd,
                                    i_max,
                                });
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SweepCandidate {
    /// Position in enumeration order; breaks badness ties.
    pub index: usize,
    pub mode: ControllerMode,
    pub alpha_variant: AlphaVariant,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub i_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepResult {
    pub candidate: SweepCandidate,
    pub alpha_gas: f64,
    pub alpha_blob: f64,
    pub metrics: ScoreMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SweepOutcome {
    /// Ascending by total badness.
    pub results: Vec<SweepResult>,
    /// Set when cancellation stopped the sweep early.
    pub partial: bool,
    pub evaluated: usize,
    pub total: usize,
}

impl SweepOutcome {
    pub fn best(&self) -> Option<&SweepResult> {
        self.results.first()
    }
}

/// Base config, inclusive index range and scoring settings for one sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepRequest {
    pub config: SimulationConfig,
    pub range_start: usize,
    pub range_end: usize,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default = "default_max_range_len")]
    pub max_range_len: usize,
}

fn default_max_range_len() -> usize {
    SWEEP_MAX_BLOCKS
}

impl SweepRequest {
    pub fn new(config: SimulationConfig, range_start: usize, range_end: usize) -> Self {
        Self {
            config,
            range_start,
            range_end,
            weights: ScoreWeights::default(),
            max_range_len: SWEEP_MAX_BLOCKS,
        }
    }

    fn validate(&self, inputs: &InputSeries) -> Result<usize, SimError> {
        let full_len = inputs.validate()?;
        SimRange {
            start: self.range_start,
            end: self.range_end,
            block_index_offset: 0,
        }
        .validate(full_len)?;
        let len = self.range_end - self.range_start + 1;
        if len > self.max_range_len {
            return Err(SimError::RangeTooLarge {
                len,
                max: self.max_range_len,
            });
        }
        Ok(len)
    }
}

/// Shared flag; once set, candidates not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Write `candidate` into `base`: Taiko mechanism, the candidate's mode preset,
/// its gains, and the alphas its variant selects.
pub fn apply_candidate(base: &SimulationConfig, candidate: &SweepCandidate) -> SimulationConfig {
    let mut cfg = base.clone();
    cfg.mechanism = Mechanism::Taiko;
    candidate.mode.apply(&mut cfg);
    match candidate.alpha_variant {
        AlphaVariant::Current => {
            cfg.alpha_gas = base.alpha_gas.max(0.0);
            cfg.alpha_blob = base.alpha_blob.max(0.0);
        }
        AlphaVariant::Zero => {
            cfg.alpha_gas = 0.0;
            cfg.alpha_blob = 0.0;
        }
    }
    cfg.kp = candidate.kp;
    cfg.ki = candidate.ki;
    cfg.kd = candidate.kd;
    cfg.i_max = candidate.i_max;
    cfg
}

/// Score `config` over the sliced window `[0, n)` of `window`, which must
/// already be cut out of the full series starting at `offset`.
fn evaluate_window(
    config: &SimulationConfig,
    window: &InputSeries,
    offset: usize,
    weights: &ScoreWeights,
) -> Result<ScoreMetrics, SimError> {
    let n = window.len();
    let output = simulate_series(
        config,
        window,
        SimRange {
            start: 0,
            end: n.saturating_sub(1),
            block_index_offset: offset as u64,
        },
        SimOptions {
            collect_breakdown: true,
        },
    )?;
    let sanitized = config.sanitized();
    score(
        &output,
        sanitized.target_vault_eth,
        sanitized.max_fee_gwei(),
        weights,
        0..n,
        ScoreOptions {
            skip_missing: true,
            fallback_target_denominator: true,
        },
    )?
    .ok_or_else(|| SimError::InvalidInput("sweep window is empty".to_string()))
}

/// Score the request's own config the same way sweep candidates are scored.
///
/// Candidates are always Taiko, so only a Taiko config has a comparable
/// current point.
pub fn evaluate_current(
    request: &SweepRequest,
    inputs: &InputSeries,
) -> Result<ScoreMetrics, SimError> {
    if request.config.mechanism != Mechanism::Taiko {
        return Err(SimError::InvalidInput(format!(
            "current point needs the taiko mechanism, got {}",
            request.config.mechanism
        )));
    }
    request.validate(inputs)?;
    let window = inputs.slice(request.range_start, request.range_end);
    evaluate_window(&request.config, &window, request.range_start, &request.weights)
}

pub fn evaluate_candidate(
    request: &SweepRequest,
    candidate: &SweepCandidate,
    window: &InputSeries,
) -> Result<SweepResult, SimError> {
    let cfg = apply_candidate(&request.config, candidate);
    let metrics = evaluate_window(&cfg, window, request.range_start, &request.weights)?;
    Ok(SweepResult {
        candidate: *candidate,
        alpha_gas: cfg.alpha_gas,
        alpha_blob: cfg.alpha_blob,
        metrics,
    })
}

/// Evaluate every grid candidate across the rayon pool and rank them by total
/// badness, ties broken by enumeration order.
pub fn sweep(
    request: &SweepRequest,
    grid: &SweepGrid,
    inputs: &InputSeries,
    cancel: &CancelToken,
) -> Result<SweepOutcome, SimError> {
    sweep_with_progress(request, grid, inputs, cancel, |_| {})
}

/// Like [`sweep`], calling `on_result` after each candidate is evaluated.
pub fn sweep_with_progress<F>(
    request: &SweepRequest,
    grid: &SweepGrid,
    inputs: &InputSeries,
    cancel: &CancelToken,
    on_result: F,
) -> Result<SweepOutcome, SimError>
where
    F: Fn(&SweepResult) + Sync,
{
    let blocks = request.validate(inputs)?;
    let candidates = grid.candidates();
    if candidates.is_empty() {
        return Err(SimError::InvalidInput("sweep grid has no candidates".to_string()));
    }
    let total = candidates.len();
    let window = inputs.slice(request.range_start, request.range_end);
    tracing::debug!(candidates = total, blocks, "sweep started");

    let started = Instant::now();
    let evaluated: Vec<Option<SweepResult>> = candidates
        .par_iter()
        .map(|candidate| -> Result<Option<SweepResult>, SimError> {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let t0 = Instant::now();
            let result = evaluate_candidate(request, candidate, &window)?;
            metrics::counter!("sweep.candidates_evaluated").increment(1);
            metrics::histogram!("sweep.candidate_ms").record(t0.elapsed().as_secs_f64() * 1e3);
            on_result(&result);
            Ok(Some(result))
        })
        .collect::<Result<_, _>>()?;

    let mut results: Vec<SweepResult> = evaluated.into_iter().flatten().collect();
    results.sort_by(|a, b| {
        a.metrics
            .total_badness
            .total_cmp(&b.metrics.total_badness)
            .then(a.candidate.index.cmp(&b.candidate.index))
    });

    let partial = results.len() < total;
    if partial {
        metrics::counter!("sweep.cancelled").increment(1);
        tracing::warn!(evaluated = results.len(), total, "sweep cancelled");
    }
    tracing::debug!(
        evaluated = results.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "sweep finished"
    );

    Ok(SweepOutcome {
        evaluated: results.len(),
        total,
        partial,
        results,
    })
}
