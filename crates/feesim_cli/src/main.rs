mod config_loader;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use blob_estimator::estimate_blob_count;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use core_types::{InputSeries, Mechanism, SimRange};
use fee_simulator::{simulate_series, SimOptions};
use scorer::{score, ScoreOptions};
use serde::Serialize;
use sweep_engine::{evaluate_current, sweep, CancelToken, SweepRequest};

use crate::config_loader::{config_path, load_config, load_series, FeesimConfig};

#[derive(Parser, Debug)]
#[command(name = "feesim", about = "L2 fee-controller simulator", version)]
struct Cli {
    /// TOML config with [simulation], [scoring], [demand] and [sweep] sections.
    #[arg(long, global = true, env = "FEESIM_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// JSON file holding the aligned input series.
    #[arg(long, global = true)]
    series: Option<PathBuf>,
    /// Print Prometheus metrics to stderr on exit.
    #[arg(long, global = true, default_value_t = false)]
    metrics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Simulate(SimulateArgs),
    Score(RangeArgs),
    Sweep(SweepArgs),
    Blobs(BlobsArgs),
}

#[derive(Args, Debug, Clone)]
struct RangeArgs {
    /// First index (inclusive). Defaults to the series start.
    #[arg(long)]
    from: Option<usize>,
    /// Last index (inclusive). Defaults to the series end.
    #[arg(long)]
    to: Option<usize>,
}

impl RangeArgs {
    fn resolve(&self, len: usize) -> Result<(usize, usize)> {
        if len == 0 {
            bail!("input series are empty");
        }
        let from = self.from.unwrap_or(0);
        let to = self.to.unwrap_or(len - 1);
        if from > to || to >= len {
            bail!("invalid range {from}..={to} for {len} blocks");
        }
        Ok((from, to))
    }
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, default_value_t = false)]
    breakdown: bool,
}

#[derive(Args, Debug, Clone)]
struct SweepArgs {
    #[command(flatten)]
    range: RangeArgs,
    /// Overrides [sweep].max_range_len.
    #[arg(long)]
    max_blocks: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct BlobsArgs {
    /// L2 gas per proposal.
    #[arg(long)]
    gas: f64,
}

#[derive(Serialize)]
struct Report<T: Serialize> {
    generated_at: String,
    #[serde(flatten)]
    body: T,
}

fn emit<T: Serialize>(body: T) -> Result<()> {
    let report = Report {
        generated_at: Utc::now().to_rfc3339(),
        body,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn inputs_for(cli: &Cli, cfg: &FeesimConfig) -> Result<InputSeries> {
    let Some(path) = cli.series.as_ref() else {
        bail!("--series is required for this command");
    };
    let inputs = cfg.complete_inputs(load_series(path)?);
    inputs.validate().context("input series")?;
    Ok(inputs)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = observability::init_tracing("feesim");
    if cli.metrics {
        observability::init_metrics()?;
    }

    let path = config_path(cli.config.clone());
    let cfg = load_config(&path)?;
    tracing::info!(path = %path.display(), mechanism = %cfg.simulation.mechanism, "config loaded");

    match &cli.command {
        Commands::Simulate(args) => run_simulate(&cli, &cfg, args)?,
        Commands::Score(args) => run_score(&cli, &cfg, args)?,
        Commands::Sweep(args) => run_sweep(&cli, &cfg, args)?,
        Commands::Blobs(args) => run_blobs(&cfg, args)?,
    }

    if let Some(rendered) = observability::render_metrics() {
        eprintln!("{rendered}");
    }
    Ok(())
}

fn run_simulate(cli: &Cli, cfg: &FeesimConfig, args: &SimulateArgs) -> Result<()> {
    let inputs = inputs_for(cli, cfg)?;
    let (start, end) = args.range.resolve(inputs.len())?;
    let sim = cfg.effective_simulation();
    let output = simulate_series(
        &sim,
        &inputs,
        SimRange {
            start,
            end,
            block_index_offset: 0,
        },
        SimOptions {
            collect_breakdown: args.breakdown,
        },
    )?;
    tracing::info!(start, end, mechanism = %sim.mechanism, "simulation complete");
    emit(serde_json::json!({
        "mechanism": sim.mechanism,
        "controller_mode": sim.controller_mode,
        "range": { "start": start, "end": end },
        "output": output,
    }))
}

fn run_score(cli: &Cli, cfg: &FeesimConfig, args: &RangeArgs) -> Result<()> {
    let inputs = inputs_for(cli, cfg)?;
    let (start, end) = args.resolve(inputs.len())?;
    let sim = cfg.effective_simulation();
    let output = simulate_series(
        &sim,
        &inputs,
        SimRange {
            start,
            end,
            block_index_offset: 0,
        },
        SimOptions {
            collect_breakdown: true,
        },
    )?;
    let sanitized = sim.sanitized();
    let metrics = score(
        &output,
        sanitized.target_vault_eth,
        sanitized.max_fee_gwei(),
        &cfg.scoring,
        start..end + 1,
        ScoreOptions::default(),
    )?;
    emit(serde_json::json!({
        "range": { "start": start, "end": end },
        "metrics": metrics,
    }))
}

fn run_sweep(cli: &Cli, cfg: &FeesimConfig, args: &SweepArgs) -> Result<()> {
    let inputs = inputs_for(cli, cfg)?;
    let (start, end) = args.range.resolve(inputs.len())?;
    let mut request = SweepRequest::new(cfg.effective_simulation(), start, end);
    request.weights = cfg.scoring.clone();
    request.max_range_len = args.max_blocks.unwrap_or(cfg.sweep.max_range_len);

    // Candidates are Taiko only; other mechanisms report no current point.
    let current = (request.config.mechanism == Mechanism::Taiko)
        .then(|| evaluate_current(&request, &inputs))
        .transpose()?;
    tracing::info!(
        candidates = cfg.sweep.grid.len(),
        blocks = end - start + 1,
        "sweep started"
    );
    let outcome = sweep(&request, &cfg.sweep.grid, &inputs, &CancelToken::new())?;
    if let Some(best) = outcome.best() {
        tracing::info!(
            mode = %best.candidate.mode,
            kp = best.candidate.kp,
            ki = best.candidate.ki,
            i_max = best.candidate.i_max,
            total_badness = best.metrics.total_badness,
            "sweep best candidate"
        );
    }
    let top: Vec<_> = outcome.results.iter().take(cfg.sweep.top).collect();
    emit(serde_json::json!({
        "range": { "start": start, "end": end },
        "total": outcome.total,
        "evaluated": outcome.evaluated,
        "partial": outcome.partial,
        "current": current,
        "best": outcome.best(),
        "top": top,
    }))
}

fn run_blobs(cfg: &FeesimConfig, args: &BlobsArgs) -> Result<()> {
    let blobs = estimate_blob_count(args.gas, &cfg.simulation.blob_model);
    emit(serde_json::json!({
        "l2_gas_per_proposal": args.gas,
        "blobs": blobs,
        "blob_model": cfg.simulation.blob_model.sanitized(),
    }))
}
