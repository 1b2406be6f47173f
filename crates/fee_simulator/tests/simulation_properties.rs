use core_types::{
    ArbitrumConfig, BlobMode, BlobModel, Eip1559Config, InputSeries, Mechanism, SimRange,
    SimulationConfig,
};
use fee_simulator::{replay_range, simulate_series, SimOptions};

const N: usize = 16;

fn scenario_inputs(n: usize) -> InputSeries {
    InputSeries {
        base_fee_gwei: (0..n).map(|i| 1.0 + (i % 3) as f64 * 0.25).collect(),
        blob_fee_gwei: (0..n).map(|i| 2.0 + (i % 4) as f64 * 0.1).collect(),
        l2_gas_per_l1_block: vec![140_000.0; n],
        blocks: None,
    }
}

fn varied_inputs(n: usize) -> InputSeries {
    InputSeries {
        base_fee_gwei: (0..n).map(|i| 1.0 + (i % 7) as f64 * 0.2).collect(),
        blob_fee_gwei: (0..n).map(|i| 2.0 + (i % 5) as f64 * 0.15).collect(),
        l2_gas_per_l1_block: (0..n).map(|i| 100_000.0 + (i % 3) as f64 * 5_000.0).collect(),
        blocks: None,
    }
}

fn scenario_config(mechanism: Mechanism) -> SimulationConfig {
    SimulationConfig {
        mechanism,
        post_every_blocks: 2,
        l1_gas_used: 100_000.0,
        blob_mode: BlobMode::Fixed,
        fixed_num_blobs: 1,
        blob_model: BlobModel::default(),
        priority_fee_wei: 1e9,
        dff_blocks: 2,
        dfb_blocks: 2,
        deriv_beta: 0.8,
        kp: 1.0,
        ki: 0.1,
        kd: 0.0,
        p_term_min_wei: 0.0,
        i_min: -10.0,
        i_max: 10.0,
        min_fee_wei: 0.01e9,
        max_fee_wei: 1.0e9,
        alpha_gas: 0.01,
        alpha_blob: 0.15,
        initial_vault_eth: 10.0,
        target_vault_eth: 10.0,
        eip1559: Eip1559Config {
            max_change_denominator: 8,
        },
        arbitrum: ArbitrumConfig {
            initial_price_gwei: 0.02,
            inertia: 10,
            equil_units: 96_000_000.0,
        },
        ..Default::default()
    }
}

fn breakdown() -> SimOptions {
    SimOptions {
        collect_breakdown: true,
    }
}

fn fees(out: &core_types::OutputSeries) -> Vec<f64> {
    out.charged_fee_gwei
        .iter()
        .map(|f| f.expect("fee in range"))
        .collect()
}

#[test]
fn taiko_scenario_stays_clamped_and_settles_on_cadence() {
    let cfg = scenario_config(Mechanism::Taiko);
    let out = simulate_series(&cfg, &scenario_inputs(N), SimRange::full(N), breakdown())
        .expect("simulate");

    assert_eq!(out.len(), N);
    for (i, fee) in fees(&out).into_iter().enumerate() {
        assert!(fee.is_finite(), "fee[{i}] not finite");
        assert!(fee >= 0.01 - 1e-12, "fee[{i}] below min");
        assert!(fee <= 1.0 + 1e-12, "fee[{i}] above max");
    }

    let mut prev = cfg.initial_vault_eth;
    for i in 0..N {
        let vault = out.vault_eth[i].expect("vault in range");
        if (i + 1) % 2 != 0 {
            assert_eq!(vault, prev, "vault moved off-cadence at {i}");
        }
        prev = vault;
    }

    let b = out.breakdown.expect("breakdown");
    for series in [
        &b.required_fee_gwei,
        &b.posting_pnl_eth,
        &b.deficit_eth,
        &b.epsilon,
        &b.integral,
    ] {
        assert!(series.iter().flatten().all(|v| v.is_finite()));
    }
    assert_eq!(b.posting_blocks.len(), N / 2);
}

#[test]
fn identical_inputs_give_identical_outputs() {
    for mechanism in [Mechanism::Taiko, Mechanism::Eip1559, Mechanism::Arbitrum] {
        let cfg = scenario_config(mechanism);
        let inputs = varied_inputs(40);
        let a = simulate_series(&cfg, &inputs, SimRange::full(40), breakdown()).expect("a");
        let b = simulate_series(&cfg, &inputs, SimRange::full(40), breakdown()).expect("b");
        assert_eq!(a, b, "{mechanism} not deterministic");
    }
}

#[test]
fn dfb_zero_behaves_like_one() {
    let mut zero = scenario_config(Mechanism::Taiko);
    zero.post_every_blocks = 1;
    zero.initial_vault_eth = 1.0;
    zero.target_vault_eth = 10.0;
    zero.l1_gas_used = 250_000.0;
    zero.dfb_blocks = 0;
    let one = SimulationConfig {
        dfb_blocks: 1,
        ..zero.clone()
    };

    let inputs = scenario_inputs(N);
    let out_zero = simulate_series(&zero, &inputs, SimRange::full(N), breakdown()).expect("zero");
    let out_one = simulate_series(&one, &inputs, SimRange::full(N), breakdown()).expect("one");

    assert_eq!(out_zero.charged_fee_gwei, out_one.charged_fee_gwei);
    assert_eq!(out_zero.vault_eth, out_one.vault_eth);
    assert_eq!(
        out_zero.breakdown.map(|b| b.epsilon),
        out_one.breakdown.map(|b| b.epsilon)
    );
}

#[test]
fn eip1559_fee_rises_from_min_under_deficit() {
    let mut cfg = scenario_config(Mechanism::Eip1559);
    cfg.post_every_blocks = 1;
    cfg.initial_vault_eth = 1.0;
    cfg.target_vault_eth = 10.0;
    cfg.l1_gas_used = 200_000.0;
    cfg.max_fee_wei = 2e9;
    cfg.min_fee_wei = 0.01e9;
    let mut inputs = scenario_inputs(N);
    inputs.l2_gas_per_l1_block = vec![50_000.0; N];

    let out = simulate_series(&cfg, &inputs, SimRange::full(N), breakdown()).expect("simulate");
    let fees = fees(&out);
    assert!((fees[0] - 0.01).abs() <= 1e-12, "first step should start at min fee");
    let max_seen = fees.iter().copied().fold(f64::MIN, f64::max);
    assert!(max_seen > 0.01);
    assert!(max_seen <= 2.0 + 1e-12);
}

#[test]
fn arbitrum_charges_more_in_deficit_than_in_surplus() {
    let build = |initial_vault_eth: f64| {
        let mut cfg = scenario_config(Mechanism::Arbitrum);
        cfg.post_every_blocks = 1;
        cfg.initial_vault_eth = initial_vault_eth;
        cfg.target_vault_eth = 10.0;
        cfg.arbitrum.initial_price_gwei = 0.05;
        cfg.max_fee_wei = 2e9;
        cfg
    };
    let inputs = scenario_inputs(N);
    let low = simulate_series(&build(2.0), &inputs, SimRange::full(N), breakdown()).expect("low");
    let high =
        simulate_series(&build(20.0), &inputs, SimRange::full(N), breakdown()).expect("high");
    let low_fee = low.charged_fee_gwei[4].expect("fee");
    let high_fee = high.charged_fee_gwei[4].expect("fee");
    assert!(low_fee > high_fee, "deficit {low_fee} <= surplus {high_fee}");
}

#[test]
fn sliced_run_matches_ranged_run_for_every_mechanism() {
    let n = 30;
    let (i0, i1) = (7, 22);
    let full = varied_inputs(n);
    let sliced = full.slice(i0, i1);

    for mechanism in [Mechanism::Taiko, Mechanism::Eip1559, Mechanism::Arbitrum] {
        let cfg = scenario_config(mechanism);
        let ranged = simulate_series(
            &cfg,
            &full,
            SimRange {
                start: i0,
                end: i1,
                block_index_offset: 0,
            },
            SimOptions::default(),
        )
        .expect("ranged");
        let replay = simulate_series(
            &cfg,
            &sliced,
            SimRange {
                start: 0,
                end: i1 - i0,
                block_index_offset: i0 as u64,
            },
            SimOptions::default(),
        )
        .expect("replay");

        assert_eq!(replay.charged_fee_gwei, ranged.charged_fee_gwei[i0..=i1]);
        assert_eq!(replay.vault_eth, ranged.vault_eth[i0..=i1]);
    }
}

#[test]
fn replay_range_matches_ranged_run() {
    let n = 30;
    let inputs = varied_inputs(n);
    let cfg = scenario_config(Mechanism::Taiko);
    let ranged = simulate_series(
        &cfg,
        &inputs,
        SimRange {
            start: 9,
            end: 20,
            block_index_offset: 0,
        },
        SimOptions::default(),
    )
    .expect("ranged");
    let replay = replay_range(&cfg, &inputs, 9, 20, SimOptions::default()).expect("replay");
    assert_eq!(replay, ranged);
}

#[test]
fn dynamic_blobs_raise_cost_with_demand() {
    let mut cfg = scenario_config(Mechanism::Taiko);
    cfg.blob_mode = BlobMode::Dynamic;
    let mut heavy = scenario_inputs(N);
    heavy.l2_gas_per_l1_block = vec![500_000_000.0; N];
    let light = scenario_inputs(N);

    let cost = |inputs: &InputSeries| {
        simulate_series(&cfg, inputs, SimRange::full(N), breakdown())
            .expect("simulate")
            .breakdown
            .expect("breakdown")
            .blob_cost_eth[0]
            .expect("cost")
    };
    assert!(cost(&heavy) > cost(&light));
}
