use core_types::{
    clamp_num, FeeController, FeeParts, Mechanism, SettlementInputs, SimulationConfig, StepInputs,
    WEI_PER_GWEI,
};

/// Inertial price update driven by vault surplus and its change since the
/// previous settlement.
#[derive(Debug, Clone)]
pub struct ArbitrumController {
    price_gwei: f64,
    last_surplus_eth: f64,
    min_fee_wei: f64,
    max_fee_wei: f64,
    target_vault_eth: f64,
    inertia: f64,
    equil_units: f64,
}

impl ArbitrumController {
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            price_gwei: clamp_num(
                cfg.arbitrum.initial_price_gwei,
                cfg.min_fee_wei / WEI_PER_GWEI,
                cfg.max_fee_wei / WEI_PER_GWEI,
            ),
            last_surplus_eth: cfg.initial_vault_eth - cfg.target_vault_eth,
            min_fee_wei: cfg.min_fee_wei,
            max_fee_wei: cfg.max_fee_wei,
            target_vault_eth: cfg.target_vault_eth,
            inertia: cfg.arbitrum.inertia as f64,
            equil_units: cfg.arbitrum.equil_units,
        }
    }

    pub fn price_gwei(&self) -> f64 {
        self.price_gwei
    }
}

impl FeeController for ArbitrumController {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Arbitrum
    }

    fn step(&mut self, _inputs: &StepInputs) -> FeeParts {
        FeeParts {
            charged_fee_wei: clamp_num(
                self.price_gwei * WEI_PER_GWEI,
                self.min_fee_wei,
                self.max_fee_wei,
            ),
            ..Default::default()
        }
    }

    fn on_settlement(&mut self, inputs: &SettlementInputs) {
        let units = inputs.l2_gas_per_proposal.max(0.0);
        let surplus_eth = inputs.vault_eth - self.target_vault_eth;
        if units > 0.0 && self.equil_units > 0.0 && self.inertia > 0.0 {
            let inertia_units = self.equil_units / self.inertia;
            let desired_derivative_gwei = -(surplus_eth * WEI_PER_GWEI) / self.equil_units;
            let actual_derivative_gwei =
                ((surplus_eth - self.last_surplus_eth) * WEI_PER_GWEI) / units;
            let change = desired_derivative_gwei - actual_derivative_gwei;
            let denom = inertia_units + units;
            let delta_gwei = if denom > 0.0 {
                change * units / denom
            } else {
                0.0
            };
            self.price_gwei = (self.price_gwei + delta_gwei).max(0.0);
        }
        self.last_surplus_eth = surplus_eth;
    }
}
