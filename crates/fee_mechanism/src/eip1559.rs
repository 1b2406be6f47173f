use core_types::{
    clamp_num, FeeController, FeeParts, Mechanism, SettlementInputs, SimulationConfig, StepInputs,
};

const MIN_ERROR_RATIO: f64 = -8.0;
const MAX_ERROR_RATIO: f64 = 1.0;

/// Multiplicative adjustment toward the target vault, applied once per
/// settlement. Between settlements the fee is flat.
#[derive(Debug, Clone)]
pub struct Eip1559Controller {
    fee_wei: f64,
    min_fee_wei: f64,
    max_fee_wei: f64,
    target_vault_eth: f64,
    denominator: f64,
}

impl Eip1559Controller {
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            fee_wei: cfg.min_fee_wei,
            min_fee_wei: cfg.min_fee_wei,
            max_fee_wei: cfg.max_fee_wei,
            target_vault_eth: cfg.target_vault_eth,
            denominator: cfg.eip1559.max_change_denominator.max(1) as f64,
        }
    }

    pub fn fee_wei(&self) -> f64 {
        self.fee_wei
    }
}

impl FeeController for Eip1559Controller {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Eip1559
    }

    fn step(&mut self, _inputs: &StepInputs) -> FeeParts {
        FeeParts {
            charged_fee_wei: clamp_num(self.fee_wei, self.min_fee_wei, self.max_fee_wei),
            ..Default::default()
        }
    }

    fn on_settlement(&mut self, inputs: &SettlementInputs) {
        if self.target_vault_eth > 0.0 {
            let error_ratio = clamp_num(
                (self.target_vault_eth - inputs.vault_eth) / self.target_vault_eth,
                MIN_ERROR_RATIO,
                MAX_ERROR_RATIO,
            );
            let next = self.fee_wei * (1.0 + error_ratio / self.denominator);
            if next.is_finite() {
                self.fee_wei = clamp_num(next, self.min_fee_wei, self.max_fee_wei);
            } else {
                tracing::warn!(fee_wei = self.fee_wei, "non-finite eip1559 update skipped");
            }
        } else {
            self.fee_wei = clamp_num(self.fee_wei, self.min_fee_wei, self.max_fee_wei);
        }
    }
}
