use core_types::{clamp_num, FeeController, FeeParts, Mechanism, SimulationConfig, StepInputs};

#[derive(Debug, Clone, Copy)]
struct TaikoGains {
    alpha_gas: f64,
    alpha_blob: f64,
    priority_fee_wei: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    p_term_min_wei: f64,
    i_min: f64,
    i_max: f64,
    deriv_beta: f64,
    min_fee_wei: f64,
    max_fee_wei: f64,
    fee_range_wei: f64,
}

/// Lagged-cost feedforward plus a PID loop on the normalized vault deficit.
/// All terms are recomputed every block.
#[derive(Debug, Clone)]
pub struct TaikoController {
    gains: TaikoGains,
    integral: f64,
    deriv_filtered: f64,
    epsilon_prev: f64,
}

impl TaikoController {
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            gains: TaikoGains {
                alpha_gas: cfg.alpha_gas,
                alpha_blob: cfg.alpha_blob,
                priority_fee_wei: cfg.priority_fee_wei,
                kp: cfg.kp,
                ki: cfg.ki,
                kd: cfg.kd,
                p_term_min_wei: cfg.p_term_min_wei,
                i_min: cfg.i_min,
                i_max: cfg.i_max,
                deriv_beta: cfg.deriv_beta,
                min_fee_wei: cfg.min_fee_wei,
                max_fee_wei: cfg.max_fee_wei,
                fee_range_wei: cfg.fee_range_wei(),
            },
            integral: 0.0,
            deriv_filtered: 0.0,
            epsilon_prev: 0.0,
        }
    }
}

impl FeeController for TaikoController {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Taiko
    }

    fn step(&mut self, inputs: &StepInputs) -> FeeParts {
        let g = &self.gains;
        let eps = inputs.epsilon;

        let gas_component_wei = g.alpha_gas * (inputs.base_fee_ff_wei + g.priority_fee_wei);
        let blob_component_wei = g.alpha_blob * inputs.blob_base_fee_ff_wei;

        self.integral = clamp_num(self.integral + eps, g.i_min, g.i_max);
        let raw_derivative = if inputs.local_index > 0 {
            eps - self.epsilon_prev
        } else {
            0.0
        };
        self.deriv_filtered =
            g.deriv_beta * self.deriv_filtered + (1.0 - g.deriv_beta) * raw_derivative;

        let p_term_wei = g.p_term_min_wei.max(g.kp * eps * g.fee_range_wei);
        let i_term_wei = g.ki * self.integral * g.fee_range_wei;
        let d_term_wei = g.kd * self.deriv_filtered * g.fee_range_wei;
        let feedback_wei = p_term_wei + i_term_wei + d_term_wei;
        let feedforward_wei = gas_component_wei + blob_component_wei;

        self.epsilon_prev = eps;

        FeeParts {
            charged_fee_wei: clamp_num(
                feedforward_wei + feedback_wei,
                g.min_fee_wei,
                g.max_fee_wei,
            ),
            gas_component_wei,
            blob_component_wei,
            feedforward_wei,
            p_term_wei,
            i_term_wei,
            d_term_wei,
            feedback_wei,
            integral: self.integral,
            derivative: self.deriv_filtered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SimulationConfig {
        SimulationConfig {
            kp: 1.0,
            ki: 0.1,
            kd: 0.5,
            i_min: -10.0,
            i_max: 10.0,
            min_fee_wei: 0.01e9,
            max_fee_wei: 1.0e9,
            alpha_gas: 0.01,
            alpha_blob: 0.15,
            priority_fee_wei: 1e9,
            ..Default::default()
        }
        .sanitized()
    }

    fn step(local_index: usize, epsilon: f64) -> StepInputs {
        StepInputs {
            local_index,
            epsilon,
            base_fee_ff_wei: 1e9,
            blob_base_fee_ff_wei: 2e9,
        }
    }

    #[test]
    fn feedforward_uses_lagged_costs() {
        let mut ctl = TaikoController::new(&cfg());
        let parts = ctl.step(&step(0, 0.0));
        assert!((parts.gas_component_wei - 0.01 * 2e9).abs() < 1e-6);
        assert!((parts.blob_component_wei - 0.15 * 2e9).abs() < 1e-6);
        assert_eq!(parts.feedback_wei, 0.0);
        assert!((parts.charged_fee_wei - 0.32e9).abs() < 1e-3);
    }

    #[test]
    fn derivative_is_zero_on_first_local_step() {
        let mut ctl = TaikoController::new(&cfg());
        let parts = ctl.step(&step(0, 0.5));
        assert_eq!(parts.derivative, 0.0);
        let parts = ctl.step(&step(1, 0.7));
        // (1 - 0.8) * 0.2
        assert!((parts.derivative - 0.04).abs() < 1e-12);
    }

    #[test]
    fn integral_is_clamped() {
        let mut ctl = TaikoController::new(&cfg());
        let mut last = FeeParts::default();
        for i in 0..50 {
            last = ctl.step(&step(i, 1.0));
        }
        assert_eq!(last.integral, 10.0);
        for i in 50..150 {
            last = ctl.step(&step(i, -1.0));
        }
        assert_eq!(last.integral, -10.0);
    }

    #[test]
    fn p_term_respects_floor() {
        let mut floored = cfg();
        floored.p_term_min_wei = -1e6;
        let mut ctl = TaikoController::new(&floored);
        let parts = ctl.step(&step(0, -0.9));
        assert_eq!(parts.p_term_wei, -1e6);
    }

    #[test]
    fn fee_stays_within_clamp() {
        let c = cfg();
        let mut ctl = TaikoController::new(&c);
        for (i, eps) in [5.0, -5.0, 100.0, -100.0, 0.0].into_iter().enumerate() {
            let fee = ctl.step(&step(i, eps)).charged_fee_wei;
            assert!(fee >= c.min_fee_wei && fee <= c.max_fee_wei);
        }
    }
}
