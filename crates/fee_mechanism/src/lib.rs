//! Fee-setting state machines. Each run builds one controller from its
//! sanitized config and drives it block by block.

mod arbitrum;
mod eip1559;
mod taiko;

pub use arbitrum::ArbitrumController;
pub use eip1559::Eip1559Controller;
pub use taiko::TaikoController;

use core_types::{FeeController, Mechanism, SimulationConfig};

/// Fresh controller for `cfg.mechanism`. `cfg` must already be sanitized.
pub fn build_controller(cfg: &SimulationConfig) -> Box<dyn FeeController> {
    tracing::debug!(mechanism = %cfg.mechanism, "building fee controller");
    match cfg.mechanism {
        Mechanism::Taiko => Box::new(TaikoController::new(cfg)),
        Mechanism::Eip1559 => Box::new(Eip1559Controller::new(cfg)),
        Mechanism::Arbitrum => Box::new(ArbitrumController::new(cfg)),
    }
}
