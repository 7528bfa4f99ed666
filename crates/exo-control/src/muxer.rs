//! Construction of the estimator and controller selected in a
//! [`Configuration`].

use exo_types::{Configuration, ControllerKind, EstimatorKind, Side};

use crate::controller::{Controller, SplineController, StandingHoldController, ZeroTorqueController};
use crate::estimator::{GaitStateEstimator, HeelStrikeEstimator};

/// Estimator of kind `config.estimator` for `side`.
pub fn build_estimator(side: Side, config: &Configuration) -> Box<dyn GaitStateEstimator> {
    match config.estimator {
        EstimatorKind::HeelStrike => Box::new(HeelStrikeEstimator::new(
            side,
            config.estimator_params.clone(),
        )),
    }
}

/// Controller of kind `config.controller` for `side`.
pub fn build_controller(side: Side, config: &Configuration) -> Box<dyn Controller> {
    match config.controller {
        ControllerKind::Spline => Box::new(SplineController::new(config)),
        ControllerKind::ZeroTorque => Box::new(ZeroTorqueController),
        ControllerKind::StandingHold => Box::new(StandingHoldController::new(side, config)),
    }
}
