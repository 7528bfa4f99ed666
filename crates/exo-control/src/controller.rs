//! Control laws.
//!
//! A [`Controller`] maps the current [`GaitState`] (and raw frame) to an
//! actuator [`Command`] for one side.  In read-only sessions every stock
//! controller answers [`Command::Idle`] without touching its internal state,
//! though the pipeline normally skips `step` entirely in that mode.

use exo_types::{Command, Configuration, ControlParams, Frame, GaitState, Side};

use crate::pid::PidController;

/// Per-side control law.
pub trait Controller: Send {
    /// Compute the command for this iteration.
    fn step(
        &mut self,
        state: &GaitState,
        frame: &Frame,
        config: &Configuration,
        read_only: bool,
    ) -> Command;

    /// Pick up new control parameters.  Called at the start of the
    /// iteration that first sees the update.
    fn update_params(&mut self, config: &Configuration);
}

// ────────────────────────────────────────────────────────────────────────────
// Spline torque profile
// ────────────────────────────────────────────────────────────────────────────

/// Torque of the rise/peak/fall profile at `phase`.
///
/// Zero before `rise_fraction` and from `fall_fraction` on; between them two
/// cubic ramps with zero slope at each knot meet at `peak_torque` on
/// `peak_fraction`.
pub fn spline_torque(phase: f64, params: &ControlParams) -> f64 {
    let (rise, peak, fall) = (
        params.rise_fraction,
        params.peak_fraction,
        params.fall_fraction,
    );
    if !(rise..fall).contains(&phase) {
        return 0.0;
    }
    let smoothstep = |s: f64| s * s * (3.0 - 2.0 * s);
    if phase < peak {
        params.peak_torque * smoothstep((phase - rise) / (peak - rise))
    } else {
        params.peak_torque * (1.0 - smoothstep((phase - peak) / (fall - peak)))
    }
}

/// Plantarflexion assistance following [`spline_torque`] over the stride.
///
/// Idle while gait phase is unknown.
#[derive(Debug, Clone)]
pub struct SplineController {
    params: ControlParams,
}

impl SplineController {
    pub fn new(config: &Configuration) -> Self {
        Self {
            params: config.control_params.clone(),
        }
    }
}

impl Controller for SplineController {
    fn step(
        &mut self,
        state: &GaitState,
        _frame: &Frame,
        _config: &Configuration,
        read_only: bool,
    ) -> Command {
        if read_only {
            return Command::Idle;
        }
        match state.gait_phase {
            Some(phase) => Command::Torque(spline_torque(phase, &self.params)),
            None => Command::Idle,
        }
    }

    fn update_params(&mut self, config: &Configuration) {
        self.params = config.control_params.clone();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Zero torque
// ────────────────────────────────────────────────────────────────────────────

/// Transparent mode: commands zero torque so the motor tracks the wearer.
#[derive(Debug, Clone, Default)]
pub struct ZeroTorqueController;

impl Controller for ZeroTorqueController {
    fn step(&mut self, _: &GaitState, _: &Frame, _: &Configuration, read_only: bool) -> Command {
        if read_only {
            Command::Idle
        } else {
            Command::Torque(0.0)
        }
    }

    fn update_params(&mut self, _config: &Configuration) {}
}

// ────────────────────────────────────────────────────────────────────────────
// Standing hold
// ────────────────────────────────────────────────────────────────────────────

/// Holds the ankle at the calibrated standing angle with a PID loop on
/// `ankle_angle`.  Output is limited to `±max_torque`.
#[derive(Debug, Clone)]
pub struct StandingHoldController {
    side: Side,
    pid: PidController,
    last_time: Option<f64>,
}

impl StandingHoldController {
    pub fn new(side: Side, config: &Configuration) -> Self {
        let mut controller = Self {
            side,
            pid: PidController::new(0.0, 0.0, 0.0),
            last_time: None,
        };
        controller.update_params(config);
        controller
    }
}

impl Controller for StandingHoldController {
    fn step(
        &mut self,
        _state: &GaitState,
        frame: &Frame,
        config: &Configuration,
        read_only: bool,
    ) -> Command {
        if read_only {
            return Command::Idle;
        }
        let dt = match self.last_time {
            Some(prev) => frame.loop_time - prev,
            None => 1.0 / config.target_freq,
        };
        self.last_time = Some(frame.loop_time);
        Command::Torque(self.pid.update(frame.ankle_angle, dt))
    }

    fn update_params(&mut self, config: &Configuration) {
        let p = &config.control_params;
        self.pid.set_gains(p.hold_kp, p.hold_ki, p.hold_kd);
        self.pid.set_output_limits(-p.max_torque, p.max_torque);
        // Error accumulated against the old standing angle is meaningless
        // once the target moves.
        let target = config.standing_angle(self.side);
        if self.pid.set_point() != target {
            self.pid.reset();
            self.pid.set_set_point(target);
        }
    }
}
