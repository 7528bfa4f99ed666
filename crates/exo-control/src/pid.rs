//! PID controller used by the standing-hold control law.
//!
//! Two details matter on an ankle actuator:
//!
//! - the derivative acts on the *measurement*, not the error, so moving the
//!   set-point (e.g. after recalibration) produces no torque spike;
//! - the integrator only accumulates while the output is unsaturated, or
//!   while the error is pulling it back out of saturation.
//!
//! # Example
//!
//! ```rust
//! use exo_control::pid::PidController;
//!
//! let mut pid = PidController::new(1.0, 0.1, 0.05);
//! pid.set_set_point(5.0); // standing angle [deg]
//!
//! let torque = pid.update(0.0, 0.005);
//! assert!(torque > 0.0);
//! ```

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    set_point: f64,
    integral: f64,
    last_measurement: Option<f64>,
    output_min: f64,
    output_max: f64,
}

impl PidController {
    /// Unclamped controller with the given gains.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            set_point: 0.0,
            integral: 0.0,
            last_measurement: None,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        }
    }

    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn set_set_point(&mut self, set_point: f64) {
        self.set_point = set_point;
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    /// Clamp the output to `[min, max]`.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Compute the next output from `measurement`, `dt` seconds after the
    /// previous call.
    ///
    /// Returns `0.0` and leaves the state untouched when `dt` is not a
    /// positive finite number.
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        if !(dt.is_finite() && dt > 0.0) {
            return 0.0;
        }

        let error = self.set_point - measurement;
        let p = self.kp * error;
        let d = match self.last_measurement {
            Some(prev) => -self.kd * (measurement - prev) / dt,
            None => 0.0,
        };
        self.last_measurement = Some(measurement);

        let candidate = self.integral + error * dt;
        let unclamped = p + self.ki * candidate + d;
        let output = unclamped.clamp(self.output_min, self.output_max);

        let saturated_high = unclamped > self.output_max;
        let saturated_low = unclamped < self.output_min;
        if !(saturated_high || saturated_low)
            || (saturated_high && error < 0.0)
            || (saturated_low && error > 0.0)
        {
            self.integral = candidate;
        }

        output
    }

    /// Clear the integrator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_measurement = None;
    }
}
