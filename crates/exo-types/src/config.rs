//! Process-wide control configuration and its hot-reloadable key table.
//!
//! A [`Configuration`] is created at startup (defaults, then the TOML file,
//! then environment overrides), shared with the operator listener behind a
//! mutex, and copied out by the control loop whenever an update is pending.
//!
//! Only the fields named by [`ParamKey`] may be changed while the device is
//! running.  Updates go through [`Configuration::with_updates`], which either
//! applies every requested change and passes [`Configuration::validate`], or
//! leaves the original untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ExoError, Side};

// ─────────────────────────────────────────────────────────────────────────────
// Selections
// ─────────────────────────────────────────────────────────────────────────────

/// Which sides of the device are actuated in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideSelection {
    Left,
    Right,
    #[default]
    Both,
}

impl SideSelection {
    /// The selected sides in iteration order.
    pub fn sides(self) -> &'static [Side] {
        match self {
            SideSelection::Left => &[Side::Left],
            SideSelection::Right => &[Side::Right],
            SideSelection::Both => &Side::ALL,
        }
    }
}

/// Gait-state estimator variant, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    HeelStrike,
}

/// Control-law variant, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Four-point torque spline over gait phase.
    #[default]
    Spline,
    /// Transparent mode: always command zero torque.
    ZeroTorque,
    /// PID hold of the calibrated standing angle.
    StandingHold,
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorKind::HeelStrike => f.write_str("heel_strike"),
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerKind::Spline => "spline",
            ControllerKind::ZeroTorque => "zero_torque",
            ControllerKind::StandingHold => "standing_hold",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tunables
// ─────────────────────────────────────────────────────────────────────────────

/// Heel-strike estimator tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    /// Rising-edge threshold on `gyro_z` [deg/s].
    pub heel_strike_threshold: f64,
    /// Minimum time between two heel strikes [s].
    pub heel_strike_refractory: f64,
    /// Number of stride intervals averaged into the stride period.
    pub num_strides_averaged: usize,
    /// Intervals longer than this [s] are treated as a pause and reset history.
    pub max_stride_period: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            heel_strike_threshold: 100.0,
            heel_strike_refractory: 0.4,
            num_strides_averaged: 3,
            max_stride_period: 2.0,
        }
    }
}

/// Controller tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    /// Gait phase at which torque starts rising.
    pub rise_fraction: f64,
    /// Peak torque of the spline profile [Nm].
    pub peak_torque: f64,
    /// Gait phase at which the profile peaks.
    pub peak_fraction: f64,
    /// Gait phase at which torque returns to zero.
    pub fall_fraction: f64,
    /// Absolute torque ceiling enforced on every command [Nm].
    pub max_torque: f64,
    pub hold_kp: f64,
    pub hold_ki: f64,
    pub hold_kd: f64,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            rise_fraction: 0.2,
            peak_torque: 15.0,
            peak_fraction: 0.53,
            fall_fraction: 0.62,
            max_torque: 30.0,
            hold_kp: 0.5,
            hold_ki: 0.0,
            hold_kd: 0.01,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Control/estimator configuration plus per-side calibration offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Loop frequency the timing controller aims for [Hz].
    pub target_freq: f64,
    /// Read and log sensors without computing or applying control.
    pub read_only: bool,
    /// Skip device writes whose command equals the previous one.
    pub only_log_if_new: bool,
    pub sides: SideSelection,
    pub estimator: EstimatorKind,
    pub controller: ControllerKind,
    /// Ankle angle measured during standing calibration, left side [deg].
    pub left_standing_angle: f64,
    /// Ankle angle measured during standing calibration, right side [deg].
    pub right_standing_angle: f64,
    pub estimator_params: EstimatorParams,
    pub control_params: ControlParams,
    /// Telemetry columns handed to the external plotting step.
    pub vars_to_plot: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            target_freq: 200.0,
            read_only: false,
            only_log_if_new: true,
            sides: SideSelection::default(),
            estimator: EstimatorKind::default(),
            controller: ControllerKind::default(),
            left_standing_angle: 0.0,
            right_standing_angle: 0.0,
            estimator_params: EstimatorParams::default(),
            control_params: ControlParams::default(),
            vars_to_plot: Vec::new(),
        }
    }
}

impl Configuration {
    /// Whether device writes are suppressed when the command is unchanged.
    ///
    /// Suppression never applies in read-only mode: every iteration still
    /// records its (idle) command.
    pub fn only_write_if_new(&self) -> bool {
        !self.read_only && self.only_log_if_new
    }

    /// Standing angle recorded for `side`.
    pub fn standing_angle(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_standing_angle,
            Side::Right => self.right_standing_angle,
        }
    }

    /// Store the standing angle measured for `side`.
    pub fn set_standing_angle(&mut self, side: Side, angle: f64) {
        match side {
            Side::Left => self.left_standing_angle = angle,
            Side::Right => self.right_standing_angle = angle,
        }
    }

    /// Current value of a hot-reloadable field.
    pub fn get(&self, key: ParamKey) -> f64 {
        let c = &self.control_params;
        let e = &self.estimator_params;
        match key {
            ParamKey::RiseFraction => c.rise_fraction,
            ParamKey::PeakTorque => c.peak_torque,
            ParamKey::PeakFraction => c.peak_fraction,
            ParamKey::FallFraction => c.fall_fraction,
            ParamKey::MaxTorque => c.max_torque,
            ParamKey::HoldKp => c.hold_kp,
            ParamKey::HoldKi => c.hold_ki,
            ParamKey::HoldKd => c.hold_kd,
            ParamKey::HeelStrikeThreshold => e.heel_strike_threshold,
            ParamKey::HeelStrikeRefractory => e.heel_strike_refractory,
            ParamKey::NumStridesAveraged => e.num_strides_averaged as f64,
            ParamKey::MaxStridePeriod => e.max_stride_period,
            ParamKey::LeftStandingAngle => self.left_standing_angle,
            ParamKey::RightStandingAngle => self.right_standing_angle,
        }
    }

    fn set(&mut self, key: ParamKey, value: f64) -> Result<(), ExoError> {
        if !value.is_finite() {
            return Err(ExoError::InvalidParameter(format!(
                "{} must be a finite number",
                key.name()
            )));
        }
        let c = &mut self.control_params;
        let e = &mut self.estimator_params;
        match key {
            ParamKey::RiseFraction => c.rise_fraction = value,
            ParamKey::PeakTorque => c.peak_torque = value,
            ParamKey::PeakFraction => c.peak_fraction = value,
            ParamKey::FallFraction => c.fall_fraction = value,
            ParamKey::MaxTorque => c.max_torque = value,
            ParamKey::HoldKp => c.hold_kp = value,
            ParamKey::HoldKi => c.hold_ki = value,
            ParamKey::HoldKd => c.hold_kd = value,
            ParamKey::HeelStrikeThreshold => e.heel_strike_threshold = value,
            ParamKey::HeelStrikeRefractory => e.heel_strike_refractory = value,
            ParamKey::NumStridesAveraged => {
                if value.fract() != 0.0 || value < 1.0 {
                    return Err(ExoError::InvalidParameter(format!(
                        "{} must be a positive integer, got {value}",
                        key.name()
                    )));
                }
                e.num_strides_averaged = value as usize;
            }
            ParamKey::MaxStridePeriod => e.max_stride_period = value,
            ParamKey::LeftStandingAngle => self.left_standing_angle = value,
            ParamKey::RightStandingAngle => self.right_standing_angle = value,
        }
        Ok(())
    }

    /// Return a copy with every `(key, value)` applied, or an error if any
    /// single value is rejected or the result fails [`validate`](Self::validate).
    ///
    /// `self` is never modified, so callers holding a lock can build the
    /// candidate and swap it in only on success.
    pub fn with_updates(&self, updates: &[(ParamKey, f64)]) -> Result<Configuration, ExoError> {
        let mut next = self.clone();
        for &(key, value) in updates {
            next.set(key, value)?;
        }
        next.validate()?;
        Ok(next)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ExoError> {
        let invalid = |msg: String| Err(ExoError::InvalidParameter(msg));

        if !(self.target_freq.is_finite() && self.target_freq > 0.0) {
            return Err(ExoError::Config(format!(
                "target_freq must be positive, got {}",
                self.target_freq
            )));
        }

        let c = &self.control_params;
        for (name, v) in [
            ("rise_fraction", c.rise_fraction),
            ("peak_fraction", c.peak_fraction),
            ("fall_fraction", c.fall_fraction),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return invalid(format!("{name} must lie in [0, 1], got {v}"));
            }
        }
        if !(c.rise_fraction < c.peak_fraction && c.peak_fraction < c.fall_fraction) {
            return invalid(format!(
                "spline fractions must satisfy rise < peak < fall, got {} / {} / {}",
                c.rise_fraction, c.peak_fraction, c.fall_fraction
            ));
        }
        if c.max_torque <= 0.0 {
            return invalid(format!("max_torque must be positive, got {}", c.max_torque));
        }
        if c.peak_torque < 0.0 || c.peak_torque > c.max_torque {
            return invalid(format!(
                "peak_torque must lie in [0, max_torque={}], got {}",
                c.max_torque, c.peak_torque
            ));
        }
        if c.hold_kp < 0.0 || c.hold_ki < 0.0 || c.hold_kd < 0.0 {
            return invalid("hold gains must be non-negative".to_string());
        }

        let e = &self.estimator_params;
        if e.heel_strike_threshold <= 0.0 {
            return invalid(format!(
                "heel_strike_threshold must be positive, got {}",
                e.heel_strike_threshold
            ));
        }
        if e.heel_strike_refractory < 0.0 {
            return invalid("heel_strike_refractory must be non-negative".to_string());
        }
        if e.num_strides_averaged == 0 {
            return invalid("num_strides_averaged must be at least 1".to_string());
        }
        if e.max_stride_period <= 0.0 {
            return invalid("max_stride_period must be positive".to_string());
        }
        Ok(())
    }

    /// Column names of a configuration snapshot row, `LOOP_TIME` first.
    pub fn snapshot_header() -> Vec<&'static str> {
        let mut header = vec![
            "LOOP_TIME",
            "TARGET_FREQ",
            "READ_ONLY",
            "ESTIMATOR",
            "CONTROLLER",
        ];
        header.extend(ParamKey::ALL.iter().map(|k| k.column()));
        header
    }

    /// Values matching [`snapshot_header`](Self::snapshot_header).
    pub fn snapshot_record(&self, loop_time: f64) -> Vec<String> {
        let mut row = vec![
            loop_time.to_string(),
            self.target_freq.to_string(),
            self.read_only.to_string(),
            self.estimator.to_string(),
            self.controller.to_string(),
        ];
        row.extend(ParamKey::ALL.iter().map(|&k| self.get(k).to_string()));
        row
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hot-reload keys
// ─────────────────────────────────────────────────────────────────────────────

/// Fields that may be changed while the loop is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    RiseFraction,
    PeakTorque,
    PeakFraction,
    FallFraction,
    MaxTorque,
    HoldKp,
    HoldKi,
    HoldKd,
    HeelStrikeThreshold,
    HeelStrikeRefractory,
    NumStridesAveraged,
    MaxStridePeriod,
    LeftStandingAngle,
    RightStandingAngle,
}

/// Fields that exist but can only be set at startup.
const STRUCTURAL_KEYS: &[&str] = &[
    "target_freq",
    "read_only",
    "only_log_if_new",
    "sides",
    "estimator",
    "controller",
    "vars_to_plot",
];

impl ParamKey {
    pub const ALL: [ParamKey; 14] = [
        ParamKey::RiseFraction,
        ParamKey::PeakTorque,
        ParamKey::PeakFraction,
        ParamKey::FallFraction,
        ParamKey::MaxTorque,
        ParamKey::HoldKp,
        ParamKey::HoldKi,
        ParamKey::HoldKd,
        ParamKey::HeelStrikeThreshold,
        ParamKey::HeelStrikeRefractory,
        ParamKey::NumStridesAveraged,
        ParamKey::MaxStridePeriod,
        ParamKey::LeftStandingAngle,
        ParamKey::RightStandingAngle,
    ];

    /// Lower-case name accepted on the operator channel.
    pub fn name(self) -> &'static str {
        match self {
            ParamKey::RiseFraction => "rise_fraction",
            ParamKey::PeakTorque => "peak_torque",
            ParamKey::PeakFraction => "peak_fraction",
            ParamKey::FallFraction => "fall_fraction",
            ParamKey::MaxTorque => "max_torque",
            ParamKey::HoldKp => "hold_kp",
            ParamKey::HoldKi => "hold_ki",
            ParamKey::HoldKd => "hold_kd",
            ParamKey::HeelStrikeThreshold => "heel_strike_threshold",
            ParamKey::HeelStrikeRefractory => "heel_strike_refractory",
            ParamKey::NumStridesAveraged => "num_strides_averaged",
            ParamKey::MaxStridePeriod => "max_stride_period",
            ParamKey::LeftStandingAngle => "left_standing_angle",
            ParamKey::RightStandingAngle => "right_standing_angle",
        }
    }

    /// Upper-case column name used in configuration snapshots.
    pub fn column(self) -> &'static str {
        match self {
            ParamKey::RiseFraction => "RISE_FRACTION",
            ParamKey::PeakTorque => "PEAK_TORQUE",
            ParamKey::PeakFraction => "PEAK_FRACTION",
            ParamKey::FallFraction => "FALL_FRACTION",
            ParamKey::MaxTorque => "MAX_TORQUE",
            ParamKey::HoldKp => "HOLD_KP",
            ParamKey::HoldKi => "HOLD_KI",
            ParamKey::HoldKd => "HOLD_KD",
            ParamKey::HeelStrikeThreshold => "HEEL_STRIKE_THRESHOLD",
            ParamKey::HeelStrikeRefractory => "HEEL_STRIKE_REFRACTORY",
            ParamKey::NumStridesAveraged => "NUM_STRIDES_AVERAGED",
            ParamKey::MaxStridePeriod => "MAX_STRIDE_PERIOD",
            ParamKey::LeftStandingAngle => "LEFT_STANDING_ANGLE",
            ParamKey::RightStandingAngle => "RIGHT_STANDING_ANGLE",
        }
    }

    /// Resolve an operator-supplied key, case-insensitively.
    ///
    /// Structural keys get a dedicated message so the operator knows the
    /// name was understood but cannot be changed mid-session.
    pub fn from_name(raw: &str) -> Result<ParamKey, ExoError> {
        let wanted = raw.trim().to_ascii_lowercase();
        if let Some(key) = ParamKey::ALL.iter().find(|k| k.name() == wanted) {
            return Ok(*key);
        }
        if STRUCTURAL_KEYS.contains(&wanted.as_str()) {
            return Err(ExoError::InvalidParameter(format!(
                "'{wanted}' can only be set at startup"
            )));
        }
        Err(ExoError::InvalidParameter(format!("unknown parameter '{}'", raw.trim())))
    }
}
