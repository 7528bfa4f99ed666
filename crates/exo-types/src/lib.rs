//! `exo-types` – shared vocabulary of the exoskeleton control stack.
//!
//! Every other crate in the workspace speaks in these types: the per-side
//! [`Frame`] read from a device, the [`GaitState`] an estimator derives from
//! it, the [`Command`] a controller emits, the process-wide
//! [`Configuration`], and the lifecycle / termination vocabulary used by the
//! session manager.

pub mod config;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::{
    ControlParams, ControllerKind, Configuration, EstimatorKind, EstimatorParams, ParamKey,
    SideSelection,
};

// ─────────────────────────────────────────────────────────────────────────────
// Side
// ─────────────────────────────────────────────────────────────────────────────

/// One independently actuated side of the exoskeleton.
///
/// `Left` orders before `Right`; every per-side collection in the workspace
/// iterates in that order so iteration results are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, in iteration order.
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// Upper-case label used in file names and CSV column names.
    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// One iteration's raw sensor/actuator readings for a single side.
///
/// The field names double as CSV column names, both for recorded telemetry
/// and for replay datasets.  Only `loop_time` is mandatory in a dataset;
/// missing sensor columns read as `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds since the session's loop started (live) or as recorded (replay).
    pub loop_time: f64,
    /// Ankle joint angle [deg].
    #[serde(default)]
    pub ankle_angle: f64,
    /// Ankle joint velocity [deg/s].
    #[serde(default)]
    pub ankle_velocity: f64,
    /// Motor encoder angle [deg].
    #[serde(default)]
    pub motor_angle: f64,
    /// Motor velocity [deg/s].
    #[serde(default)]
    pub motor_velocity: f64,
    /// Measured motor current [mA].
    #[serde(default)]
    pub motor_current: f64,
    #[serde(default)]
    pub accel_x: f64,
    #[serde(default)]
    pub accel_y: f64,
    #[serde(default)]
    pub accel_z: f64,
    #[serde(default)]
    pub gyro_x: f64,
    #[serde(default)]
    pub gyro_y: f64,
    /// Shank angular rate in the sagittal plane [deg/s]; drives heel-strike
    /// detection.
    #[serde(default)]
    pub gyro_z: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// GaitState
// ─────────────────────────────────────────────────────────────────────────────

/// Output of a gait-state estimator for one side and one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GaitState {
    /// A heel strike was detected on this iteration.
    pub heel_strike: bool,
    /// Fraction of the current stride elapsed, in `[0, 1]`, when known.
    pub gait_phase: Option<f64>,
    /// Estimated stride period [s], when known.
    pub stride_period: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// Actuator command issued to one side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum Command {
    /// No command: the motor is left slack.  Used in read-only mode and
    /// whenever a controller has nothing meaningful to say.
    #[default]
    Idle,
    /// Ankle torque set-point [Nm].
    Torque(f64),
}

impl Command {
    /// Short lower-case tag for telemetry.
    pub fn mode(&self) -> &'static str {
        match self {
            Command::Idle => "idle",
            Command::Torque(_) => "torque",
        }
    }

    /// Numeric set-point, `0.0` for [`Command::Idle`].
    pub fn value(&self) -> f64 {
        match *self {
            Command::Idle => 0.0,
            Command::Torque(v) => v,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// States of a session, in the only order they may be visited.
///
/// `Calibrating` and `Active` may be skipped (straight to `Stopping`);
/// nothing ever moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Starting,
    Calibrating,
    Active,
    Stopping,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Starting => "STARTING",
            LifecycleState::Calibrating => "CALIBRATING",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Why a session left its main loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "details", rename_all = "snake_case")]
pub enum TerminationCause {
    /// Operator typed a quit command.
    OperatorQuit,
    /// Replay dataset has no more rows.
    Exhaustion,
    /// The configured offline test duration elapsed.
    DurationElapsed,
    /// Operator abort (Ctrl-C).
    Interrupted,
    /// Startup or runtime failure; the session was torn down.
    Fatal(String),
}

impl TerminationCause {
    /// `true` for every cause except [`TerminationCause::Fatal`].
    pub fn is_normal(&self) -> bool {
        !matches!(self, TerminationCause::Fatal(_))
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::OperatorQuit => f.write_str("operator quit"),
            TerminationCause::Exhaustion => f.write_str("exhaustion"),
            TerminationCause::DurationElapsed => f.write_str("duration elapsed"),
            TerminationCause::Interrupted => f.write_str("interrupted"),
            TerminationCause::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared by devices, datasets, telemetry and configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExoError {
    #[error("Device fault on {side}: {details}")]
    DeviceFault { side: Side, details: String },

    #[error("Calibration failed on {side}: {details}")]
    Calibration { side: Side, details: String },

    #[error("Replay dataset not found: {0}")]
    DatasetMissing(String),

    #[error("Replay dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExoError {
    fn from(e: std::io::Error) -> Self {
        ExoError::Io(e.to_string())
    }
}
