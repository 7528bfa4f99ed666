//! Session summary written when a session stops.
//!
//! The JSON file is the hand-off point for external plotting and analysis:
//! it names the telemetry files, the columns the operator asked to plot, and
//! how the session ended.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use exo_types::{ExoError, LifecycleState, Side, TerminationCause};
use serde::Serialize;

use crate::timer::CycleStats;

/// Per-side write accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub side: Side,
    pub writes_sent: u64,
    pub writes_skipped: u64,
    pub closed: bool,
}

/// Everything known about a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub cause: TerminationCause,
    /// Completed loop iterations.
    pub iterations: u64,
    /// `loop_time` of the last completed iteration.
    pub last_loop_time: f64,
    /// Lifecycle states in the order they were entered.
    pub states: Vec<LifecycleState>,
    pub parameter_updates: u64,
    pub controller_steps: u64,
    pub limiter_interventions: u64,
    pub devices: Vec<DeviceSummary>,
    /// Devices that reported an error while closing.
    pub close_failures: Vec<String>,
    pub telemetry_error: Option<String>,
    pub pacing: CycleStats,
    pub avg_period: Option<f64>,
    pub telemetry_files: Vec<PathBuf>,
    pub vars_to_plot: Vec<String>,
}

impl SessionReport {
    /// Normal termination with every device and file closed cleanly.
    pub fn is_clean(&self) -> bool {
        self.cause.is_normal() && self.close_failures.is_empty() && self.telemetry_error.is_none()
    }

    pub fn reached(&self, state: LifecycleState) -> bool {
        self.states.contains(&state)
    }
}

/// `<dir>/<prefix>_SUMMARY.json`.
pub fn summary_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}_SUMMARY.json"))
}

/// Write `report` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ExoError::Io`] if the file cannot be created and
/// [`ExoError::Telemetry`] if serialisation fails.
pub fn write_summary(path: &Path, report: &SessionReport) -> Result<(), ExoError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .map_err(|e| ExoError::Telemetry(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(cause: TerminationCause) -> SessionReport {
        SessionReport {
            cause,
            iterations: 3,
            last_loop_time: 0.02,
            states: vec![LifecycleState::Starting, LifecycleState::Stopping, LifecycleState::Closed],
            parameter_updates: 0,
            controller_steps: 6,
            limiter_interventions: 0,
            devices: vec![DeviceSummary {
                side: Side::Left,
                writes_sent: 3,
                writes_skipped: 0,
                closed: true,
            }],
            close_failures: Vec::new(),
            telemetry_error: None,
            pacing: CycleStats::default(),
            avg_period: None,
            telemetry_files: vec![PathBuf::from("x_LEFT.csv")],
            vars_to_plot: vec!["ankle_angle".to_string()],
        }
    }

    #[test]
    fn summary_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = summary_path(dir.path(), "20240101_1200_demo");
        assert!(path.ends_with("20240101_1200_demo_SUMMARY.json"));

        write_summary(&path, &report(TerminationCause::Exhaustion)).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["cause"]["cause"], "exhaustion");
        assert_eq!(json["iterations"], 3);
        assert_eq!(json["states"][2], "CLOSED");
        assert_eq!(json["vars_to_plot"][0], "ankle_angle");
    }

    #[test]
    fn fatal_or_failed_close_is_not_clean() {
        assert!(report(TerminationCause::OperatorQuit).is_clean());
        assert!(!report(TerminationCause::Fatal("boom".into())).is_clean());
        let mut r = report(TerminationCause::Exhaustion);
        r.close_failures.push("LEFT: close failed".into());
        assert!(!r.is_clean());
    }
}
