//! [`Session`] – the lifecycle manager.
//!
//! ```text
//! STARTING ─► CALIBRATING ─► ACTIVE ─► STOPPING ─► CLOSED
//!                  │                      ▲
//!                  └──────────────────────┘  calibration failure
//! ```
//!
//! Every path out of `ACTIVE` (quit, replay exhaustion, duration elapsed,
//! interrupt, device/telemetry error, collaborator panic) ends in
//! [`Session::stop`], which closes every device exactly once and flushes
//! telemetry before the session reaches `CLOSED`.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

use exo_hal::{DeviceSet, LoopClock};
use exo_types::{Configuration, ExoError, LifecycleState, Side, TerminationCause};
use tracing::{error, info, info_span, warn};

use crate::pipeline::ControlPipeline;
use crate::recorder::TelemetrySink;
use crate::report::{DeviceSummary, SessionReport, write_summary};
use crate::shared::SharedControl;
use crate::timer::{LoopTimer, PacingMode};

/// Startup choices that are not part of [`Configuration`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub pacing: PacingMode,
    /// Where to write the JSON summary on stop, if anywhere.
    pub summary_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pacing: PacingMode::Realtime,
            summary_path: None,
        }
    }
}

pub struct Session {
    shared: SharedControl,
    devices: DeviceSet,
    clock: LoopClock,
    timer: LoopTimer,
    pipeline: ControlPipeline,
    sink: Box<dyn TelemetrySink>,
    options: SessionOptions,
    states: Vec<LifecycleState>,
    iterations: u64,
    last_loop_time: f64,
    parameter_updates: u64,
}

impl Session {
    /// Enter `STARTING` with the devices, clock and telemetry sink the caller
    /// built, and the estimator/controller pair the configuration selects.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Config`] / [`ExoError::InvalidParameter`] for an
    /// invalid configuration and [`ExoError::DeviceFault`] when a side the
    /// configuration selects has no device.  Devices handed in are released
    /// on drop in that case.
    pub fn new(
        devices: DeviceSet,
        clock: LoopClock,
        shared: SharedControl,
        sink: Box<dyn TelemetrySink>,
        options: SessionOptions,
    ) -> Result<Self, ExoError> {
        let config = shared.config();
        config.validate()?;
        for &side in config.sides.sides() {
            if devices.get(side).is_none() {
                return Err(ExoError::DeviceFault {
                    side,
                    details: "side selected in configuration but no device was provided".to_string(),
                });
            }
        }
        let timer = LoopTimer::new(config.target_freq, options.pacing)?;
        let pipeline = ControlPipeline::new(&config, &devices.sides());
        info!(
            state = %LifecycleState::Starting,
            sides = ?devices.sides(),
            replay = clock.is_replay(),
            target_freq = config.target_freq,
            read_only = config.read_only,
            controller = %config.controller,
            "session starting"
        );
        Ok(Self {
            shared,
            devices,
            clock,
            timer,
            pipeline,
            sink,
            options,
            states: vec![LifecycleState::Starting],
            iterations: 0,
            last_loop_time: 0.0,
            parameter_updates: 0,
        })
    }

    /// Replace the configured estimator/controller lanes.
    pub fn with_pipeline(mut self, pipeline: ControlPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn shared(&self) -> &SharedControl {
        &self.shared
    }

    pub fn state(&self) -> LifecycleState {
        self.states.last().copied().unwrap_or(LifecycleState::Starting)
    }

    /// Battery voltage of every live device that reports one.
    pub fn battery_voltages(&mut self) -> Vec<(Side, f64)> {
        self.devices
            .iter_mut()
            .filter_map(|d| d.battery_voltage().map(|v| (d.side(), v)))
            .collect()
    }

    fn enter(&mut self, state: LifecycleState) {
        info!(from = %self.state(), to = %state, "session state change");
        self.states.push(state);
    }

    /// Run the whole session without an operator gate.
    pub fn run(self) -> SessionReport {
        self.run_gated(|| {})
    }

    /// Calibrate, call `gate` (e.g. wait for the operator), run the loop and
    /// stop.  Always returns with every device closed.
    ///
    /// An interrupt raised while calibrating or inside `gate` stops the
    /// session before it becomes `ACTIVE`.
    pub fn run_gated<G: FnOnce()>(mut self, gate: G) -> SessionReport {
        let cause = match self.calibrate() {
            Ok(()) if self.shared.is_interrupted() => {
                info!("interrupted during calibration; not activating");
                TerminationCause::Interrupted
            }
            Ok(()) => {
                gate();
                if self.shared.is_interrupted() {
                    info!("interrupted before start; not activating");
                    TerminationCause::Interrupted
                } else {
                    self.run_active()
                }
            }
            Err(e) => {
                error!(error = %e, "calibration failed; session will not become active");
                TerminationCause::Fatal(e.to_string())
            }
        };
        self.stop(cause)
    }

    /// `CALIBRATING`: calibrate every device, write the standing angles back
    /// into the shared configuration and hand the result to the pipeline.
    fn calibrate(&mut self) -> Result<(), ExoError> {
        self.enter(LifecycleState::Calibrating);
        let read_only = self.pipeline.config().read_only;
        for device in self.devices.iter_mut() {
            if read_only && device.is_live() {
                warn!(side = %device.side(), "read-only session; standing calibration skipped");
                continue;
            }
            let angle = device.calibrate()?;
            self.shared.set_standing_angle(device.side(), angle);
        }
        self.pipeline.apply_params(&self.shared.config());
        Ok(())
    }

    /// `ACTIVE`: the main loop.  Returns why it ended.
    fn run_active(&mut self) -> TerminationCause {
        self.enter(LifecycleState::Active);
        for device in self.devices.iter_mut() {
            if let Err(e) = device.activate() {
                return TerminationCause::Fatal(e.to_string());
            }
        }
        // Baseline snapshot; it carries the calibrated standing angles.
        let config = self.pipeline.config().clone();
        if let Err(e) = self.sink.snapshot_config(0.0, &config) {
            error!(error = %e, "cannot record initial configuration");
            return TerminationCause::Fatal(e.to_string());
        }

        info!(
            period_ms = self.timer.period().as_secs_f64() * 1e3,
            pacing = ?self.timer.mode(),
            "control loop starting"
        );
        self.clock.restart();
        let span = info_span!("control_loop", replay = self.clock.is_replay());
        let _entered = span.enter();

        loop {
            self.timer.pace();
            let iteration = self.iterations;
            let loop_time = self.clock.loop_time(iteration);

            let checkpoint = self.shared.checkpoint();
            if let Some(config) = checkpoint.update {
                self.pipeline.apply_params(&config);
                self.parameter_updates += 1;
                info!(iteration, loop_time, "parameter update applied");
                if let Err(e) = self.sink.snapshot_config(loop_time, &config) {
                    error!(error = %e, "cannot record configuration snapshot");
                    return TerminationCause::Fatal(e.to_string());
                }
            }
            if let Some(cause) = checkpoint.stop {
                info!(iteration, %cause, "stop requested");
                return cause;
            }

            let pipeline = &mut self.pipeline;
            let devices = &mut self.devices;
            let sink = self.sink.as_mut();
            let result = catch_unwind(AssertUnwindSafe(|| {
                pipeline.run_iteration(iteration, loop_time, devices, sink)
            }));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(iteration, error = %e, "iteration failed");
                    return TerminationCause::Fatal(e.to_string());
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!(iteration, panic = %msg, "pipeline panicked");
                    return TerminationCause::Fatal(format!("pipeline panicked: {msg}"));
                }
            }

            self.iterations += 1;
            self.last_loop_time = loop_time;
            if let Some(cause) = self.clock.end_of_session(self.iterations, loop_time) {
                info!(iterations = self.iterations, %cause, "replay finished");
                return cause;
            }
        }
    }

    /// `STOPPING` then `CLOSED`: release everything, best effort.
    fn stop(mut self, cause: TerminationCause) -> SessionReport {
        self.enter(LifecycleState::Stopping);

        let close_failures: Vec<String> = self
            .devices
            .close_all()
            .into_iter()
            .map(|(side, e)| format!("{side}: {e}"))
            .collect();
        let mut telemetry_error = self.sink.close().err().map(|e| {
            error!(error = %e, "telemetry flush failed");
            e.to_string()
        });

        let devices = self
            .devices
            .iter()
            .map(|d| DeviceSummary {
                side: d.side(),
                writes_sent: d.writes_sent(),
                writes_skipped: d.writes_skipped(),
                closed: d.is_closed(),
            })
            .collect();
        let config: Configuration = self.shared.config();

        let mut report = SessionReport {
            cause,
            iterations: self.iterations,
            last_loop_time: self.last_loop_time,
            states: self.states.clone(),
            parameter_updates: self.parameter_updates,
            controller_steps: self.pipeline.steps(),
            limiter_interventions: self.pipeline.limiter_interventions(),
            devices,
            close_failures,
            telemetry_error: None,
            pacing: self.timer.stats().clone(),
            avg_period: self.timer.stats().avg_period(),
            telemetry_files: self.sink.paths(),
            vars_to_plot: config.vars_to_plot,
        };
        report.states.push(LifecycleState::Closed);

        if let Some(path) = &self.options.summary_path {
            match write_summary(path, &report) {
                Ok(()) => info!(path = %path.display(), "session summary written"),
                Err(e) => {
                    warn!(error = %e, "cannot write session summary");
                    telemetry_error.get_or_insert(e.to_string());
                }
            }
        }
        report.telemetry_error = telemetry_error;

        self.enter(LifecycleState::Closed);
        info!(
            cause = %report.cause,
            iterations = report.iterations,
            overruns = report.pacing.overruns,
            "session closed"
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Lane;
    use crate::recorder::{CsvRecorder, MemoryRecorder};
    use exo_control::{Controller, ZeroTorqueController, build_estimator};
    use exo_hal::{ReplaySet, ReplayTrack, SimDriver, SimProbe};
    use exo_types::{Command, Frame, GaitState, ParamKey};
    use std::f64::consts::TAU;

    /// Controller that runs `hook` with its zero-based call count.
    struct Hook<F>(u64, F);

    impl<F: FnMut(u64) + Send> Controller for Hook<F> {
        fn step(&mut self, _: &GaitState, _: &Frame, _: &Configuration, _: bool) -> Command {
            (self.1)(self.0);
            self.0 += 1;
            Command::Torque(1.0)
        }
        fn update_params(&mut self, _: &Configuration) {}
    }

    fn hooked_pipeline(config: &Configuration, hook: impl FnMut(u64) + Send + 'static) -> ControlPipeline {
        ControlPipeline::with_lanes(
            config,
            vec![
                Lane::new(Side::Left, build_estimator(Side::Left, config), Box::new(Hook(0, hook))),
                Lane::new(
                    Side::Right,
                    build_estimator(Side::Right, config),
                    Box::new(ZeroTorqueController),
                ),
            ],
        )
    }

    fn walking_frames(rows: usize) -> Vec<Frame> {
        (0..rows)
            .map(|i| {
                let t = i as f64 / 100.0;
                Frame {
                    loop_time: t,
                    ankle_angle: 5.0 * (TAU * t / 1.1).sin(),
                    gyro_z: 200.0 * (TAU * t / 1.1).cos(),
                    ..Frame::default()
                }
            })
            .collect()
    }

    fn replay_set(rows: usize) -> ReplaySet {
        let frames = walking_frames(rows);
        ReplaySet::from_tracks(vec![
            ReplayTrack::new(Side::Left, frames.clone(), Some(1.0)),
            ReplayTrack::new(Side::Right, frames, Some(-1.0)),
        ])
        .unwrap()
    }

    fn unpaced() -> SessionOptions {
        SessionOptions {
            pacing: PacingMode::Unpaced,
            summary_path: None,
        }
    }

    fn replay_session(
        rows: usize,
        duration: Option<f64>,
        config: Configuration,
    ) -> (Session, MemoryRecorder) {
        let set = replay_set(rows);
        let clock = LoopClock::replay(set.loop_times(), duration);
        let recorder = MemoryRecorder::new();
        let session = Session::new(
            DeviceSet::replay(set),
            clock,
            SharedControl::new(config),
            Box::new(recorder.clone()),
            unpaced(),
        )
        .unwrap();
        (session, recorder)
    }

    fn live_session(
        left: SimDriver,
        right: SimDriver,
        config: Configuration,
    ) -> (Session, MemoryRecorder, SimProbe, SimProbe) {
        let (pl, pr) = (left.probe(), right.probe());
        let recorder = MemoryRecorder::new();
        let session = Session::new(
            DeviceSet::live(vec![Box::new(left), Box::new(right)]).unwrap(),
            LoopClock::live(),
            SharedControl::new(config),
            Box::new(recorder.clone()),
            unpaced(),
        )
        .unwrap();
        (session, recorder, pl, pr)
    }

    const FULL_PATH: [LifecycleState; 5] = [
        LifecycleState::Starting,
        LifecycleState::Calibrating,
        LifecycleState::Active,
        LifecycleState::Stopping,
        LifecycleState::Closed,
    ];

    #[test]
    fn replay_of_100_rows_runs_exactly_100_iterations() {
        let config = Configuration {
            target_freq: 100.0,
            ..Configuration::default()
        };
        let (session, recorder) = replay_session(100, None, config);
        let report = session.run();

        assert_eq!(report.cause, TerminationCause::Exhaustion);
        assert_eq!(report.iterations, 100);
        assert_eq!(report.states, FULL_PATH);
        assert!(report.is_clean());
        let log = recorder.log();
        assert_eq!(log.records.len(), 200);
        assert_eq!(log.closes, 1);
        assert!(report.devices.iter().all(|d| d.closed));
    }

    #[test]
    fn replay_is_deterministic() {
        let run = || {
            let (session, recorder) = replay_session(300, None, Configuration::default());
            let report = session.run();
            (report.iterations, recorder.log().records)
        };
        let (n1, first) = run();
        let (n2, second) = run();
        assert_eq!(n1, n2);
        assert_eq!(first, second);
        // The spline profile actually produced assistance.
        assert!(first.iter().any(|r| matches!(r.command, Command::Torque(t) if t > 1.0)));
    }

    #[test]
    fn replay_loop_time_comes_from_the_dataset() {
        let (session, recorder) = replay_session(10, None, Configuration::default());
        session.run();
        let times: Vec<f64> = recorder
            .records_for(Side::Left)
            .iter()
            .map(|r| r.frame.loop_time)
            .collect();
        let expected: Vec<f64> = (0..10).map(|i| i as f64 / 100.0).collect();
        assert_eq!(times, expected);
    }

    #[test]
    fn duration_override_stops_replay_early() {
        let (session, recorder) = replay_session(100, Some(0.5), Configuration::default());
        let report = session.run();
        assert_eq!(report.cause, TerminationCause::DurationElapsed);
        // Rows at 0.00 ..= 0.51: the first one past 0.5 is still processed.
        assert_eq!(report.iterations, 52);
        assert_eq!(recorder.records_for(Side::Left).len(), 52);
        assert_eq!(report.states, FULL_PATH);
        assert!(report.devices.iter().all(|d| d.closed));
        assert_eq!(recorder.log().closes, 1);
    }

    #[test]
    fn replay_calibration_is_written_back_and_snapshotted() {
        let (session, recorder) = replay_session(5, None, Configuration::default());
        session.run();
        let log = recorder.log();
        assert_eq!(log.snapshots.len(), 1);
        let (t, config) = &log.snapshots[0];
        assert_eq!(*t, 0.0);
        assert_eq!(config.left_standing_angle, 1.0);
        assert_eq!(config.right_standing_angle, -1.0);
    }

    #[test]
    fn read_only_never_steps_but_logs_every_iteration() {
        let config = Configuration {
            read_only: true,
            ..Configuration::default()
        };
        let (session, recorder) = replay_session(40, None, config.clone());
        let session = session.with_pipeline(hooked_pipeline(&config, |_| {
            panic!("controller stepped in read-only mode")
        }));
        let report = session.run();
        assert_eq!(report.cause, TerminationCause::Exhaustion);
        assert_eq!(report.controller_steps, 0);
        assert_eq!(recorder.records_for(Side::Left).len() as u64, report.iterations);
        assert_eq!(recorder.records_for(Side::Right).len() as u64, report.iterations);
        assert!(recorder.log().records.iter().all(|r| r.command == Command::Idle));
    }

    #[test]
    fn read_only_live_session_skips_calibration() {
        let config = Configuration {
            read_only: true,
            ..Configuration::default()
        };
        let (session, _, pl, pr) =
            live_session(SimDriver::new(Side::Left), SimDriver::new(Side::Right), config);
        session.shared().request_quit();
        let report = session.run();
        assert_eq!(pl.calibrations() + pr.calibrations(), 0);
        assert_eq!(report.cause, TerminationCause::OperatorQuit);
        assert!(report.reached(LifecycleState::Active));
    }

    #[test]
    fn operator_quit_stops_at_next_checkpoint() {
        let config = Configuration::default();
        let (session, recorder, pl, pr) =
            live_session(SimDriver::new(Side::Left), SimDriver::new(Side::Right), config.clone());
        let shared = session.shared().clone();
        let session = session.with_pipeline(hooked_pipeline(&config, move |n| {
            if n == 9 {
                shared.request_quit();
            }
        }));
        let report = session.run();
        assert_eq!(report.cause, TerminationCause::OperatorQuit);
        assert_eq!(report.iterations, 10);
        assert_eq!(recorder.records_for(Side::Left).len(), 10);
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
    }

    #[test]
    fn interrupt_reaches_stopping_and_closes_devices() {
        let config = Configuration::default();
        let (session, _, pl, pr) =
            live_session(SimDriver::new(Side::Left), SimDriver::new(Side::Right), config.clone());
        let shared = session.shared().clone();
        let session = session.with_pipeline(hooked_pipeline(&config, move |n| {
            if n == 4 {
                shared.interrupt();
            }
        }));
        let report = session.run();
        assert_eq!(report.cause, TerminationCause::Interrupted);
        assert_eq!(report.states, FULL_PATH);
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
    }

    #[test]
    fn interrupt_before_start_never_activates() {
        let (session, recorder, pl, pr) = live_session(
            SimDriver::new(Side::Left),
            SimDriver::new(Side::Right),
            Configuration::default(),
        );
        session.shared().interrupt();

        let mut gate_called = false;
        let report = session.run_gated(|| gate_called = true);

        assert!(!gate_called);
        assert_eq!(report.cause, TerminationCause::Interrupted);
        assert!(!report.reached(LifecycleState::Active));
        assert_eq!(report.iterations, 0);
        assert!(pl.writes().is_empty() && pr.writes().is_empty());
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
        assert!(report.devices.iter().all(|d| d.closed));
        assert_eq!(recorder.log().closes, 1);
    }

    #[test]
    fn interrupt_while_gated_never_activates() {
        let (session, _, pl, pr) = live_session(
            SimDriver::new(Side::Left),
            SimDriver::new(Side::Right),
            Configuration::default(),
        );
        let shared = session.shared().clone();
        let report = session.run_gated(move || shared.interrupt());

        assert_eq!(report.cause, TerminationCause::Interrupted);
        assert_eq!(
            report.states,
            vec![
                LifecycleState::Starting,
                LifecycleState::Calibrating,
                LifecycleState::Stopping,
                LifecycleState::Closed
            ]
        );
        assert!(pl.writes().is_empty() && pr.writes().is_empty());
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
    }

    #[test]
    fn read_failure_is_fatal_and_still_closes_everything() {
        let (session, recorder, pl, pr) = live_session(
            SimDriver::new(Side::Left),
            SimDriver::new(Side::Right).fail_read_at(7),
            Configuration::default(),
        );
        let report = session.run();
        assert!(matches!(report.cause, TerminationCause::Fatal(ref m) if m.contains("RIGHT")));
        assert_eq!(report.iterations, 7);
        assert_eq!(recorder.records_for(Side::Left).len(), 7);
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
        assert_eq!(recorder.log().closes, 1);
    }

    #[test]
    fn collaborator_panic_is_contained() {
        let config = Configuration::default();
        let (session, _, pl, pr) =
            live_session(SimDriver::new(Side::Left), SimDriver::new(Side::Right), config.clone());
        let session = session.with_pipeline(hooked_pipeline(&config, |n| {
            if n == 3 {
                panic!("estimator exploded");
            }
        }));
        let report = session.run();
        assert!(matches!(report.cause, TerminationCause::Fatal(ref m) if m.contains("estimator exploded")));
        assert_eq!(report.iterations, 3);
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
    }

    #[test]
    fn one_failing_close_does_not_block_the_other() {
        let (session, _, pl, pr) = live_session(
            SimDriver::new(Side::Left).fail_close(),
            SimDriver::new(Side::Right),
            Configuration::default(),
        );
        session.shared().request_quit();
        let report = session.run();
        assert_eq!(report.close_failures.len(), 1);
        assert!(report.close_failures[0].starts_with("LEFT"));
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
        assert!(!report.is_clean());
    }

    #[test]
    fn calibration_failure_never_becomes_active() {
        let dir = tempfile::tempdir().unwrap();
        let left = SimDriver::new(Side::Left).fail_calibration();
        let right = SimDriver::new(Side::Right);
        let (pl, pr) = (left.probe(), right.probe());
        let sink = CsvRecorder::create(dir.path(), "calfail", &Side::ALL).unwrap();
        let session = Session::new(
            DeviceSet::live(vec![Box::new(left), Box::new(right)]).unwrap(),
            LoopClock::live(),
            SharedControl::new(Configuration::default()),
            Box::new(sink),
            unpaced(),
        )
        .unwrap();

        let mut gate_called = false;
        let report = session.run_gated(|| gate_called = true);

        assert!(!gate_called);
        assert!(matches!(report.cause, TerminationCause::Fatal(_)));
        assert_eq!(
            report.states,
            vec![
                LifecycleState::Starting,
                LifecycleState::Calibrating,
                LifecycleState::Stopping,
                LifecycleState::Closed
            ]
        );
        assert!(!report.reached(LifecycleState::Active));
        assert_eq!((pl.closes(), pr.closes()), (1, 1));
        for name in ["calfail_LEFT.csv", "calfail_RIGHT.csv", "calfail_CONFIG.csv"] {
            let body = std::fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(body.lines().count(), 1, "{name} should hold only its header");
        }
    }

    #[test]
    fn missing_replay_calibration_is_fatal_startup() {
        let frames = walking_frames(5);
        let set = ReplaySet::from_tracks(vec![
            ReplayTrack::new(Side::Left, frames.clone(), None),
            ReplayTrack::new(Side::Right, frames, Some(0.0)),
        ])
        .unwrap();
        let clock = LoopClock::replay(set.loop_times(), None);
        let session = Session::new(
            DeviceSet::replay(set),
            clock,
            SharedControl::new(Configuration::default()),
            Box::new(MemoryRecorder::new()),
            unpaced(),
        )
        .unwrap();
        let report = session.run();
        assert!(!report.reached(LifecycleState::Active));
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn parameter_update_is_applied_and_snapshotted() {
        let config = Configuration::default();
        let (session, recorder, _, _) = live_session(
            SimDriver::new(Side::Left).with_standing_angle(3.0),
            SimDriver::new(Side::Right),
            config.clone(),
        );
        let shared = session.shared().clone();
        let session = session.with_pipeline(hooked_pipeline(&config, move |n| match n {
            5 => {
                shared.apply_updates(&[(ParamKey::PeakTorque, 5.0)]).unwrap();
            }
            20 => shared.request_quit(),
            _ => {}
        }));
        let report = session.run();
        assert_eq!(report.parameter_updates, 1);
        let log = recorder.log();
        assert_eq!(log.snapshots.len(), 2);
        assert_eq!(log.snapshots[0].1.left_standing_angle, 3.0);
        assert!(log.snapshots[1].0 >= log.snapshots[0].0);
        assert_eq!(log.snapshots[1].1.control_params.peak_torque, 5.0);
        // The update keeps the calibrated angle.
        assert_eq!(log.snapshots[1].1.left_standing_angle, 3.0);
    }

    #[test]
    fn summary_is_written_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_SUMMARY.json");
        let set = replay_set(20);
        let clock = LoopClock::replay(set.loop_times(), None);
        let session = Session::new(
            DeviceSet::replay(set),
            clock,
            SharedControl::new(Configuration::default()),
            Box::new(MemoryRecorder::new()),
            SessionOptions {
                pacing: PacingMode::Unpaced,
                summary_path: Some(path.clone()),
            },
        )
        .unwrap();
        let report = session.run();
        assert!(report.telemetry_error.is_none());
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["iterations"], 20);
    }

    #[test]
    fn missing_device_for_selected_side_is_rejected() {
        let set = ReplaySet::from_tracks(vec![ReplayTrack::new(Side::Left, walking_frames(3), Some(0.0))])
            .unwrap();
        let clock = LoopClock::replay(set.loop_times(), None);
        let err = Session::new(
            DeviceSet::replay(set),
            clock,
            SharedControl::new(Configuration::default()),
            Box::new(MemoryRecorder::new()),
            unpaced(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ExoError::DeviceFault { side: Side::Right, .. }));
    }

    #[test]
    fn battery_is_reported_for_live_devices_only() {
        let (mut live, _, _, _) = live_session(
            SimDriver::new(Side::Left),
            SimDriver::new(Side::Right),
            Configuration::default(),
        );
        assert_eq!(live.battery_voltages().len(), 2);
        let (mut replay, _) = replay_session(3, None, Configuration::default());
        assert!(replay.battery_voltages().is_empty());
    }
}
