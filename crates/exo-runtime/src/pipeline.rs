//! [`ControlPipeline`] – the fixed per-iteration sequence.
//!
//! Each stage runs for every side before the next stage starts:
//!
//! 1. read a frame from every device;
//! 2. run every estimator on its side's fresh frame;
//! 3. step every controller and pass its output through the
//!    [`CommandLimiter`] (skipped in read-only mode, where the command is
//!    [`Command::Idle`]);
//! 4. write every command;
//! 5. append one telemetry record per side.
//!
//! A side's stages only ever see the frame read in stage 1 of the same
//! iteration.  Any error aborts the iteration and is returned to the
//! lifecycle manager, which treats it as fatal.

use exo_control::{CommandLimiter, Controller, GaitStateEstimator, build_controller, build_estimator};
use exo_hal::DeviceSet;
use exo_types::{Command, Configuration, ExoError, Frame, GaitState, Side};
use tracing::{debug, trace};

use crate::recorder::{TelemetryRecord, TelemetrySink};

/// Estimator and controller bound to one side.
pub struct Lane {
    side: Side,
    estimator: Box<dyn GaitStateEstimator>,
    controller: Box<dyn Controller>,
}

impl Lane {
    pub fn new(
        side: Side,
        estimator: Box<dyn GaitStateEstimator>,
        controller: Box<dyn Controller>,
    ) -> Self {
        Self {
            side,
            estimator,
            controller,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

pub struct ControlPipeline {
    lanes: Vec<Lane>,
    limiter: CommandLimiter,
    config: Configuration,
    steps: u64,
}

impl ControlPipeline {
    /// Pipeline with the estimator and controller `config` selects, one lane
    /// per side.
    pub fn new(config: &Configuration, sides: &[Side]) -> Self {
        let lanes = sides
            .iter()
            .map(|&side| {
                Lane::new(
                    side,
                    build_estimator(side, config),
                    build_controller(side, config),
                )
            })
            .collect();
        Self::with_lanes(config, lanes)
    }

    /// Pipeline over caller-supplied lanes.
    pub fn with_lanes(config: &Configuration, mut lanes: Vec<Lane>) -> Self {
        lanes.sort_by_key(Lane::side);
        Self {
            lanes,
            limiter: CommandLimiter::for_config(config),
            config: config.clone(),
            steps: 0,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn sides(&self) -> Vec<Side> {
        self.lanes.iter().map(Lane::side).collect()
    }

    /// Number of controller `step` calls so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn limiter_interventions(&self) -> u64 {
        self.limiter.interventions()
    }

    /// Install `config` and propagate it to every collaborator.
    pub fn apply_params(&mut self, config: &Configuration) {
        for lane in &mut self.lanes {
            lane.estimator.update_params(config);
            lane.controller.update_params(config);
        }
        self.limiter.update_params(config);
        self.config = config.clone();
        debug!("parameters propagated to estimators and controllers");
    }

    /// Run one full iteration.
    ///
    /// # Errors
    ///
    /// Propagates the first device or telemetry failure; the remaining
    /// stages of the iteration are not run.
    pub fn run_iteration(
        &mut self,
        iteration: u64,
        loop_time: f64,
        devices: &mut DeviceSet,
        sink: &mut dyn TelemetrySink,
    ) -> Result<(), ExoError> {
        let read_only = self.config.read_only;
        let only_if_changed = self.config.only_write_if_new();

        let mut frames: Vec<Frame> = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            let device = devices.get_mut(lane.side).ok_or_else(|| missing(lane.side))?;
            frames.push(*device.read(iteration, loop_time)?);
        }

        let states: Vec<GaitState> = self
            .lanes
            .iter_mut()
            .zip(&frames)
            .map(|(lane, frame)| lane.estimator.detect(frame))
            .collect();

        let commands: Vec<Command> = if read_only {
            vec![Command::Idle; self.lanes.len()]
        } else {
            let mut commands = Vec::with_capacity(self.lanes.len());
            for ((lane, frame), state) in self.lanes.iter_mut().zip(&frames).zip(&states) {
                let raw = lane.controller.step(state, frame, &self.config, false);
                self.steps += 1;
                commands.push(self.limiter.enforce(lane.side, raw));
            }
            commands
        };

        let mut sent = Vec::with_capacity(self.lanes.len());
        for (lane, command) in self.lanes.iter().zip(&commands) {
            let device = devices.get_mut(lane.side).ok_or_else(|| missing(lane.side))?;
            sent.push(device.write(*command, only_if_changed)?);
        }

        for (i, lane) in self.lanes.iter().enumerate() {
            sink.append(&TelemetryRecord {
                iteration,
                side: lane.side,
                frame: frames[i],
                state: states[i],
                command: commands[i],
                sent: sent[i],
            })?;
        }
        trace!(iteration, loop_time, "iteration complete");
        Ok(())
    }
}

fn missing(side: Side) -> ExoError {
    ExoError::DeviceFault {
        side,
        details: "no device bound to this side".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryRecorder;
    use exo_hal::{ReplaySet, ReplayTrack, SimDriver};
    use exo_types::ControllerKind;
    use std::sync::{Arc, Mutex};

    /// Records every call in order so stage ordering can be asserted.
    struct Tracer {
        side: Side,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl GaitStateEstimator for Tracer {
        fn detect(&mut self, frame: &Frame) -> GaitState {
            self.events
                .lock()
                .unwrap()
                .push(format!("detect {} {}", self.side, frame.ankle_angle));
            GaitState::default()
        }
        fn update_params(&mut self, _: &Configuration) {
            self.events.lock().unwrap().push(format!("est params {}", self.side));
        }
    }

    impl Controller for Tracer {
        fn step(&mut self, _: &GaitState, frame: &Frame, _: &Configuration, _: bool) -> Command {
            self.events
                .lock()
                .unwrap()
                .push(format!("step {} {}", self.side, frame.ankle_angle));
            Command::Torque(frame.ankle_angle)
        }
        fn update_params(&mut self, _: &Configuration) {
            self.events.lock().unwrap().push(format!("ctl params {}", self.side));
        }
    }

    fn tracing_lane(side: Side, events: &Arc<Mutex<Vec<String>>>) -> Lane {
        Lane::new(
            side,
            Box::new(Tracer { side, events: events.clone() }),
            Box::new(Tracer { side, events: events.clone() }),
        )
    }

    fn replay_devices(rows: usize) -> DeviceSet {
        let frames: Vec<Frame> = (0..rows)
            .map(|i| Frame {
                loop_time: i as f64 * 0.01,
                ankle_angle: i as f64,
                ..Frame::default()
            })
            .collect();
        DeviceSet::replay(
            ReplaySet::from_tracks(vec![
                ReplayTrack::new(Side::Left, frames.clone(), Some(0.0)),
                ReplayTrack::new(Side::Right, frames, Some(0.0)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn stages_run_across_all_sides_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = Configuration::default();
        let mut pipeline = ControlPipeline::with_lanes(
            &config,
            vec![tracing_lane(Side::Right, &events), tracing_lane(Side::Left, &events)],
        );
        let mut devices = replay_devices(3);
        let mut sink = MemoryRecorder::new();
        pipeline.run_iteration(2, 0.02, &mut devices, &mut sink).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["detect LEFT 2", "detect RIGHT 2", "step LEFT 2", "step RIGHT 2"]
        );
        let log = sink.log();
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[0].command, Command::Torque(2.0));
        assert_eq!(log.records[0].frame.ankle_angle, 2.0);
    }

    #[test]
    fn read_only_skips_step_but_still_writes_and_logs() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = Configuration {
            read_only: true,
            ..Configuration::default()
        };
        let mut pipeline = ControlPipeline::with_lanes(&config, vec![tracing_lane(Side::Left, &events)]);
        let driver = SimDriver::new(Side::Left);
        let probe = driver.probe();
        let mut devices = DeviceSet::live(vec![Box::new(driver)]).unwrap();
        let mut sink = MemoryRecorder::new();

        for i in 0..5 {
            pipeline.run_iteration(i, i as f64 * 0.005, &mut devices, &mut sink).unwrap();
        }
        assert_eq!(pipeline.steps(), 0);
        assert!(events.lock().unwrap().iter().all(|e| !e.starts_with("step")));
        assert_eq!(sink.log().records.len(), 5);
        // No suppression in read-only mode: every idle command is written.
        assert_eq!(probe.writes(), vec![Command::Idle; 5]);
    }

    #[test]
    fn unchanged_commands_are_suppressed_but_still_logged() {
        let mut config = Configuration::default();
        config.controller = ControllerKind::ZeroTorque;
        let mut pipeline = ControlPipeline::new(&config, &[Side::Left]);
        let driver = SimDriver::new(Side::Left);
        let probe = driver.probe();
        let mut devices = DeviceSet::live(vec![Box::new(driver)]).unwrap();
        let mut sink = MemoryRecorder::new();
        for i in 0..4 {
            pipeline.run_iteration(i, 0.0, &mut devices, &mut sink).unwrap();
        }
        assert_eq!(probe.writes().len(), 1);
        let records = sink.log().records;
        assert_eq!(records.len(), 4);
        assert_eq!(records.iter().filter(|r| r.sent).count(), 1);
        assert_eq!(
            records.iter().map(|r| r.iteration).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn read_failure_aborts_before_any_step() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = Configuration::default();
        let mut pipeline = ControlPipeline::with_lanes(
            &config,
            vec![tracing_lane(Side::Left, &events), tracing_lane(Side::Right, &events)],
        );
        let left = SimDriver::new(Side::Left);
        let right = SimDriver::new(Side::Right).fail_read_at(0);
        let mut devices = DeviceSet::live(vec![Box::new(left), Box::new(right)]).unwrap();
        let mut sink = MemoryRecorder::new();

        let err = pipeline.run_iteration(0, 0.0, &mut devices, &mut sink).unwrap_err();
        assert!(matches!(err, ExoError::DeviceFault { side: Side::Right, .. }));
        assert!(events.lock().unwrap().is_empty());
        assert!(sink.log().records.is_empty());
    }

    #[test]
    fn limiter_clamps_controller_output() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut config = Configuration::default();
        config.control_params.max_torque = 20.0;
        config.control_params.peak_torque = 10.0;
        let mut pipeline = ControlPipeline::with_lanes(&config, vec![tracing_lane(Side::Left, &events)]);
        let frames = vec![Frame { ankle_angle: 50.0, ..Frame::default() }];
        let mut devices = DeviceSet::replay(
            ReplaySet::from_tracks(vec![ReplayTrack::new(Side::Left, frames, None)]).unwrap(),
        );
        let mut sink = MemoryRecorder::new();
        pipeline.run_iteration(0, 0.0, &mut devices, &mut sink).unwrap();
        assert_eq!(sink.log().records[0].command, Command::Torque(20.0));
        assert_eq!(pipeline.limiter_interventions(), 1);
    }

    #[test]
    fn apply_params_reaches_every_collaborator() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let config = Configuration::default();
        let mut pipeline = ControlPipeline::with_lanes(
            &config,
            vec![tracing_lane(Side::Left, &events), tracing_lane(Side::Right, &events)],
        );
        let mut next = config.clone();
        next.control_params.hold_kp = 2.0;
        pipeline.apply_params(&next);
        assert_eq!(pipeline.config().control_params.hold_kp, 2.0);
        assert_eq!(events.lock().unwrap().len(), 4);
    }
}
