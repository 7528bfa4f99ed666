//! Frame sources and the session clock.
//!
//! A [`DataSource`] is the connection behind one device handle: either a
//! live [`DeviceDriver`] or a recorded [`ReplayTrack`].  Both variants answer
//! the same `next_frame(side, iteration_index, loop_time)` call, so the
//! control pipeline cannot tell them apart.
//!
//! The [`LoopClock`] supplies `loop_time` for each iteration and decides when
//! a replay session has run out of data.  Live sessions never end on their
//! own.

use std::time::Instant;

use exo_types::{Command, ExoError, Frame, Side, TerminationCause};

use crate::driver::DeviceDriver;
use crate::replay::ReplayTrack;

// ────────────────────────────────────────────────────────────────────────────
// DataSource
// ────────────────────────────────────────────────────────────────────────────

/// Connection behind one device: live transport or recorded track.
pub enum DataSource {
    Live(Box<dyn DeviceDriver>),
    Replay(ReplayTrack),
}

impl DataSource {
    pub fn is_live(&self) -> bool {
        matches!(self, DataSource::Live(_))
    }

    /// Produce the frame for `iteration_index`.
    ///
    /// Live sources read the transport and stamp the frame with `loop_time`.
    /// Replay sources return the recorded row verbatim, including its own
    /// recorded `loop_time`; the argument is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] when the transport fails or the
    /// replay track has no row at `iteration_index`.
    pub fn next_frame(
        &mut self,
        side: Side,
        iteration_index: u64,
        loop_time: f64,
    ) -> Result<Frame, ExoError> {
        match self {
            DataSource::Live(driver) => {
                let mut frame = driver.read()?;
                frame.loop_time = loop_time;
                Ok(frame)
            }
            DataSource::Replay(track) => usize::try_from(iteration_index)
                .ok()
                .and_then(|i| track.frame(i))
                .copied()
                .ok_or_else(|| ExoError::DeviceFault {
                    side,
                    details: format!(
                        "replay track has {} rows, no row {iteration_index}",
                        track.len()
                    ),
                }),
        }
    }

    /// Standing calibration: interactive on live hardware, recovered from the
    /// calibration record on replay.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Calibration`] when the driver fails or the replay
    /// dataset carries no standing angle for `side`.
    pub fn calibrate(&mut self, side: Side) -> Result<f64, ExoError> {
        match self {
            DataSource::Live(driver) => driver.calibrate(),
            DataSource::Replay(track) => {
                track.standing_angle().ok_or_else(|| ExoError::Calibration {
                    side,
                    details: "calibration record has no standing angle for this side".to_string(),
                })
            }
        }
    }

    /// Forward a command to the actuator.  Replay has nothing to actuate.
    ///
    /// # Errors
    ///
    /// Propagates driver write failures.
    pub fn write(&mut self, command: &Command) -> Result<(), ExoError> {
        match self {
            DataSource::Live(driver) => driver.write(command),
            DataSource::Replay(_) => Ok(()),
        }
    }

    /// Release the underlying transport.
    ///
    /// # Errors
    ///
    /// Propagates driver close failures.
    pub fn close(&mut self) -> Result<(), ExoError> {
        match self {
            DataSource::Live(driver) => driver.close(),
            DataSource::Replay(_) => Ok(()),
        }
    }

    pub fn battery_voltage(&mut self) -> Option<f64> {
        match self {
            DataSource::Live(driver) => driver.battery_voltage(),
            DataSource::Replay(_) => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LoopClock
// ────────────────────────────────────────────────────────────────────────────

/// Source of `loop_time` and of the replay end-of-session signal.
#[derive(Debug, Clone)]
pub enum LoopClock {
    /// Monotonic time since the loop became active.
    Live { started: Instant },
    /// Recorded timestamps, optionally cut short by a test duration.
    Replay {
        loop_times: Vec<f64>,
        duration: Option<f64>,
    },
}

impl LoopClock {
    pub fn live() -> Self {
        LoopClock::Live {
            started: Instant::now(),
        }
    }

    pub fn replay(loop_times: Vec<f64>, duration: Option<f64>) -> Self {
        LoopClock::Replay {
            loop_times,
            duration,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, LoopClock::Replay { .. })
    }

    /// Re-zero a live clock.  Called once when the loop becomes active so
    /// calibration time does not count as loop time.
    pub fn restart(&mut self) {
        if let LoopClock::Live { started } = self {
            *started = Instant::now();
        }
    }

    /// `loop_time` for iteration `iteration_index`.
    pub fn loop_time(&self, iteration_index: u64) -> f64 {
        match self {
            LoopClock::Live { started } => started.elapsed().as_secs_f64(),
            LoopClock::Replay { loop_times, .. } => usize::try_from(iteration_index)
                .ok()
                .and_then(|i| loop_times.get(i))
                .or_else(|| loop_times.last())
                .copied()
                .unwrap_or(0.0),
        }
    }

    /// Checked after every completed iteration.
    ///
    /// With a duration override the session ends once `last_loop_time`
    /// exceeds it; independently, it ends when every recorded row has been
    /// consumed.  Live clocks always return `None`.
    pub fn end_of_session(
        &self,
        completed_iterations: u64,
        last_loop_time: f64,
    ) -> Option<TerminationCause> {
        match self {
            LoopClock::Live { .. } => None,
            LoopClock::Replay {
                loop_times,
                duration,
            } => {
                if let Some(limit) = duration
                    && last_loop_time > *limit
                {
                    return Some(TerminationCause::DurationElapsed);
                }
                if completed_iterations >= loop_times.len() as u64 {
                    return Some(TerminationCause::Exhaustion);
                }
                None
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
