//! Simulated live driver for bench runs and CI without a physical device.
//!
//! [`SimDriver`] synthesises a steady walking pattern (ankle angle, shank
//! gyro and motor current) from an internal sample counter, so its output is
//! fully deterministic.  Every driver hands out a [`SimProbe`] that tests can
//! keep after the driver itself has been moved into a device handle, to
//! assert on issued commands, close counts and so on.
//!
//! Failures can be injected per driver to exercise the session's fatal
//! paths:
//!
//! ```rust
//! use exo_hal::driver::DeviceDriver;
//! use exo_hal::sim::SimDriver;
//! use exo_types::Side;
//!
//! let mut driver = SimDriver::new(Side::Left).fail_read_at(2);
//! let probe = driver.probe();
//!
//! driver.connect().unwrap();
//! assert!(driver.read().is_ok());
//! assert!(driver.read().is_ok());
//! assert!(driver.read().is_err()); // third read (index 2) fails
//! assert_eq!(probe.reads(), 3);
//! ```

use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};

use exo_types::{Command, ExoError, Frame, Side};

use crate::driver::DeviceDriver;

/// Newton-metres per ampere used to fake a motor-current reading.
const TORQUE_CONSTANT: f64 = 0.14;

// ────────────────────────────────────────────────────────────────────────────
// Probe
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimLog {
    connects: u32,
    reads: u64,
    writes: Vec<Command>,
    calibrations: u32,
    closes: u32,
}

/// Shared view into what a [`SimDriver`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    log: Arc<Mutex<SimLog>>,
}

impl SimProbe {
    fn lock(&self) -> MutexGuard<'_, SimLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of successful or failed `connect` calls.
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Number of `read` calls, including the one that failed.
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    /// Every command that reached the transport, in order.
    pub fn writes(&self) -> Vec<Command> {
        self.lock().writes.clone()
    }

    pub fn calibrations(&self) -> u32 {
        self.lock().calibrations
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> u32 {
        self.lock().closes
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Driver
// ────────────────────────────────────────────────────────────────────────────

/// A simulated exoskeleton side.
pub struct SimDriver {
    side: Side,
    sample_period: f64,
    stride_period: f64,
    standing_angle: f64,
    sample: u64,
    last_torque: f64,
    connected: bool,
    fail_read_at: Option<u64>,
    fail_calibration: bool,
    fail_close: bool,
    probe: SimProbe,
}

impl SimDriver {
    /// A healthy simulated side sampled at 200 Hz, walking with a 1.1 s stride.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            sample_period: 1.0 / 200.0,
            stride_period: 1.1,
            standing_angle: 0.0,
            sample: 0,
            last_torque: 0.0,
            connected: false,
            fail_read_at: None,
            fail_calibration: false,
            fail_close: false,
            probe: SimProbe::default(),
        }
    }

    /// Nominal sample rate used to advance the synthetic gait.
    pub fn with_sample_rate(mut self, hz: f64) -> Self {
        if hz > 0.0 {
            self.sample_period = 1.0 / hz;
        }
        self
    }

    pub fn with_stride_period(mut self, seconds: f64) -> Self {
        self.stride_period = seconds;
        self
    }

    /// Angle reported by the standing calibration routine.
    pub fn with_standing_angle(mut self, degrees: f64) -> Self {
        self.standing_angle = degrees;
        self
    }

    /// Make the read with zero-based index `index` fail.
    pub fn fail_read_at(mut self, index: u64) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    pub fn fail_calibration(mut self) -> Self {
        self.fail_calibration = true;
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Handle for inspecting this driver after it has been moved away.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    fn fault(&self, details: impl Into<String>) -> ExoError {
        ExoError::DeviceFault {
            side: self.side,
            details: details.into(),
        }
    }

    fn synthesize(&self) -> Frame {
        let t = self.sample as f64 * self.sample_period;
        let phase = (t / self.stride_period).fract();
        let swing = (TAU * phase).sin();
        Frame {
            loop_time: 0.0,
            ankle_angle: self.standing_angle + 12.0 * swing,
            ankle_velocity: 12.0 * TAU / self.stride_period * (TAU * phase).cos(),
            motor_angle: 40.0 * swing,
            motor_velocity: 40.0 * TAU / self.stride_period * (TAU * phase).cos(),
            motor_current: self.last_torque / TORQUE_CONSTANT * 1000.0,
            accel_x: 0.1 * swing,
            accel_y: -1.0,
            accel_z: 0.05,
            gyro_x: 0.0,
            gyro_y: 0.0,
            // Peaks once per stride, crossing typical heel-strike thresholds.
            gyro_z: 200.0 * (TAU * phase).cos(),
        }
    }
}

impl DeviceDriver for SimDriver {
    fn side(&self) -> Side {
        self.side
    }

    fn connect(&mut self) -> Result<(), ExoError> {
        self.probe.lock().connects += 1;
        self.connected = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, ExoError> {
        let index = {
            let mut log = self.probe.lock();
            log.reads += 1;
            log.reads - 1
        };
        if !self.connected {
            return Err(self.fault("read before connect"));
        }
        if self.fail_read_at == Some(index) {
            return Err(self.fault(format!("simulated read failure at sample {index}")));
        }
        let frame = self.synthesize();
        self.sample += 1;
        Ok(frame)
    }

    fn write(&mut self, command: &Command) -> Result<(), ExoError> {
        if !self.connected {
            return Err(self.fault("write before connect"));
        }
        if let Command::Torque(nm) = *command {
            self.last_torque = nm;
        } else {
            self.last_torque = 0.0;
        }
        self.probe.lock().writes.push(*command);
        Ok(())
    }

    fn calibrate(&mut self) -> Result<f64, ExoError> {
        self.probe.lock().calibrations += 1;
        if self.fail_calibration {
            return Err(ExoError::Calibration {
                side: self.side,
                details: "simulated calibration failure".to_string(),
            });
        }
        Ok(self.standing_angle)
    }

    fn close(&mut self) -> Result<(), ExoError> {
        self.probe.lock().closes += 1;
        self.connected = false;
        if self.fail_close {
            return Err(self.fault("simulated close failure"));
        }
        Ok(())
    }

    fn battery_voltage(&mut self) -> Option<f64> {
        Some(24.6)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_requires_connect() {
        let mut driver = SimDriver::new(Side::Right);
        assert!(driver.read().is_err());
        driver.connect().unwrap();
        assert!(driver.read().is_ok());
    }

    #[test]
    fn output_is_deterministic() {
        let mut a = SimDriver::new(Side::Left);
        let mut b = SimDriver::new(Side::Left);
        a.connect().unwrap();
        b.connect().unwrap();
        for _ in 0..50 {
            assert_eq!(a.read().unwrap(), b.read().unwrap());
        }
    }

    #[test]
    fn gyro_crosses_heel_strike_threshold_each_stride() {
        let mut driver = SimDriver::new(Side::Left).with_sample_rate(100.0);
        driver.connect().unwrap();
        let mut rising_edges = 0;
        let mut above = false;
        // Two seconds at 100 Hz with a 1.1 s stride: two crossings.
        for _ in 0..200 {
            let g = driver.read().unwrap().gyro_z;
            if g > 100.0 && !above {
                rising_edges += 1;
            }
            above = g > 100.0;
        }
        // The first sample starts above threshold, so it counts as an edge.
        assert_eq!(rising_edges, 2);
    }

    #[test]
    fn probe_records_writes_and_closes() {
        let mut driver = SimDriver::new(Side::Left);
        let probe = driver.probe();
        driver.connect().unwrap();
        driver.write(&Command::Torque(3.0)).unwrap();
        driver.write(&Command::Idle).unwrap();
        driver.close().unwrap();
        assert_eq!(probe.writes(), vec![Command::Torque(3.0), Command::Idle]);
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.connects(), 1);
    }

    #[test]
    fn motor_current_follows_torque_command() {
        let mut driver = SimDriver::new(Side::Left);
        driver.connect().unwrap();
        driver.write(&Command::Torque(1.4)).unwrap();
        let frame = driver.read().unwrap();
        assert!((frame.motor_current - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let mut driver = SimDriver::new(Side::Right).fail_calibration().fail_close();
        let probe = driver.probe();
        assert!(matches!(driver.calibrate(), Err(ExoError::Calibration { .. })));
        assert!(matches!(driver.close(), Err(ExoError::DeviceFault { .. })));
        assert_eq!(probe.calibrations(), 1);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn calibration_reports_standing_angle() {
        let mut driver = SimDriver::new(Side::Left).with_standing_angle(-4.0);
        assert_eq!(driver.calibrate().unwrap(), -4.0);
    }
}
