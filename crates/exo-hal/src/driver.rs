//! `DeviceDriver` trait – the transport to one physically connected side.
//!
//! Vendor drivers implement this trait; the rest of the stack only ever
//! talks to it through a [`DataSource::Live`][crate::source::DataSource]
//! owned by a [`DeviceHandle`][crate::device::DeviceHandle], so a driver can
//! be swapped without touching estimation or control code.

use exo_types::{Command, ExoError, Frame, Side};

/// Transport to one actuated side of a live device.
///
/// Every method is called from the control-loop thread only.
pub trait DeviceDriver: Send {
    /// The side this driver is wired to.
    fn side(&self) -> Side;

    /// Open the transport and start streaming.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] if the device cannot be reached.
    fn connect(&mut self) -> Result<(), ExoError>;

    /// Read the most recent sensor sample.
    ///
    /// The returned frame's `loop_time` is overwritten by the caller with the
    /// session clock, so drivers may leave it at `0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] on any transport failure.  The
    /// session treats this as fatal.
    fn read(&mut self) -> Result<Frame, ExoError>;

    /// Send `command` to the actuator.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] if the command cannot be applied.
    fn write(&mut self, command: &Command) -> Result<(), ExoError>;

    /// Run the standing calibration routine and return the measured
    /// standing ankle angle [deg].
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Calibration`] when no stable reading is obtained.
    fn calibrate(&mut self) -> Result<f64, ExoError>;

    /// Stop streaming, release the motor and flush pending writes.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] if the transport reports a failure
    /// while shutting down.
    fn close(&mut self) -> Result<(), ExoError>;

    /// Battery voltage [V], when the hardware reports it.
    fn battery_voltage(&mut self) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal driver that only counts reads; used to check trait defaults.
    struct CountingDriver {
        reads: u32,
    }

    impl DeviceDriver for CountingDriver {
        fn side(&self) -> Side {
            Side::Left
        }

        fn connect(&mut self) -> Result<(), ExoError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, ExoError> {
            self.reads += 1;
            Ok(Frame {
                ankle_angle: f64::from(self.reads),
                ..Frame::default()
            })
        }

        fn write(&mut self, _command: &Command) -> Result<(), ExoError> {
            Ok(())
        }

        fn calibrate(&mut self) -> Result<f64, ExoError> {
            Ok(0.0)
        }

        fn close(&mut self) -> Result<(), ExoError> {
            Ok(())
        }
    }

    #[test]
    fn battery_voltage_defaults_to_unknown() {
        let mut driver = CountingDriver { reads: 0 };
        assert!(driver.battery_voltage().is_none());
        assert_eq!(driver.read().unwrap().ankle_angle, 1.0);
        assert_eq!(driver.side(), Side::Left);
    }
}
