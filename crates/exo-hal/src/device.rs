//! [`DeviceHandle`] – one actuated side, live or replayed.
//!
//! A handle moves through `Connected → Calibrated → Active → Closed`.
//! Calibration may be skipped (read-only sessions), in which case the handle
//! goes straight to `Active`.  `Closed` is terminal: once closed, reads and
//! writes fail and further `close` calls are no-ops.
//!
//! A handle that is dropped without being closed closes itself, so a device
//! is never left streaming when its owner unwinds.

use exo_types::{Command, ExoError, Frame, Side};
use tracing::{debug, info, warn};

use crate::source::DataSource;

/// Lifetime phase of a [`DeviceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePhase {
    Connected,
    Calibrated,
    Active,
    Closed,
}

/// Owner of one side's connection, calibration offset and latest frame.
pub struct DeviceHandle {
    side: Side,
    source: DataSource,
    phase: DevicePhase,
    standing_angle: Option<f64>,
    frame: Option<Frame>,
    last_written: Option<Command>,
    writes_sent: u64,
    writes_skipped: u64,
}

impl DeviceHandle {
    /// Wrap an already connected source.
    pub fn new(side: Side, source: DataSource) -> Self {
        Self {
            side,
            source,
            phase: DevicePhase::Connected,
            standing_angle: None,
            frame: None,
            last_written: None,
            writes_sent: 0,
            writes_skipped: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn phase(&self) -> DevicePhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }

    pub fn is_closed(&self) -> bool {
        self.phase == DevicePhase::Closed
    }

    /// Standing angle measured by [`calibrate`](Self::calibrate).
    pub fn standing_angle(&self) -> Option<f64> {
        self.standing_angle
    }

    /// Frame from the most recent successful [`read`](Self::read).
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Number of commands that reached the transport.
    pub fn writes_sent(&self) -> u64 {
        self.writes_sent
    }

    /// Number of writes suppressed because the command was unchanged.
    pub fn writes_skipped(&self) -> u64 {
        self.writes_skipped
    }

    pub fn battery_voltage(&mut self) -> Option<f64> {
        self.source.battery_voltage()
    }

    fn ensure_open(&self, operation: &str) -> Result<(), ExoError> {
        if self.phase == DevicePhase::Closed {
            return Err(ExoError::DeviceFault {
                side: self.side,
                details: format!("{operation} on a closed device"),
            });
        }
        Ok(())
    }

    /// Run standing calibration and remember the offset.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Calibration`] if the routine fails or the device
    /// is not in the `Connected` phase.
    pub fn calibrate(&mut self) -> Result<f64, ExoError> {
        if self.phase != DevicePhase::Connected {
            return Err(ExoError::Calibration {
                side: self.side,
                details: format!("cannot calibrate in phase {:?}", self.phase),
            });
        }
        let angle = self.source.calibrate(self.side)?;
        info!(side = %self.side, standing_angle = angle, "standing calibration complete");
        self.standing_angle = Some(angle);
        self.phase = DevicePhase::Calibrated;
        Ok(angle)
    }

    /// Mark the device ready for the loop.
    ///
    /// # Errors
    ///
    /// Fails if the device has already been closed.
    pub fn activate(&mut self) -> Result<(), ExoError> {
        self.ensure_open("activate")?;
        if self.phase == DevicePhase::Connected {
            warn!(side = %self.side, "device activated without calibration");
        }
        self.phase = DevicePhase::Active;
        Ok(())
    }

    /// Pull the frame for `iteration_index` and make it the current frame.
    ///
    /// On failure the previous frame is discarded, so nothing downstream can
    /// run on stale data.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::DeviceFault`] on transport failure, on a missing
    /// replay row, or when the device is closed.
    pub fn read(&mut self, iteration_index: u64, loop_time: f64) -> Result<&Frame, ExoError> {
        self.ensure_open("read")?;
        self.frame = None;
        let frame = self.source.next_frame(self.side, iteration_index, loop_time)?;
        Ok(self.frame.insert(frame))
    }

    /// Issue `command`.  With `only_if_changed`, a command equal to the last
    /// one actually sent is skipped.
    ///
    /// Returns `true` if the command reached the transport.
    ///
    /// # Errors
    ///
    /// Propagates transport failures; fails on a closed device.
    pub fn write(&mut self, command: Command, only_if_changed: bool) -> Result<bool, ExoError> {
        self.ensure_open("write")?;
        if only_if_changed && self.last_written == Some(command) {
            self.writes_skipped += 1;
            return Ok(false);
        }
        self.source.write(&command)?;
        self.last_written = Some(command);
        self.writes_sent += 1;
        Ok(true)
    }

    /// Stop streaming and release the transport.  Idempotent.
    ///
    /// The handle is marked closed before the transport is touched, so a
    /// failing close is still never retried.
    ///
    /// # Errors
    ///
    /// Propagates the transport's close failure on the first call.
    pub fn close(&mut self) -> Result<(), ExoError> {
        if self.phase == DevicePhase::Closed {
            debug!(side = %self.side, "close on already-closed device ignored");
            return Ok(());
        }
        self.phase = DevicePhase::Closed;
        self.frame = None;
        let result = self.source.close();
        match &result {
            Ok(()) => info!(
                side = %self.side,
                writes_sent = self.writes_sent,
                writes_skipped = self.writes_skipped,
                "device closed"
            ),
            Err(e) => warn!(side = %self.side, error = %e, "device close reported an error"),
        }
        result
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.phase != DevicePhase::Closed {
            warn!(side = %self.side, "device handle dropped while open; closing");
            let _ = self.close();
        }
    }
}
