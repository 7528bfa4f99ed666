//! [`DeviceSet`] – every device handle of a session, keyed by side.
//!
//! The set owns the handles for the whole session and is the only place
//! that closes them.  [`DeviceSet::close_all`] is best-effort: each handle's
//! close runs in isolation (errors *and* panics are caught), so one failing
//! side never prevents the other from being released.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use exo_types::{ExoError, Side};
use tracing::{error, info};

use crate::device::DeviceHandle;
use crate::driver::DeviceDriver;
use crate::replay::ReplaySet;
use crate::source::DataSource;

/// Handles for the active sides, iterated left before right.
#[derive(Default)]
pub struct DeviceSet {
    devices: BTreeMap<Side, DeviceHandle>,
}

impl DeviceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every driver and wrap it in a handle.
    ///
    /// If any driver fails to connect, the handles created so far are closed
    /// (by drop) and the error is returned.
    ///
    /// # Errors
    ///
    /// Propagates the first connection failure.
    pub fn live(drivers: Vec<Box<dyn DeviceDriver>>) -> Result<DeviceSet, ExoError> {
        let mut set = DeviceSet::new();
        for mut driver in drivers {
            let side = driver.side();
            driver.connect()?;
            info!(side = %side, "live device connected");
            set.insert(DeviceHandle::new(side, DataSource::Live(driver)));
        }
        Ok(set)
    }

    /// One replay-backed handle per track in `replay`.
    pub fn replay(replay: ReplaySet) -> DeviceSet {
        let mut set = DeviceSet::new();
        for track in replay.into_tracks() {
            let side = track.side();
            set.insert(DeviceHandle::new(side, DataSource::Replay(track)));
        }
        set
    }

    /// Add a handle.  A previous handle for the same side is closed and
    /// replaced.
    pub fn insert(&mut self, handle: DeviceHandle) {
        if let Some(mut old) = self.devices.insert(handle.side(), handle) {
            let _ = old.close();
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn sides(&self) -> Vec<Side> {
        self.devices.keys().copied().collect()
    }

    pub fn get(&self, side: Side) -> Option<&DeviceHandle> {
        self.devices.get(&side)
    }

    pub fn get_mut(&mut self, side: Side) -> Option<&mut DeviceHandle> {
        self.devices.get_mut(&side)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceHandle> {
        self.devices.values_mut()
    }

    /// Close every handle, collecting failures instead of stopping at the
    /// first one.
    pub fn close_all(&mut self) -> Vec<(Side, ExoError)> {
        let mut failures = Vec::new();
        for (side, handle) in self.devices.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handle.close())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(side = %side, error = %e, "failed to close device");
                    failures.push((*side, e));
                }
                Err(_) => {
                    error!(side = %side, "device close panicked");
                    failures.push((
                        *side,
                        ExoError::DeviceFault {
                            side: *side,
                            details: "close panicked".to_string(),
                        },
                    ));
                }
            }
        }
        failures
    }

    /// `true` once every handle has been closed.
    pub fn all_closed(&self) -> bool {
        self.devices.values().all(DeviceHandle::is_closed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
