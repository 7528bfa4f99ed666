//! `exo-hal` – device access for the exoskeleton control loop.
//!
//! # Modules
//!
//! - [`driver`] – [`DeviceDriver`][driver::DeviceDriver]: the transport trait
//!   a vendor driver implements for one live side.
//! - [`sim`] – [`SimDriver`][sim::SimDriver]: a deterministic simulated side
//!   with a [`SimProbe`][sim::SimProbe] for tests and bench runs.
//! - [`replay`] – [`ReplaySet`][replay::ReplaySet]: recorded per-side datasets
//!   and their calibration record, with default-dataset fallback.
//! - [`source`] – [`DataSource`][source::DataSource] (live or replay frames)
//!   and [`LoopClock`][source::LoopClock] (loop time and replay exhaustion).
//! - [`device`] – [`DeviceHandle`][device::DeviceHandle]: calibrate, read,
//!   write and close one side.
//! - [`device_set`] – [`DeviceSet`][device_set::DeviceSet]: all handles of a
//!   session with best-effort shutdown.

pub mod device;
pub mod device_set;
pub mod driver;
pub mod replay;
pub mod sim;
pub mod source;

pub use device::{DeviceHandle, DevicePhase};
pub use device_set::DeviceSet;
pub use driver::DeviceDriver;
pub use replay::{DEFAULT_REPLAY_BASE, ReplaySet, ReplayTrack};
pub use sim::{SimDriver, SimProbe};
pub use source::{DataSource, LoopClock};
