//! [`SharedControl`] – the only state shared between the control loop and
//! the operator listener.
//!
//! One mutex guards the [`Configuration`] together with the update and quit
//! flags.  The loop takes it exactly once per iteration in
//! [`SharedControl::checkpoint`]; the listener takes it only for the
//! duration of a single validated update.  Neither side ever holds it across
//! I/O.
//!
//! Interrupts (Ctrl-C) arrive on a signal-handling thread and are kept in a
//! separate atomic flag so that raising one never waits on the mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use exo_types::{Configuration, ExoError, ParamKey, Side, TerminationCause};
use tracing::warn;

#[derive(Debug)]
struct ControlState {
    config: Configuration,
    update_pending: bool,
    quit: bool,
}

/// What the loop learned at its per-iteration checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// A copy of the configuration if it changed since the last checkpoint.
    pub update: Option<Configuration>,
    /// Set when the session must stop before running the pipeline.
    pub stop: Option<TerminationCause>,
}

/// Cloneable handle to the shared control state.
#[derive(Debug, Clone)]
pub struct SharedControl {
    state: Arc<Mutex<ControlState>>,
    interrupted: Arc<AtomicBool>,
}

impl SharedControl {
    pub fn new(config: Configuration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControlState {
                config,
                update_pending: false,
                quit: false,
            })),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A panicking holder must not take the device loop down with it; the
    /// guarded data is always left consistent because every mutation is a
    /// whole-value replacement.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("shared control state was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Configuration {
        self.lock().config.clone()
    }

    /// Validate `updates` against the current configuration and, if they all
    /// pass, install the result and raise the update flag.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::InvalidParameter`] and leaves both the
    /// configuration and the flag untouched if any update is rejected.
    pub fn apply_updates(&self, updates: &[(ParamKey, f64)]) -> Result<Configuration, ExoError> {
        let mut state = self.lock();
        let next = state.config.with_updates(updates)?;
        state.config = next.clone();
        state.update_pending = true;
        Ok(next)
    }

    /// Record a calibration result.  Used before the loop starts, so no
    /// update is signalled.
    pub fn set_standing_angle(&self, side: Side, angle: f64) {
        self.lock().config.set_standing_angle(side, angle);
    }

    pub fn request_quit(&self) {
        self.lock().quit = true;
    }

    /// Safe to call from a signal-handling thread.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_update_pending(&self) -> bool {
        self.lock().update_pending
    }

    pub fn is_quit_requested(&self) -> bool {
        self.lock().quit
    }

    /// The loop's single per-iteration synchronisation point.
    ///
    /// Under one lock: copy the configuration out if it changed, clear the
    /// update flag, and read the quit flag.  An interrupt outranks a quit
    /// request.
    pub fn checkpoint(&self) -> Checkpoint {
        let (update, quit) = {
            let mut state = self.lock();
            let update = if state.update_pending {
                state.update_pending = false;
                Some(state.config.clone())
            } else {
                None
            };
            (update, state.quit)
        };
        let stop = if self.is_interrupted() {
            Some(TerminationCause::Interrupted)
        } else if quit {
            Some(TerminationCause::OperatorQuit)
        } else {
            None
        };
        Checkpoint { update, stop }
    }
}
