//! Operator command channel for hot-reloading parameters.
//!
//! The listener runs on its own thread, blocking on a line reader (stdin in
//! the CLI).  Each line is parsed into an [`OperatorCommand`] and applied to
//! [`SharedControl`]; the loop picks the change up at its next checkpoint.
//!
//! Command language:
//!
//! | Line | Effect |
//! |---|---|
//! | `key=value[, key=value ...]` | validated as a whole, then applied |
//! | `v<rise>,<peak_torque>,<peak>,<fall>[!]` | spline shorthand |
//! | `show` | report current hot-reloadable values |
//! | `help` / `?` | report the command list |
//! | `quit` / `q` / `exit` | raise the quit flag and stop listening |
//!
//! Anything else is rejected with a warning; shared state is not touched.

use std::io::BufRead;
use std::thread::{self, JoinHandle};

use exo_types::{Configuration, ExoError, ParamKey};
use tracing::{debug, info, warn};

use crate::shared::SharedControl;

/// A parsed operator line.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Update(Vec<(ParamKey, f64)>),
    Show,
    Help,
    Quit,
}

/// Result of handling one line, for the operator-facing printer.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Updates applied; the loop will pick them up.
    Applied(Vec<(ParamKey, f64)>),
    /// Current hot-reloadable values, in [`ParamKey::ALL`] order.
    Shown(Vec<(ParamKey, f64)>),
    Help,
    Quit,
    /// Blank line.
    Ignored,
    /// Malformed or invalid; nothing changed.
    Rejected(String),
}

/// Parse one operator line.  `Ok(None)` means the line was blank.
///
/// # Errors
///
/// Returns [`ExoError::InvalidParameter`] describing the first problem.
pub fn parse_command(line: &str) -> Result<Option<OperatorCommand>, ExoError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line.to_ascii_lowercase().as_str() {
        "quit" | "q" | "exit" => return Ok(Some(OperatorCommand::Quit)),
        "show" => return Ok(Some(OperatorCommand::Show)),
        "help" | "?" => return Ok(Some(OperatorCommand::Help)),
        _ => {}
    }

    if let Some(rest) = line.strip_prefix(['v', 'V'])
        && !rest.contains('=')
    {
        return parse_spline_shorthand(rest).map(Some);
    }

    let mut updates = Vec::new();
    for pair in line.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ExoError::InvalidParameter(format!(
                "expected key=value, got '{pair}'"
            )));
        };
        let key = ParamKey::from_name(key)?;
        updates.push((key, parse_number(value)?));
    }
    if updates.is_empty() {
        return Err(ExoError::InvalidParameter(format!("nothing to apply in '{line}'")));
    }
    Ok(Some(OperatorCommand::Update(updates)))
}

fn parse_number(raw: &str) -> Result<f64, ExoError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ExoError::InvalidParameter(format!("'{}' is not a number", raw.trim())))
}

/// `<rise>,<peak_torque>,<peak>,<fall>` with an optional trailing `!`.
fn parse_spline_shorthand(raw: &str) -> Result<OperatorCommand, ExoError> {
    let body = raw.trim().trim_end_matches('!');
    let values = body
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<_>, _>>()?;
    let [rise, peak_torque, peak, fall] = values[..] else {
        return Err(ExoError::InvalidParameter(format!(
            "spline shorthand takes 4 values (rise,peak_torque,peak,fall), got {}",
            values.len()
        )));
    };
    Ok(OperatorCommand::Update(vec![
        (ParamKey::RiseFraction, rise),
        (ParamKey::PeakTorque, peak_torque),
        (ParamKey::PeakFraction, peak),
        (ParamKey::FallFraction, fall),
    ]))
}

/// Current values of every hot-reloadable key.
pub fn current_values(config: &Configuration) -> Vec<(ParamKey, f64)> {
    ParamKey::ALL.iter().map(|&k| (k, config.get(k))).collect()
}

/// Parse and apply one line against `shared`.
pub fn handle_line(shared: &SharedControl, line: &str) -> LineOutcome {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return LineOutcome::Ignored,
        Err(e) => {
            warn!(line = line.trim(), error = %e, "operator command rejected");
            return LineOutcome::Rejected(e.to_string());
        }
    };
    match command {
        OperatorCommand::Update(updates) => match shared.apply_updates(&updates) {
            Ok(_) => {
                info!(?updates, "parameter update queued");
                LineOutcome::Applied(updates)
            }
            Err(e) => {
                warn!(line = line.trim(), error = %e, "parameter update rejected");
                LineOutcome::Rejected(e.to_string())
            }
        },
        OperatorCommand::Show => LineOutcome::Shown(current_values(&shared.config())),
        OperatorCommand::Help => LineOutcome::Help,
        OperatorCommand::Quit => {
            info!("operator requested quit");
            shared.request_quit();
            LineOutcome::Quit
        }
    }
}

/// Background listener feeding operator lines into [`SharedControl`].
///
/// The thread owns nothing but its reader and a clone of the shared handle,
/// so it can be left blocked on input when the session ends.
pub struct ParameterChannel {
    handle: JoinHandle<()>,
}

impl ParameterChannel {
    /// Start listening on `reader`.  `report` is called with every outcome
    /// on the listener thread.
    ///
    /// The listener stops after a quit command, at end of input, or on a
    /// read error.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Io`] if the thread cannot be spawned.
    pub fn spawn<R, F>(reader: R, shared: SharedControl, mut report: F) -> Result<Self, ExoError>
    where
        R: BufRead + Send + 'static,
        F: FnMut(&LineOutcome) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("exo-params".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "operator input failed; listener stopped");
                            return;
                        }
                    };
                    let outcome = handle_line(&shared, &line);
                    report(&outcome);
                    if outcome == LineOutcome::Quit {
                        return;
                    }
                }
                debug!("operator input closed; listener stopped");
            })?;
        Ok(Self { handle })
    }

    /// Wait for the listener to stop.  Only sensible for finite readers.
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("parameter listener panicked");
        }
    }
}
