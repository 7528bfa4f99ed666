//! [`CommandLimiter`] – last line of defence before a command reaches the
//! actuator.
//!
//! Every command a controller produces passes through
//! [`CommandLimiter::enforce`].  Each registered [`CommandRule`] is evaluated
//! in order and may substitute a safer command; the (possibly substituted)
//! command is what the pipeline writes and logs.
//!
//! Two built-in rules are installed by [`CommandLimiter::for_config`]:
//! - [`FiniteCommandRule`] – a `NaN` or infinite set-point becomes
//!   [`Command::Idle`].
//! - [`TorqueCeilingRule`] – torque set-points are clamped to
//!   `±max_torque`.

use exo_types::{Command, Configuration, Side};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single invariant an outgoing command must satisfy.
pub trait CommandRule: Send {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Return `None` when `command` is acceptable, or the command to send
    /// instead.
    fn check(&self, command: &Command) -> Option<Command>;

    /// Pick up new limits after a parameter update.
    fn update_params(&mut self, _config: &Configuration) {}
}

// ────────────────────────────────────────────────────────────────────────────
// CommandLimiter
// ────────────────────────────────────────────────────────────────────────────

/// Ordered set of [`CommandRule`]s.
///
/// # Example
///
/// ```
/// use exo_control::limits::CommandLimiter;
/// use exo_types::{Command, Configuration, Side};
///
/// let mut config = Configuration::default();
/// config.control_params.max_torque = 20.0;
/// let mut limiter = CommandLimiter::for_config(&config);
///
/// assert_eq!(limiter.enforce(Side::Left, Command::Torque(35.0)), Command::Torque(20.0));
/// assert_eq!(limiter.enforce(Side::Left, Command::Torque(f64::NAN)), Command::Idle);
/// assert_eq!(limiter.interventions(), 2);
/// ```
#[derive(Default)]
pub struct CommandLimiter {
    rules: Vec<Box<dyn CommandRule>>,
    interventions: u64,
}

impl CommandLimiter {
    /// Limiter with no rules; every command passes unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter with the built-in rules, sized from `config`.
    pub fn for_config(config: &Configuration) -> Self {
        let mut limiter = Self::new();
        limiter.add_rule(Box::new(FiniteCommandRule));
        limiter.add_rule(Box::new(TorqueCeilingRule {
            max_torque: config.control_params.max_torque,
        }));
        limiter
    }

    /// Register a rule.  Rules run in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn CommandRule>) {
        self.rules.push(rule);
    }

    pub fn update_params(&mut self, config: &Configuration) {
        for rule in &mut self.rules {
            rule.update_params(config);
        }
    }

    /// Pass `command` through every rule and return what may be sent.
    pub fn enforce(&mut self, side: Side, command: Command) -> Command {
        let mut current = command;
        for rule in &self.rules {
            if let Some(replacement) = rule.check(&current) {
                debug!(
                    side = %side,
                    rule = rule.name(),
                    requested = ?current,
                    sent = ?replacement,
                    "command limited"
                );
                self.interventions += 1;
                current = replacement;
            }
        }
        current
    }

    /// Number of substitutions made since construction.
    pub fn interventions(&self) -> u64 {
        self.interventions
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Replaces commands whose set-point is not a finite number with
/// [`Command::Idle`].
pub struct FiniteCommandRule;

impl CommandRule for FiniteCommandRule {
    fn name(&self) -> &str {
        "finite"
    }

    fn check(&self, command: &Command) -> Option<Command> {
        (!command.value().is_finite()).then_some(Command::Idle)
    }
}

/// Clamps torque set-points to `[-max_torque, max_torque]`.
pub struct TorqueCeilingRule {
    pub max_torque: f64,
}

impl CommandRule for TorqueCeilingRule {
    fn name(&self) -> &str {
        "torque_ceiling"
    }

    fn check(&self, command: &Command) -> Option<Command> {
        match *command {
            Command::Torque(t) if t.abs() > self.max_torque => {
                Some(Command::Torque(t.clamp(-self.max_torque, self.max_torque)))
            }
            _ => None,
        }
    }

    fn update_params(&mut self, config: &Configuration) {
        self.max_torque = config.control_params.max_torque;
    }
}
