//! Operator console – everything the `exo` binary prints or asks for.
//!
//! The parameter listener itself lives in `exo-runtime`; this module only
//! renders its [`LineOutcome`]s and the end-of-session summary, and handles
//! the blocking prompts that happen before the loop starts.
//!
//! Commands accepted while the loop runs:
//!   key=value[, key=value]   – update hot-reloadable parameters
//!   v<rise>,<peak>,<pk>,<fall> – spline shorthand
//!   show                     – print current values
//!   help | ?                 – show this list
//!   quit | q | exit          – stop the session

use colored::Colorize;
use std::io::{self, BufRead, Write};

use exo_runtime::{LineOutcome, SessionReport};
use exo_types::ParamKey;

/// Print the outcome of one operator line.
pub fn print_outcome(outcome: &LineOutcome) {
    if let Some(text) = format_outcome(outcome) {
        println!("{}", text);
    }
    if *outcome == LineOutcome::Help {
        print_help();
    }
}

/// Render an outcome as one block of text.  Blank lines and help produce no
/// block of their own.
pub(crate) fn format_outcome(outcome: &LineOutcome) -> Option<String> {
    match outcome {
        LineOutcome::Applied(updates) => Some(format!(
            "{} {}",
            "✓ Queued:".green(),
            format_pairs(updates)
        )),
        LineOutcome::Shown(values) => {
            let mut out = format!("{}", "Current parameters".bold().underline());
            for (key, value) in values {
                out.push_str(&format!("\n  {:<24} {}", key.name().cyan(), value));
            }
            Some(out)
        }
        LineOutcome::Quit => Some(format!("{}", "Stopping session …".yellow())),
        LineOutcome::Rejected(reason) => Some(format!(
            "{} {}. Type {} for the command list.",
            "Rejected:".red(),
            reason,
            "help".bold()
        )),
        LineOutcome::Help | LineOutcome::Ignored => None,
    }
}

fn format_pairs(pairs: &[(ParamKey, f64)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k.name(), v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_help() {
    println!();
    println!("{}", "Operator Commands".bold().underline());
    println!("  {}  – update parameters", "key=value[, key=value]".bold().cyan());
    println!("  {}     – spline shorthand", "v<rise>,<peak_torque>,<peak>,<fall>".bold().cyan());
    println!("  {}                    – print current values", "show".bold().cyan());
    println!("  {}                – show this list", "help  ?".bold().cyan());
    println!("  {}           – stop the session", "quit  q  exit".bold().cyan());
    println!("  Keys: {}", ParamKey::ALL.map(ParamKey::name).join(", ").dimmed());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Summary
// ─────────────────────────────────────────────────────────────────────────────

pub fn print_summary(report: &SessionReport) {
    println!();
    println!("{}", "Session Summary".bold().underline());
    let cause = report.cause.to_string();
    if report.cause.is_normal() {
        println!("  Ended by        : {}", cause.green());
    } else {
        println!("  Ended by        : {}", cause.red().bold());
    }
    println!("  Iterations      : {}", report.iterations);
    println!("  Last loop time  : {:.3} s", report.last_loop_time);
    if let (Some(avg), Some(min), Some(max)) = (
        report.avg_period,
        report.pacing.min_period,
        report.pacing.max_period,
    ) {
        println!(
            "  Loop period     : avg {:.2} ms, min {:.2} ms, max {:.2} ms",
            avg * 1e3,
            min * 1e3,
            max * 1e3
        );
    }
    if report.pacing.overruns > 0 {
        println!(
            "  Overruns        : {} ({} resyncs)",
            report.pacing.overruns.to_string().yellow(),
            report.pacing.resyncs
        );
    }
    println!("  Param updates   : {}", report.parameter_updates);
    if report.limiter_interventions > 0 {
        println!(
            "  Limited commands: {}",
            report.limiter_interventions.to_string().yellow()
        );
    }
    for device in &report.devices {
        println!(
            "  {:<5} writes   : {} sent, {} skipped",
            device.side.label(),
            device.writes_sent,
            device.writes_skipped
        );
    }
    for failure in &report.close_failures {
        println!("  {} {}", "Close failure:".red(), failure);
    }
    if let Some(e) = &report.telemetry_error {
        println!("  {} {}", "Telemetry error:".red(), e);
    }
    for path in &report.telemetry_files {
        println!("  {} {}", "✓".green(), path.display().to_string().dimmed());
    }
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────────────────────────────────────

/// Ask for a line on stdin, falling back to `default` on empty input or a
/// read error.
pub fn prompt_line(msg: &str, default: &str) -> String {
    read_prompt(&mut io::stdin().lock(), msg, default)
}

pub(crate) fn read_prompt<R: BufRead>(input: &mut R, msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

/// Block until the operator presses Enter.
pub fn wait_for_enter() {
    let _ = prompt_line(
        &format!("  {} ", "Press Enter to begin the session.".bold()),
        "",
    );
}
