//! `exo` – exoskeleton control loop launcher.
//!
//! This binary wires one session together and hands it to the runtime:
//!
//! 1. Loads `exo.toml` (or `--config`), then `EXO_*` environment overrides,
//!    then command-line flags.
//! 2. Opens live devices, or a recorded dataset when `--past-data` is given.
//! 3. Creates the per-side telemetry files and the session summary path.
//! 4. Intercepts **Ctrl-C** so an interrupt stops the loop and still closes
//!    every device.
//! 5. After calibration, waits for the operator to press Enter, then starts
//!    the parameter listener on stdin and runs the loop.

mod config;
mod repl;

use clap::Parser;
use colored::Colorize;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use exo_hal::{DeviceDriver, DeviceSet, LoopClock, ReplaySet, SimDriver};
use exo_runtime::{
    CsvRecorder, LoggingOptions, PacingMode, ParameterChannel, Session, SessionOptions,
    SharedControl, init_logging, session_prefix, summary_path,
};
use exo_types::ExoError;

/// Exoskeleton control loop
#[derive(Debug, Parser)]
#[command(name = "exo", version, about = "Run one exoskeleton control session, live or replayed")]
struct Args {
    /// Path to the TOML config file (default: ./exo.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay the recorded dataset with this base name instead of live devices
    #[arg(long, value_name = "BASE")]
    past_data: Option<String>,

    /// Stop a replay once loop time exceeds this many seconds
    #[arg(long, value_name = "SECS")]
    offline_duration: Option<f64>,

    /// Session label used in telemetry file names (prompted if omitted)
    #[arg(short, long)]
    label: Option<String>,

    /// Log sensors only; never compute or send torque
    #[arg(long)]
    read_only: bool,

    /// Pace a replay at the target frequency instead of as fast as possible
    #[arg(long)]
    realtime_replay: bool,

    /// Skip the "press Enter to begin" gate
    #[arg(short, long)]
    yes: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = match config::load_or_default(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::from(2);
        }
    };
    if args.read_only {
        cfg.control.read_only = true;
    }

    if args.write_config {
        return match config::save_to(&cfg, &path) {
            Ok(()) => {
                println!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Error saving config".red(), e);
                ExitCode::from(2)
            }
        };
    }

    let mut logging = LoggingOptions::new("exo");
    logging.json = cfg.logging.json;
    logging.otlp_endpoint = cfg.logging.otlp_endpoint.clone();
    let guard = init_logging(logging.with_env());
    if guard.exporting() {
        info!("exporting spans over OTLP");
    }

    print_banner();
    if path.exists() {
        println!("  Config loaded from {}", path.display().to_string().bold());
    }

    match run(&args, cfg) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "Startup failed".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args, cfg: config::ExoConfig) -> Result<ExitCode, ExoError> {
    let sides = cfg.control.sides.sides();

    // ── Devices and clock ─────────────────────────────────────────────────
    let (devices, clock, pacing) = match &args.past_data {
        Some(name) => {
            let replay = ReplaySet::load(
                Some(cfg.replay_base(name).as_path()),
                &cfg.default_replay_base(),
                sides,
            )?;
            println!(
                "  Replaying {} ({} rows)",
                replay.base().display().to_string().bold(),
                replay.len()
            );
            let clock = LoopClock::replay(replay.loop_times(), args.offline_duration);
            let pacing = if args.realtime_replay {
                PacingMode::Realtime
            } else {
                PacingMode::Unpaced
            };
            (DeviceSet::replay(replay), clock, pacing)
        }
        None => {
            if let Some(duration) = args.offline_duration {
                warn!(duration, "--offline-duration only applies to replay; ignored for live devices");
            }
            let drivers: Vec<Box<dyn DeviceDriver>> = sides
                .iter()
                .map(|&side| Box::new(SimDriver::new(side)) as Box<dyn DeviceDriver>)
                .collect();
            (DeviceSet::live(drivers)?, LoopClock::live(), PacingMode::Realtime)
        }
    };

    // ── Telemetry ─────────────────────────────────────────────────────────
    let label = match &args.label {
        Some(label) => label.clone(),
        None => repl::prompt_line("  Session label [session]: ", "session"),
    };
    std::fs::create_dir_all(&cfg.output.dir)?;
    let prefix = session_prefix(&label, chrono::Local::now());
    let recorder = CsvRecorder::create(&cfg.output.dir, &prefix, sides)?;
    let options = SessionOptions {
        pacing,
        summary_path: Some(summary_path(&cfg.output.dir, &prefix)),
    };

    let shared = SharedControl::new(cfg.control.clone());
    let mut session = Session::new(devices, clock, shared.clone(), Box::new(recorder), options)?;
    info!(prefix = %prefix, dir = %cfg.output.dir.display(), "session files created");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let interrupt = shared.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the loop …".yellow().bold());
        interrupt.interrupt();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; an interrupt will not close devices cleanly");
    }

    for (side, volts) in session.battery_voltages() {
        println!("  {} battery: {:.2} V", side.label(), volts);
    }

    // ── Run ───────────────────────────────────────────────────────────────
    let skip_gate = args.yes;
    let report = session.run_gated(move || {
        if !skip_gate {
            repl::wait_for_enter();
        }
        println!(
            "  Loop running. Type {} for parameter commands, {} to stop.\n",
            "help".bold().cyan(),
            "quit".bold().cyan()
        );
        let stdin = BufReader::new(io::stdin());
        if let Err(e) = ParameterChannel::spawn(stdin, shared, repl::print_outcome) {
            warn!(error = %e, "parameter listener unavailable; parameters are fixed for this session");
        }
    });

    repl::print_summary(&report);
    if report.cause.is_normal() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___ __ __ ___ "#.bold().cyan());
    println!("{}", r#"  / -_)\ \ // _ \"#.bold().cyan());
    println!("{}", r#"  \__//_\_\\___/"#.bold().cyan());
    println!();
    println!("  {} {}",
        "exo".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Exoskeleton control loop");
    println!();
}
