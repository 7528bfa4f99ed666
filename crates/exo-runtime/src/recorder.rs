//! Telemetry sinks.
//!
//! Every logged iteration produces one [`TelemetryRecord`] per side, written
//! after that side's command has been issued.  Parameter changes produce a
//! configuration snapshot row.
//!
//! [`CsvRecorder`] writes the on-disk layout a session leaves behind:
//!
//! - `<prefix>_LEFT.csv` / `<prefix>_RIGHT.csv` – one row per iteration;
//! - `<prefix>_CONFIG.csv` – one row per configuration snapshot.
//!
//! The frame columns use the same names the replay loader reads, and the
//! snapshot carries the standing angles, so a recorded session can be
//! replayed directly with `<prefix>` as the dataset base.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use exo_hal::replay::{dataset_path, with_suffix};
use exo_types::{Command, Configuration, ExoError, Frame, GaitState, Side};
use tracing::{debug, info};

/// One side's data for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub iteration: u64,
    pub side: Side,
    pub frame: Frame,
    pub state: GaitState,
    pub command: Command,
    /// Whether the command reached the transport (false when suppressed).
    pub sent: bool,
}

/// Append-only destination for telemetry.
pub trait TelemetrySink: Send {
    /// # Errors
    ///
    /// Returns [`ExoError::Telemetry`] when the row cannot be stored.
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), ExoError>;

    /// Persist the configuration in force from `loop_time` on.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Telemetry`] when the row cannot be stored.
    fn snapshot_config(&mut self, loop_time: f64, config: &Configuration) -> Result<(), ExoError>;

    /// Flush and release.  Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Telemetry`] when buffered rows cannot be flushed.
    fn close(&mut self) -> Result<(), ExoError>;

    /// Files written by this sink, if any.
    fn paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// `<YYYYMMDD_HHMM>_<label>`; an empty label yields just the timestamp.
///
/// Path separators and `:` in the label become `_` so the prefix always
/// names files inside the output directory.
pub fn session_prefix(label: &str, at: DateTime<Local>) -> String {
    let stamp = at.format("%Y%m%d_%H%M");
    let label: String = label
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();
    if label.is_empty() {
        stamp.to_string()
    } else {
        format!("{stamp}_{label}")
    }
}

/// Column names of a per-side telemetry file.
pub const TELEMETRY_HEADER: [&str; 19] = [
    "iteration",
    "loop_time",
    "ankle_angle",
    "ankle_velocity",
    "motor_angle",
    "motor_velocity",
    "motor_current",
    "accel_x",
    "accel_y",
    "accel_z",
    "gyro_x",
    "gyro_y",
    "gyro_z",
    "heel_strike",
    "gait_phase",
    "stride_period",
    "command_mode",
    "command_value",
    "command_sent",
];

fn telemetry_row(r: &TelemetryRecord) -> [String; 19] {
    let f = &r.frame;
    let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    [
        r.iteration.to_string(),
        f.loop_time.to_string(),
        f.ankle_angle.to_string(),
        f.ankle_velocity.to_string(),
        f.motor_angle.to_string(),
        f.motor_velocity.to_string(),
        f.motor_current.to_string(),
        f.accel_x.to_string(),
        f.accel_y.to_string(),
        f.accel_z.to_string(),
        f.gyro_x.to_string(),
        f.gyro_y.to_string(),
        f.gyro_z.to_string(),
        r.state.heel_strike.to_string(),
        opt(r.state.gait_phase),
        opt(r.state.stride_period),
        r.command.mode().to_string(),
        r.command.value().to_string(),
        r.sent.to_string(),
    ]
}

fn telemetry_err(path: &Path, e: impl std::fmt::Display) -> ExoError {
    ExoError::Telemetry(format!("{}: {e}", path.display()))
}

// ────────────────────────────────────────────────────────────────────────────
// CsvRecorder
// ────────────────────────────────────────────────────────────────────────────

struct CsvFile {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvFile {
    fn create(path: PathBuf, header: &[&str]) -> Result<Self, ExoError> {
        let mut writer = csv::Writer::from_path(&path).map_err(|e| telemetry_err(&path, e))?;
        writer.write_record(header).map_err(|e| telemetry_err(&path, e))?;
        writer.flush().map_err(|e| telemetry_err(&path, e))?;
        Ok(Self { path, writer })
    }

    fn write<I, T>(&mut self, row: I) -> Result<(), ExoError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(row)
            .map_err(|e| telemetry_err(&self.path, e))
    }

    fn flush(&mut self) -> Result<(), ExoError> {
        self.writer.flush().map_err(|e| telemetry_err(&self.path, e))
    }
}

/// CSV telemetry for one session.
pub struct CsvRecorder {
    sides: BTreeMap<Side, CsvFile>,
    config: CsvFile,
    closed: bool,
}

impl CsvRecorder {
    /// Create `dir` if needed and open one file per side plus the
    /// configuration log, each with its header row.
    ///
    /// # Errors
    ///
    /// Returns [`ExoError::Telemetry`] when a file cannot be created.
    pub fn create(dir: &Path, prefix: &str, sides: &[Side]) -> Result<Self, ExoError> {
        fs::create_dir_all(dir).map_err(|e| telemetry_err(dir, e))?;
        let base = dir.join(prefix);

        let mut files = BTreeMap::new();
        for &side in sides {
            files.insert(side, CsvFile::create(dataset_path(&base, side), &TELEMETRY_HEADER)?);
        }
        let config = CsvFile::create(
            with_suffix(&base, "_CONFIG.csv"),
            &Configuration::snapshot_header(),
        )?;
        info!(base = %base.display(), "telemetry files created");
        Ok(Self {
            sides: files,
            config,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), ExoError> {
        if self.closed {
            return Err(ExoError::Telemetry("recorder is closed".to_string()));
        }
        Ok(())
    }
}

impl TelemetrySink for CsvRecorder {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), ExoError> {
        self.ensure_open()?;
        let file = self.sides.get_mut(&record.side).ok_or_else(|| {
            ExoError::Telemetry(format!("no telemetry file for side {}", record.side))
        })?;
        file.write(telemetry_row(record))
    }

    fn snapshot_config(&mut self, loop_time: f64, config: &Configuration) -> Result<(), ExoError> {
        self.ensure_open()?;
        self.config.write(config.snapshot_record(loop_time))?;
        // Snapshots are rare and must survive a crash.
        self.config.flush()
    }

    fn close(&mut self) -> Result<(), ExoError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_err = None;
        for file in self.sides.values_mut().chain(std::iter::once(&mut self.config)) {
            if let Err(e) = file.flush() {
                first_err.get_or_insert(e);
            }
        }
        debug!("telemetry flushed");
        first_err.map_or(Ok(()), Err)
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.sides
            .values()
            .chain(std::iter::once(&self.config))
            .map(|f| f.path.clone())
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryRecorder
// ────────────────────────────────────────────────────────────────────────────

/// Everything a [`MemoryRecorder`] has been given.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    pub records: Vec<TelemetryRecord>,
    pub snapshots: Vec<(f64, Configuration)>,
    pub closes: u32,
}

/// In-memory sink.  Clones share the same log, so a test keeps one clone
/// and hands the other to the session.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecorder {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Copy of the log so far.
    pub fn log(&self) -> MemoryLog {
        self.lock().clone()
    }

    pub fn records_for(&self, side: Side) -> Vec<TelemetryRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.side == side)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for MemoryRecorder {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), ExoError> {
        self.lock().records.push(record.clone());
        Ok(())
    }

    fn snapshot_config(&mut self, loop_time: f64, config: &Configuration) -> Result<(), ExoError> {
        self.lock().snapshots.push((loop_time, config.clone()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), ExoError> {
        self.lock().closes += 1;
        Ok(())
    }
}
