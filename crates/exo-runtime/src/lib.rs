//! `exo-runtime` – the control loop engine.
//!
//! Drives a session from device bring-up to shutdown: paces iterations,
//! takes operator parameter updates from a listener thread, runs the
//! read → estimate → control → write → log pipeline and guarantees every
//! device is closed however the session ends.
//!
//! # Modules
//!
//! - [`lifecycle`] – [`Session`][lifecycle::Session]: the
//!   `STARTING → CALIBRATING → ACTIVE → STOPPING → CLOSED` state machine.
//! - [`pipeline`] – [`ControlPipeline`][pipeline::ControlPipeline]: the fixed
//!   per-iteration stage order across all sides.
//! - [`timer`] – [`LoopTimer`][timer::LoopTimer]: drift-compensating pacing
//!   and [`CycleStats`][timer::CycleStats].
//! - [`shared`] – [`SharedControl`][shared::SharedControl]: mutex-guarded
//!   configuration plus update/quit flags, read once per iteration.
//! - [`param_channel`] – [`ParameterChannel`][param_channel::ParameterChannel]:
//!   the operator command listener and its line language.
//! - [`recorder`] – [`TelemetrySink`][recorder::TelemetrySink] with CSV and
//!   in-memory implementations.
//! - [`report`] – [`SessionReport`][report::SessionReport] and the JSON
//!   summary written on stop.
//! - [`logging`] – [`init_logging`][logging::init_logging]: `tracing`
//!   subscriber with optional OTLP span export.

pub mod lifecycle;
pub mod logging;
pub mod param_channel;
pub mod pipeline;
pub mod recorder;
pub mod report;
pub mod shared;
pub mod timer;

pub use lifecycle::{Session, SessionOptions};
pub use logging::{LoggingGuard, LoggingOptions, init_logging};
pub use param_channel::{LineOutcome, OperatorCommand, ParameterChannel, handle_line, parse_command};
pub use pipeline::{ControlPipeline, Lane};
pub use recorder::{CsvRecorder, MemoryRecorder, TelemetryRecord, TelemetrySink, session_prefix};
pub use report::{SessionReport, summary_path, write_summary};
pub use shared::{Checkpoint, SharedControl};
pub use timer::{CycleStats, LoopTimer, PacingMode};
