//! Logging and trace export initialisation.
//!
//! Call [`init_logging`] once at process start and hold the returned
//! [`LoggingGuard`] until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `EXO_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`); enables span export. |
//!
//! Environment variables win over values from the configuration file.
//!
//! # Example
//!
//! ```rust,no_run
//! use exo_runtime::logging::{LoggingOptions, init_logging};
//!
//! let _guard = init_logging(LoggingOptions::new("exo").with_env());
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How logs are formatted and where spans go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl LoggingOptions {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_filter: "info".to_string(),
            json: false,
            otlp_endpoint: None,
        }
    }

    /// Apply `EXO_LOG_FORMAT` and `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn with_env(mut self) -> Self {
        if let Ok(format) = std::env::var("EXO_LOG_FORMAT") {
            self.json = format.eq_ignore_ascii_case("json");
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            self.otlp_endpoint = Some(endpoint);
        }
        self
    }
}

/// Install the global subscriber.
///
/// With an OTLP endpoint, spans (including the `control_loop` span) are
/// exported over OTLP/HTTP; otherwise only the console formatter runs.  If a
/// global subscriber is already installed the call leaves it in place.
pub fn init_logging(options: LoggingOptions) -> LoggingGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let provider = options
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(&options.service_name, endpoint));
    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(options.service_name.clone()))
    });

    let (json_layer, compact_layer) = if options.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().compact()))
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .try_init()
    {
        eprintln!("[exo] logging already initialised: {e}");
    }

    LoggingGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel provider down on drop, flushing pending spans.
pub struct LoggingGuard(Option<SdkTracerProvider>);

impl LoggingGuard {
    pub fn exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[exo] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

/// `None` (after printing why) when the exporter cannot be built; the
/// caller then logs to the console only.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[exo] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The process has no async runtime; export synchronously.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_info_to_console() {
        let options = LoggingOptions::new("exo");
        assert_eq!(options.default_filter, "info");
        assert!(!options.json);
        assert!(options.otlp_endpoint.is_none());
    }

    #[test]
    fn env_selects_json_and_endpoint() {
        // SAFETY: only this test touches these variables.
        unsafe {
            std::env::set_var("EXO_LOG_FORMAT", "JSON");
            std::env::set_var("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4318");
        }
        let options = LoggingOptions::new("exo").with_env();
        unsafe {
            std::env::remove_var("EXO_LOG_FORMAT");
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        assert!(options.json);
        assert_eq!(options.otlp_endpoint.as_deref(), Some("http://localhost:4318"));
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = LoggingGuard(None);
        assert!(!guard.exporting());
        drop(guard);
    }

    #[test]
    fn init_twice_does_not_panic() {
        let _a = init_logging(LoggingOptions::new("exo-test"));
        let _b = init_logging(LoggingOptions::new("exo-test"));
    }
}
