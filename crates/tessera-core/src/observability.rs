//! Logging initialisation and span helpers.
//!
//! Structured logging with consistent spans: every table controller and job
//! stream runs inside one of the spans below so log lines carry the view or
//! job they belong to.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
    /// Single-line logs without targets, written to stderr (for the CLI).
    Compact,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tessera_client=debug`)
pub fn init_logging(format: LogFormat) {
    init_logging_with_default(format, "info");
}

/// Like [`init_logging`], with `default_directive` used when `RUST_LOG` is
/// unset or invalid.
pub fn init_logging_with_default(format: LogFormat, default_directive: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        // Another subscriber (e.g. a test harness) may already be installed.
        let _ = result;
    });
}

/// Creates a span for one asset table controller.
///
/// # Example
///
/// ```rust
/// use tessera_core::observability::table_span;
///
/// let span = table_span("view", "7");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn table_span(scope: &str, id: &str) -> Span {
    tracing::info_span!("table", scope = scope, id = id)
}

/// Creates a span for one tracked job.
#[must_use]
pub fn job_span(job_id: i64, manual: bool) -> Span {
    tracing::info_span!("job", job_id = job_id, manual = manual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
        init_logging_with_default(LogFormat::Compact, "warn");
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = table_span("collection", "3");
        let _guard = span.enter();
        tracing::info!("inside table span");

        let span = job_span(42, true);
        let _guard = span.enter();
        tracing::info!("inside job span");
    }
}
