//! Observability infrastructure for bale.
//!
//! Structured logging with consistent spans: one span per collapse operation
//! and one per range run, so every transfer log line carries its prefix.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `bale_collapse=debug`)
///
/// # Example
///
/// ```rust
/// use bale_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one collapse operation.
///
/// # Example
///
/// ```rust
/// use bale_core::observability::collapse_span;
///
/// let span = collapse_span("collapse", "logs/2024-01-01-");
/// let _guard = span.enter();
/// // ... download, concatenate, upload
/// ```
#[must_use]
pub fn collapse_span(operation: &str, input_prefix: &str) -> Span {
    tracing::info_span!(
        "collapse",
        op = operation,
        input_prefix = input_prefix,
    )
}

/// Creates a span for a bucket-range run.
#[must_use]
pub fn range_span(operation: &str, granularity: &str, input_dir: &str) -> Span {
    tracing::info_span!(
        "range",
        op = operation,
        granularity = granularity,
        input_dir = input_dir,
    )
}
