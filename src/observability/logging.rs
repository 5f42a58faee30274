//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber
//! - Forward audit records into `tracing` under the `request_audit` target
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured filter

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::audit::{attrs_to_map, Attr, Level};
use crate::config::LogFormat;
use crate::observability::AuditSink;

/// Install the global subscriber.
pub fn init_logging(filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Sink that emits records as `tracing` events.
///
/// The attributes are attached as one JSON-encoded `record` field, so nested
/// groups survive any subscriber format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn enabled(&self, level: Level) -> bool {
        match level {
            Level::Debug => tracing::enabled!(target: "request_audit", tracing::Level::DEBUG),
            Level::Info => tracing::enabled!(target: "request_audit", tracing::Level::INFO),
            Level::Warn => tracing::enabled!(target: "request_audit", tracing::Level::WARN),
            Level::Error => tracing::enabled!(target: "request_audit", tracing::Level::ERROR),
        }
    }

    fn emit(&self, level: Level, message: &str, attrs: &[Attr]) {
        let record = serde_json::Value::Object(attrs_to_map(attrs));
        match level {
            Level::Debug => {
                tracing::debug!(target: "request_audit", record = %record, "{message}")
            }
            Level::Info => tracing::info!(target: "request_audit", record = %record, "{message}"),
            Level::Warn => tracing::warn!(target: "request_audit", record = %record, "{message}"),
            Level::Error => {
                tracing::error!(target: "request_audit", record = %record, "{message}")
            }
        }
    }
}
