//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! carry explicit defaults, so an empty file is a valid configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audit::Level;
use crate::format::SchemaKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request audit settings.
    pub audit: AuditConfig,

    /// Process logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Request audit settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Minimum level of emitted records.
    ///
    /// - `debug`: every response, OPTIONS included
    /// - `info`: every response except OPTIONS
    /// - `warn`: 4xx and 5xx only (429 excluded)
    /// - `error`: 5xx only
    pub level: Level,

    /// Field naming preset.
    pub schema: SchemaKind,

    /// Keep only errors, stack traces, headers and bodies.
    pub concise: bool,

    /// Answer 500 instead of propagating handler panics.
    pub recover_panics: bool,

    /// Request headers to log, by name.
    pub request_headers: Vec<String>,

    /// Response headers to log, by name.
    pub response_headers: Vec<String>,

    /// Log every request body.
    pub log_request_body: bool,

    /// Log every response body.
    pub log_response_body: bool,

    /// Content types whose bodies may be logged (prefix match).
    pub body_content_types: Vec<String>,

    /// Maximum logged body length in bytes; `<= 0` disables truncation.
    pub body_max_len: i64,

    /// Routes whose records are rate limited to one per period.
    pub quiet_down_routes: Vec<String>,

    pub quiet_down_period_secs: u64,

    /// Maximum number of stack frames recorded for a panic.
    pub panic_stack_depth: usize,

    /// Static attributes added to every record (dropped in concise mode).
    pub tags: BTreeMap<String, String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            schema: SchemaKind::Ecs,
            concise: false,
            recover_panics: true,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            log_request_body: false,
            log_response_body: false,
            body_content_types: [
                "application/json",
                "application/xml",
                "text/plain",
                "text/csv",
                "application/x-www-form-urlencoded",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            body_max_len: 1024,
            quiet_down_routes: Vec::new(),
            quiet_down_period_secs: 300,
            panic_stack_depth: 10,
            tags: BTreeMap::new(),
        }
    }
}

/// Process logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Output format of the process log.
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,request_audit=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
