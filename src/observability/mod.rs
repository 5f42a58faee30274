//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! audit pipeline
//!     → sink.rs (AuditSink: level gate + emit)
//!         → logging.rs TracingSink (tracing events, target `request_audit`)
//!         → json.rs JsonLineSink (one JSON object per line)
//!
//! crate diagnostics
//!     → tracing macros → subscriber installed by logging.rs
//! ```
//!
//! # Design Decisions
//! - The audit core never assumes a wire format; it only sees the trait
//! - Sinks swallow their own failures and report them through `tracing`

pub mod json;
pub mod logging;
pub mod sink;

pub use json::JsonLineSink;
pub use logging::{init_logging, TracingSink};
pub use sink::AuditSink;
