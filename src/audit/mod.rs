//! Audit record subsystem.
//!
//! # Data Flow
//! ```text
//! request enters
//!     → pipeline.rs Auditor::begin (record + capture flags)
//!     → handle.rs (capability published to handlers)
//!     → handler returns, panics or is abandoned
//!     → classify.rs (method, status → level)
//!     → cooldown.rs (quiet-down windows)
//!     → pipeline.rs render → sink
//! ```
//!
//! # Design Decisions
//! - Exactly one emission per request: the record lives in a single slot
//!   and whoever takes it out emits it
//! - Severity is derived from the response, never set directly; handlers
//!   can only move the level floor

pub mod attr;
pub mod classify;
pub mod cooldown;
pub mod handle;
pub mod level;
pub mod pipeline;
pub mod record;

pub use attr::{attrs_to_map, Attr, AttrValue};
pub use classify::classify;
pub use cooldown::QuietDown;
pub use handle::{
    current, enable_request_body_capture, enable_response_body_capture, set_attrs, set_error,
    set_level, try_current, AuditHandle,
};
pub use level::{Level, ParseLevelError};
pub use pipeline::{Auditor, ExtraAttrs, Hooks, RequestPredicate, SkipPredicate, CLIENT_ABORTED};
pub use record::{AuditRecord, PanicInfo, ResponseSnapshot, SourceLocation};
