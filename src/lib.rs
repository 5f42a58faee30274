//! Request audit middleware for axum/tower services.
//!
//! One structured record per request/response cycle, even when the handler
//! panics or the client goes away.

pub mod audit;
pub mod capture;
pub mod config;
pub mod format;
pub mod http;
pub mod observability;

pub use audit::{
    current, enable_request_body_capture, enable_response_body_capture, set_attrs, set_error,
    set_level, try_current, Attr, AttrValue, AuditHandle, Level,
};
pub use config::{AppConfig, AuditConfig};
pub use format::{Schema, SchemaKind};
pub use http::{curl, curl_request, AbortHandler, HttpServer, RequestAuditLayer, RequestSnapshot};
pub use observability::{AuditSink, JsonLineSink, TracingSink};
