//! Header and body capture.
//!
//! # Data Flow
//! ```text
//! request headers ──► headers.rs (allow-list) ──► record attributes
//! request body ─────► body.rs RequestBodyTap ──► handler
//!                          └─► BodyCapture (bounded buffer)
//! response body ────► http::response::AuditedBody ──► client
//!                          └─► BodyCapture (bounded buffer)
//! ```

pub mod body;
pub mod headers;

pub use body::{BodyCapture, BodyPolicy, CapturedBody, RequestBodyTap, UnreadBody, TRUNCATION_MARKER};
pub use headers::{content_type, header_attrs};
