//! Severity classification of completed requests.
//!
//! # Policy (first match wins)
//! - 5xx → Error
//! - 429 → Info (rate limiting is expected traffic shaping)
//! - 4xx → Warn
//! - OPTIONS → Debug (pre-flight noise)
//! - anything else → Info

use axum::http::{Method, StatusCode};

use crate::audit::Level;

/// Classify a request by method and final status code.
pub fn classify(method: &Method, status: StatusCode) -> Level {
    let code = status.as_u16();
    match code {
        500.. => Level::Error,
        429 => Level::Info,
        400.. => Level::Warn,
        _ if method == Method::OPTIONS => Level::Debug,
        _ => Level::Info,
    }
}
