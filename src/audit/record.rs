//! Per-request audit accumulator.

use std::time::Instant;

use axum::http::{HeaderMap, StatusCode};

use crate::audit::{Attr, Level};
use crate::capture::BodyCapture;
use crate::http::request::RequestSnapshot;

/// Everything known about one request/response cycle.
///
/// Created before the inner service is invoked, emitted exactly once.
#[derive(Debug)]
pub struct AuditRecord {
    /// Per-request floor; records classified below it are not emitted.
    pub(crate) level: Level,
    pub(crate) started: Instant,
    pub(crate) request: RequestSnapshot,
    pub(crate) response: ResponseSnapshot,

    pub(crate) request_capture: BodyCapture,
    pub(crate) response_capture: BodyCapture,
    /// Request capture may be on only to feed the extra-attribute hook;
    /// this flag decides whether the body itself is logged.
    pub(crate) log_request_body: bool,
    pub(crate) request_bytes_unread: u64,

    pub(crate) attrs: Vec<Attr>,
    pub(crate) panic: Option<PanicInfo>,
    pub(crate) error: Option<ErrorInfo>,
    pub(crate) aborted: bool,
}

/// Response facts, filled in once the inner service resolves.
#[derive(Debug, Default)]
pub struct ResponseSnapshot {
    /// `None` until a response was produced.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub bytes: u64,
}

/// Recovered panic value and filtered call stack.
#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub message: String,
    /// Absent for the abort sentinel.
    pub stack: Option<Vec<String>>,
    pub location: Option<SourceLocation>,
}

/// Where a panic was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    /// Innermost application frame, when a stack was captured.
    pub function: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub message: String,
    pub kind: Option<&'static str>,
}

impl AuditRecord {
    pub(crate) fn new(
        level: Level,
        request: RequestSnapshot,
        request_capture: BodyCapture,
        response_capture: BodyCapture,
        log_request_body: bool,
    ) -> Self {
        Self {
            level,
            started: Instant::now(),
            request,
            response: ResponseSnapshot::default(),
            request_capture,
            response_capture,
            log_request_body,
            request_bytes_unread: 0,
            attrs: Vec::new(),
            panic: None,
            error: None,
            aborted: false,
        }
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub(crate) fn set_attrs(&mut self, attrs: impl IntoIterator<Item = Attr>) {
        self.attrs.extend(attrs);
    }

    pub(crate) fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub(crate) fn set_error(&mut self, message: String, kind: Option<&'static str>) {
        self.error = Some(ErrorInfo { message, kind });
    }

    pub(crate) fn enable_request_body_capture(&mut self) {
        self.log_request_body = true;
        self.request_capture.enable();
    }

    pub(crate) fn enable_response_body_capture(&mut self) {
        self.response_capture.enable();
    }
}
