//! Record emission pipeline.
//!
//! # Responsibilities
//! - Build the per-request record at entry (capture flags, level floor)
//! - Decide at the end whether a record is emitted: skip hook, severity,
//!   level floor, sink gate, quiet-down window
//! - Assemble attributes in a fixed order and hand them to the sink
//!
//! # Design Decisions
//! - The level and skip checks run before any body is rendered, so
//!   filtered-out traffic costs no rendering work
//! - A failing sink or a panicking hook is logged and never reaches the
//!   HTTP response; a panicking hook falls back to its neutral answer

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use crate::audit::classify::classify;
use crate::audit::cooldown::QuietDown;
use crate::audit::handle::AuditHandle;
use crate::audit::record::AuditRecord;
use crate::audit::{Attr, Level};
use crate::capture::{content_type, header_attrs, BodyCapture, BodyPolicy};
use crate::config::AuditConfig;
use crate::format::{Field, RecordBuilder, Schema};
use crate::http::request::RequestSnapshot;
use crate::observability::AuditSink;

/// Message attached to records of requests the client abandoned.
pub const CLIENT_ABORTED: &str = "request aborted: client disconnected before response was sent";

/// Predicate evaluated once per request at entry.
pub type RequestPredicate = Arc<dyn Fn(&RequestSnapshot) -> bool + Send + Sync>;

/// Veto over emission, given the request and the final status.
pub type SkipPredicate = Arc<dyn Fn(&RequestSnapshot, StatusCode) -> bool + Send + Sync>;

/// Extra attributes computed from the request, its raw body and the status.
pub type ExtraAttrs = Arc<dyn Fn(&RequestSnapshot, &str, StatusCode) -> Vec<Attr> + Send + Sync>;

/// Callbacks that cannot come from a config file.
#[derive(Clone, Default)]
pub struct Hooks {
    pub log_request_body_if: Option<RequestPredicate>,
    pub log_response_body_if: Option<RequestPredicate>,
    pub skip_if: Option<SkipPredicate>,
    pub extra_attrs: Option<ExtraAttrs>,
}

/// Shared, immutable audit settings plus the sink.
#[derive(Clone)]
pub struct Auditor {
    settings: Arc<Settings>,
    pub(crate) hooks: Hooks,
    quiet_down: Arc<QuietDown>,
    sink: Arc<dyn AuditSink>,
}

struct Settings {
    level: Level,
    schema: Schema,
    concise: bool,
    recover_panics: bool,
    request_headers: Vec<String>,
    response_headers: Vec<String>,
    log_request_body: bool,
    log_response_body: bool,
    body: BodyPolicy,
    panic_stack_depth: usize,
    tags: BTreeMap<String, String>,
}

impl Auditor {
    pub fn new(config: AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        let schema = if config.concise {
            config.schema.schema().concise()
        } else {
            config.schema.schema()
        };
        let quiet_down = QuietDown::new(
            config.quiet_down_routes,
            Duration::from_secs(config.quiet_down_period_secs),
        );

        Self {
            settings: Arc::new(Settings {
                level: config.level,
                schema,
                concise: config.concise,
                recover_panics: config.recover_panics,
                request_headers: config.request_headers,
                response_headers: config.response_headers,
                log_request_body: config.log_request_body,
                log_response_body: config.log_response_body,
                body: BodyPolicy {
                    content_types: config.body_content_types,
                    max_len: config.body_max_len,
                },
                panic_stack_depth: config.panic_stack_depth,
                tags: config.tags,
            }),
            hooks: Hooks::default(),
            quiet_down: Arc::new(quiet_down),
            sink,
        }
    }

    /// Replace the schema, e.g. with a hand-built one.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        if let Some(settings) = Arc::get_mut(&mut self.settings) {
            settings.schema = schema;
        } else {
            tracing::warn!("Auditor already shared; schema change ignored");
        }
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.settings.schema
    }

    pub fn recover_panics(&self) -> bool {
        self.settings.recover_panics
    }

    pub fn panic_stack_depth(&self) -> usize {
        self.settings.panic_stack_depth
    }

    /// Build the record for a request that is about to be served.
    pub(crate) fn begin(&self, request: RequestSnapshot) -> AuditRecord {
        let s = &self.settings;
        let log_request_body = s.log_request_body
            || self.hooks.log_request_body_if.as_ref().is_some_and(|f| {
                contain("log_request_body_if", false, || f(&request))
            });
        let log_response_body = s.log_response_body
            || self.hooks.log_response_body_if.as_ref().is_some_and(|f| {
                contain("log_response_body_if", false, || f(&request))
            });
        // The extra-attribute hook receives the raw request body.
        let capture_request = log_request_body || self.hooks.extra_attrs.is_some();

        let limit = s.body.capture_limit();
        AuditRecord::new(
            s.level,
            request,
            BodyCapture::new(limit, capture_request),
            BodyCapture::new(limit, log_response_body),
            log_request_body,
        )
    }

    /// Emit the record held by `handle`, if it is still there.
    pub(crate) fn emit_from(&self, handle: &AuditHandle, aborted: bool) {
        if let Some(mut record) = handle.take() {
            record.aborted |= aborted;
            self.emit(record);
        }
    }

    /// Classify, filter, render and hand the record to the sink.
    pub(crate) fn emit(&self, record: AuditRecord) {
        let duration = record.started.elapsed();
        // An unwritten status means 200 OK to the client.
        let status = record.response.status.unwrap_or(StatusCode::OK);

        if let Some(skip) = &self.hooks.skip_if {
            if contain("skip_if", false, || skip(&record.request, status)) {
                return;
            }
        }

        let level = classify(&record.request.method, status);
        if level < record.level || !self.sink.enabled(level) {
            return;
        }
        if !self.quiet_down.is_empty() && self.quiet_down.suppress(&record.request.path) {
            return;
        }

        let message = format!(
            "{} {} => HTTP {} ({:?})",
            record.request.method,
            record.request.uri,
            status.as_u16(),
            duration
        );
        let attrs = self.render(record, status, duration);

        let emitted = catch_unwind(AssertUnwindSafe(|| self.sink.emit(level, &message, &attrs)));
        if emitted.is_err() {
            tracing::warn!(message = %message, "Audit sink panicked; record dropped");
        }
    }

    fn render(&self, record: AuditRecord, status: StatusCode, duration: Duration) -> Vec<Attr> {
        let s = &self.settings;
        let mut b = RecordBuilder::new(&s.schema);

        if let Some(panic) = &record.panic {
            b.field(Field::ErrorMessage, format!("panic: {}", panic.message));
            if let Some(stack) = &panic.stack {
                b.field(Field::ErrorStackTrace, stack.clone());
            }
            if let Some(location) = &panic.location {
                b.field(Field::SourceFile, location.file.as_str())
                    .field(Field::SourceLine, u64::from(location.line));
                if let Some(function) = &location.function {
                    b.field(Field::SourceFunction, function.as_str());
                }
            }
        }

        let req = &record.request;
        b.field(Field::RequestUrl, req.url.as_str())
            .field(Field::RequestMethod, req.method.as_str())
            .field(Field::RequestPath, req.path.as_str());
        if let Some(ip) = req.remote_ip {
            b.field(Field::RequestRemoteIp, ip.to_string());
        }
        b.field(Field::RequestHost, req.host.as_str())
            .field(Field::RequestScheme, req.scheme.as_str())
            .field(Field::RequestProto, req.proto.as_str())
            .group(Field::RequestHeaders, header_attrs(&req.headers, &s.request_headers));
        if let Some(len) = req.content_length {
            b.field(Field::RequestBytes, len);
        }
        if let Some(ua) = req.user_agent() {
            b.field(Field::RequestUserAgent, ua);
        }
        if let Some(referer) = req.referer() {
            b.field(Field::RequestReferer, referer);
        }

        let resp = &record.response;
        b.group(Field::ResponseHeaders, header_attrs(&resp.headers, &s.response_headers))
            .field(Field::ResponseStatus, status.as_u16())
            .field(Field::ResponseDuration, duration.as_secs_f64() * 1000.0)
            .field(Field::ResponseBytes, resp.bytes);

        if record.aborted {
            b.field(Field::ErrorMessage, CLIENT_ABORTED)
                .field(Field::ErrorType, "ClientAborted");
        } else if let Some(error) = &record.error {
            b.field(Field::ErrorMessage, error.message.as_str());
            if let Some(kind) = error.kind {
                b.field(Field::ErrorType, kind);
            }
        }

        if record.request_bytes_unread > 0 {
            b.field(Field::RequestBytesUnread, record.request_bytes_unread);
        }
        let request_body = record.request_capture.snapshot();
        if record.log_request_body {
            b.field(
                Field::RequestBody,
                s.body.render(&request_body, content_type(&req.headers)),
            );
        }
        if record.response_capture.is_enabled() {
            b.field(
                Field::ResponseBody,
                s.body.render(&record.response_capture.snapshot(), content_type(&resp.headers)),
            );
        }

        if let Some(extra) = &self.hooks.extra_attrs {
            let raw = String::from_utf8_lossy(&request_body.bytes);
            b.extend(contain("extra_attrs", Vec::new(), || extra(req, &raw, status)));
        }
        b.extend(record.attrs);

        if !s.concise {
            b.extend(s.tags.iter().map(|(k, v)| Attr::new(k.as_str(), v.as_str())));
        }

        b.build()
    }
}

/// Run a user hook, answering `fallback` if it panics.
fn contain<T>(hook: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(hook, "Audit hook panicked; using its default");
            fallback
        }
    }
}
