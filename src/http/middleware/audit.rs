//! Request audit middleware.
//!
//! # Responsibilities
//! - Build the record and publish the handle before calling the inner service
//! - Tee the request body; drain what the handler left unread
//! - Recover panics, forcing a 500 when allowed, re-raising otherwise
//! - Hand the response body to [`AuditedBody`] so emission happens when the
//!   client has received it
//!
//! # Design Decisions
//! - All per-request work is set up synchronously in `call`, so a future
//!   dropped before its first poll still emits its record
//! - A recovered panic on an upgrade connection is re-raised; there is no
//!   response that could be substituted

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use http_body::Body as HttpBody;
use tower::{Layer, Service};

use crate::audit::handle::scope;
use crate::audit::{AuditHandle, Attr, Auditor, PanicInfo};
use crate::capture::{RequestBodyTap, UnreadBody};
use crate::config::AuditConfig;
use crate::format::Schema;
use crate::http::panic::{install_panic_hook, Outcome, PanicGuard};
use crate::http::request::RequestSnapshot;
use crate::http::response::{AuditedBody, PendingRecord};
use crate::observability::AuditSink;

/// Layer that audits every request passing through it.
#[derive(Clone)]
pub struct RequestAuditLayer {
    auditor: Auditor,
}

impl RequestAuditLayer {
    pub fn new(config: AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        install_panic_hook();
        Self {
            auditor: Auditor::new(config, sink),
        }
    }

    /// Use a hand-built schema instead of the configured preset.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.auditor = self.auditor.with_schema(schema);
        self
    }

    /// Log the request body when `f` returns true for the request.
    pub fn log_request_body_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestSnapshot) -> bool + Send + Sync + 'static,
    {
        self.auditor.hooks.log_request_body_if = Some(Arc::new(f));
        self
    }

    /// Log the response body when `f` returns true for the request.
    pub fn log_response_body_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestSnapshot) -> bool + Send + Sync + 'static,
    {
        self.auditor.hooks.log_response_body_if = Some(Arc::new(f));
        self
    }

    /// Drop the record when `f` returns true for the request and final status.
    pub fn skip_if<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestSnapshot, StatusCode) -> bool + Send + Sync + 'static,
    {
        self.auditor.hooks.skip_if = Some(Arc::new(f));
        self
    }

    /// Add attributes computed from the request, its raw body and the status.
    ///
    /// Installing this hook captures every request body.
    pub fn extra_attrs<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestSnapshot, &str, StatusCode) -> Vec<Attr> + Send + Sync + 'static,
    {
        self.auditor.hooks.extra_attrs = Some(Arc::new(f));
        self
    }
}

impl<S> Layer<S> for RequestAuditLayer {
    type Service = RequestAudit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestAudit {
            inner,
            auditor: self.auditor.clone(),
        }
    }
}

/// Service produced by [`RequestAuditLayer`].
#[derive(Clone)]
pub struct RequestAudit<S> {
    inner: S,
    auditor: Auditor,
}

impl<S> Service<Request<Body>> for RequestAudit<S>
where
    S: Service<Request<Body>, Response = Response<Body>>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let auditor = self.auditor.clone();
        let snapshot = RequestSnapshot::capture(&req);
        let method = snapshot.method.clone();
        let upgrade = snapshot.is_upgrade();

        let record = auditor.begin(snapshot);
        let request_capture = record.request_capture.clone();
        let response_capture = record.response_capture.clone();
        let handle = AuditHandle::new(record);
        let pending = PendingRecord::new(auditor.clone(), handle.clone());

        let unread = UnreadBody::default();
        let (mut parts, body) = req.into_parts();
        parts.extensions.insert(handle.clone());
        let body = Body::new(RequestBodyTap::new(body, request_capture.clone(), unread.clone()));
        let fut = self.inner.call(Request::from_parts(parts, body));

        let depth = auditor.panic_stack_depth();
        let recover = auditor.recover_panics();

        Box::pin(async move {
            let outcome = PanicGuard::new(scope(handle, fut), depth).await;

            if request_capture.is_enabled() {
                let drained = unread.drain().await;
                if drained > 0 {
                    pending.update(|record| record.request_bytes_unread = drained);
                }
            } else {
                drop(unread.take());
            }

            match outcome {
                Outcome::Completed(Ok(response)) => {
                    let (parts, body) = response.into_parts();
                    pending.update(|record| {
                        record.response.status = Some(parts.status);
                        record.response.headers = parts.headers.clone();
                    });

                    if is_bodyless(&method, parts.status) || body.is_end_stream() {
                        pending.finish();
                        return Ok(Response::from_parts(parts, body));
                    }
                    let body = Body::new(AuditedBody::new(body, response_capture, pending));
                    Ok(Response::from_parts(parts, body))
                }
                Outcome::Completed(Err(err)) => {
                    let message = err.to_string();
                    pending.update(|record| {
                        record.response.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                        record.set_error(message, Some("HandlerError"));
                    });
                    pending.finish();
                    Err(err)
                }
                Outcome::Panicked(mut fault) => {
                    let info = PanicInfo {
                        message: fault.message().to_string(),
                        stack: fault.take_stack(),
                        location: fault.take_location(),
                    };
                    pending.update(|record| {
                        record.response.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
                        record.panic = Some(info);
                    });

                    if recover && !fault.is_abort() && !upgrade {
                        let response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                        pending.update(|record| {
                            record.response.headers = response.headers().clone();
                        });
                        pending.finish();
                        return Ok(response);
                    }

                    pending.finish();
                    fault.resume()
                }
            }
        })
    }
}

/// Responses that never carry a body on the wire.
fn is_bodyless(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}
