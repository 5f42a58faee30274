//! Request-scoped capability to the audit record.
//!
//! # Responsibilities
//! - Let handlers and inner middleware add attributes, change the level
//!   floor and switch on body capture for the current request
//! - Fail loudly when used outside an audit scope
//!
//! # Design Decisions
//! - The handle is published both as a request extension and as a tokio
//!   task-local around the inner service future
//! - After emission the record is gone from the slot; later writes are
//!   logged and ignored
//! - Not meant for detached background tasks: the record is emitted as soon
//!   as the response completes

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Extensions;

use crate::audit::record::AuditRecord;
use crate::audit::{Attr, Level};

tokio::task_local! {
    static CURRENT: AuditHandle;
}

/// Handle to the audit record of the request being served.
#[derive(Clone)]
pub struct AuditHandle {
    slot: Arc<Mutex<Option<AuditRecord>>>,
}

impl fmt::Debug for AuditHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditHandle")
            .field("emitted", &self.is_emitted())
            .finish()
    }
}

impl AuditHandle {
    pub(crate) fn new(record: AuditRecord) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(record))),
        }
    }

    /// Handle published by the audit layer in the request extensions.
    ///
    /// # Panics
    /// When the audit layer is not installed in front of the caller.
    pub fn from_extensions(extensions: &Extensions) -> Self {
        match extensions.get::<AuditHandle>() {
            Some(handle) => handle.clone(),
            None => panic!(
                "AuditHandle requested outside of an audit scope; \
                 install RequestAuditLayer in front of this handler"
            ),
        }
    }

    /// Append attributes to the record, keeping insertion order.
    pub fn set_attrs(&self, attrs: impl IntoIterator<Item = Attr>) {
        self.update("set_attrs", |record| record.set_attrs(attrs));
    }

    /// Replace the level floor for this request. Last write wins.
    pub fn set_level(&self, level: Level) {
        self.update("set_level", |record| record.set_level(level));
    }

    /// Attach an application error to the record.
    pub fn set_error(&self, error: impl fmt::Display) {
        let message = error.to_string();
        self.update("set_error", |record| record.set_error(message, None));
    }

    /// Log the request body for this request. Idempotent.
    ///
    /// Bytes the handler already consumed before this call are not captured.
    pub fn enable_request_body_capture(&self) {
        self.update("enable_request_body_capture", |record| {
            record.enable_request_body_capture()
        });
    }

    /// Log the response body for this request. Idempotent.
    pub fn enable_response_body_capture(&self) {
        self.update("enable_response_body_capture", |record| {
            record.enable_response_body_capture()
        });
    }

    pub fn is_emitted(&self) -> bool {
        self.lock().is_none()
    }

    /// Run `f` on the record if it has not been emitted yet.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut AuditRecord) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    /// Remove the record for emission. Only the first call gets it.
    pub(crate) fn take(&self) -> Option<AuditRecord> {
        self.lock().take()
    }

    fn update(&self, operation: &'static str, f: impl FnOnce(&mut AuditRecord)) {
        if self.with(f).is_none() {
            tracing::warn!(operation, "Audit record already emitted; write ignored");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<AuditRecord>> {
        // A handler panicking mid-write must not prevent emission.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> FromRequestParts<S> for AuditHandle
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}

/// Run `fut` with `handle` as the current audit scope.
pub(crate) fn scope<F: Future>(handle: AuditHandle, fut: F) -> impl Future<Output = F::Output> {
    CURRENT.scope(handle, fut)
}

/// Handle of the audit scope the current task runs in, if any.
pub fn try_current() -> Option<AuditHandle> {
    CURRENT.try_with(AuditHandle::clone).ok()
}

/// Handle of the audit scope the current task runs in.
///
/// # Panics
/// Outside an audit scope, including in tasks spawned from a handler.
pub fn current() -> AuditHandle {
    match try_current() {
        Some(handle) => handle,
        None => panic!(
            "request_audit::current() called outside of an audit scope; \
             install RequestAuditLayer in front of this handler"
        ),
    }
}

/// Shorthand for `current().set_attrs(attrs)`.
pub fn set_attrs(attrs: impl IntoIterator<Item = Attr>) {
    current().set_attrs(attrs);
}

/// Shorthand for `current().set_level(level)`.
pub fn set_level(level: Level) {
    current().set_level(level);
}

/// Shorthand for `current().set_error(error)`.
pub fn set_error(error: impl fmt::Display) {
    current().set_error(error);
}

pub fn enable_request_body_capture() {
    current().enable_request_body_capture();
}

pub fn enable_response_body_capture() {
    current().enable_response_body_capture();
}
