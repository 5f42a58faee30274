//! Response observation.
//!
//! # Responsibilities
//! - Count and optionally capture response bytes as they stream out
//! - Emit the record when the body completes or is dropped early
//! - Emit the record when the request future itself is abandoned
//!
//! # Design Decisions
//! - The record is emitted from whichever of these happens first; the
//!   record slot guarantees later attempts find nothing
//! - A body dropped before end-of-stream means the client went away

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::audit::{AuditHandle, AuditRecord, Auditor};
use crate::capture::BodyCapture;

/// Emission obligation for one request.
///
/// Dropping it without calling [`PendingRecord::finish`] emits the record
/// marked as client-aborted.
pub(crate) struct PendingRecord {
    auditor: Auditor,
    handle: AuditHandle,
}

impl PendingRecord {
    pub(crate) fn new(auditor: Auditor, handle: AuditHandle) -> Self {
        Self { auditor, handle }
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut AuditRecord)) {
        self.handle.with(f);
    }

    /// Emit normally.
    pub(crate) fn finish(self) {
        self.auditor.emit_from(&self.handle, false);
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        self.auditor.emit_from(&self.handle, true);
    }
}

/// Response body wrapper that reports to the audit record.
pub struct AuditedBody {
    inner: Body,
    capture: BodyCapture,
    bytes: u64,
    pending: Option<PendingRecord>,
}

impl AuditedBody {
    pub(crate) fn new(inner: Body, capture: BodyCapture, pending: PendingRecord) -> Self {
        Self {
            inner,
            capture,
            bytes: 0,
            pending: Some(pending),
        }
    }

    fn complete(&mut self, error: Option<String>) {
        if let Some(pending) = self.pending.take() {
            let bytes = self.bytes;
            pending.update(|record| {
                record.response.bytes = bytes;
                if let Some(message) = error {
                    record.set_error(message, Some("ResponseBodyError"));
                }
            });
            pending.finish();
        }
    }
}

impl HttpBody for AuditedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                    this.capture.record(data);
                }
                if this.inner.is_end_stream() {
                    this.complete(None);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.complete(Some(e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.complete(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for AuditedBody {
    fn drop(&mut self) {
        if self.inner.is_end_stream() {
            self.complete(None);
        } else if let Some(pending) = self.pending.take() {
            let bytes = self.bytes;
            pending.update(|record| record.response.bytes = bytes);
            // Dropping the obligation marks the record as aborted.
            drop(pending);
        }
    }
}
