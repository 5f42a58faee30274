//! Body capture.
//!
//! # Responsibilities
//! - Mirror body bytes into a bounded buffer without altering the stream
//! - Track whether the request body was consumed to end-of-stream
//! - Hand an unread request remainder back to the middleware for draining
//! - Render captured bytes under the content-type and length policy
//!
//! # Design Decisions
//! - Capture can be switched on after the stream was wrapped; bytes that
//!   flowed before that are not captured
//! - Errors from the inner body propagate unchanged; whatever was captured
//!   up to the error is still reported

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;

/// Suffix appended to bodies cut at the configured maximum length.
pub const TRUNCATION_MARKER: &str = "... [trimmed]";

/// Bounded in-memory copy of a body stream, shared between the stream
/// wrapper and the audit record.
#[derive(Debug, Clone)]
pub struct BodyCapture {
    inner: Arc<CaptureState>,
}

#[derive(Debug)]
struct CaptureState {
    enabled: AtomicBool,
    finished: AtomicBool,
    /// `None` keeps everything.
    limit: Option<usize>,
    buffer: Mutex<Captured>,
}

#[derive(Debug, Default)]
struct Captured {
    bytes: BytesMut,
    truncated: bool,
}

/// Snapshot of captured bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedBody {
    pub bytes: Bytes,
    /// More bytes flowed than the buffer kept.
    pub truncated: bool,
}

impl BodyCapture {
    pub fn new(limit: Option<usize>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(CaptureState {
                enabled: AtomicBool::new(enabled),
                finished: AtomicBool::new(false),
                limit,
                buffer: Mutex::new(Captured::default()),
            }),
        }
    }

    /// Start capturing. Idempotent.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Keep what fits of a chunk flowing through the stream.
    pub fn record(&self, chunk: &[u8]) {
        if !self.is_enabled() || chunk.is_empty() {
            return;
        }

        let mut buf = self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let room = match self.inner.limit {
            Some(limit) => limit.saturating_sub(buf.bytes.len()),
            None => chunk.len(),
        };
        let take = room.min(chunk.len());
        buf.bytes.extend_from_slice(&chunk[..take]);
        if take < chunk.len() {
            buf.truncated = true;
        }
    }

    pub fn mark_finished(&self) {
        self.inner.finished.store(true, Ordering::Release);
    }

    /// The stream reached end-of-stream while wrapped.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CapturedBody {
        let buf = self.inner.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        CapturedBody {
            bytes: Bytes::copy_from_slice(&buf.bytes),
            truncated: buf.truncated,
        }
    }
}

/// Content-type and length policy for captured bodies.
#[derive(Debug, Clone)]
pub struct BodyPolicy {
    /// Content types considered safe to log, matched as prefixes.
    pub content_types: Vec<String>,
    /// Maximum rendered length in bytes; `<= 0` means no limit.
    pub max_len: i64,
}

impl BodyPolicy {
    /// Buffer bound matching the rendered maximum length.
    pub fn capture_limit(&self) -> Option<usize> {
        usize::try_from(self.max_len).ok().filter(|n| *n > 0)
    }

    fn allows(&self, content_type: &str) -> bool {
        self.content_types
            .iter()
            .any(|allowed| content_type.starts_with(allowed.as_str()))
    }

    /// Render a captured body for the record.
    pub fn render(&self, body: &CapturedBody, content_type: &str) -> String {
        self.render_bytes(&body.bytes, body.truncated, content_type)
    }

    pub fn render_bytes(&self, body: &[u8], truncated: bool, content_type: &str) -> String {
        if body.is_empty() {
            return String::new();
        }
        if !self.allows(content_type) {
            return format!("[body redacted for Content-Type: {content_type}]");
        }

        match self.capture_limit() {
            Some(limit) if body.len() > limit => format!(
                "{}{TRUNCATION_MARKER}",
                String::from_utf8_lossy(trim_partial_char(&body[..limit]))
            ),
            _ if truncated => format!(
                "{}{TRUNCATION_MARKER}",
                String::from_utf8_lossy(trim_partial_char(body))
            ),
            _ => String::from_utf8_lossy(body).into_owned(),
        }
    }
}

/// Drop a UTF-8 sequence cut short at the end of `bytes`.
fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    let tail = bytes.len().saturating_sub(3);
    for i in (tail..bytes.len()).rev() {
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if i + width > bytes.len() { &bytes[..i] } else { bytes };
    }
    bytes
}

/// Slot through which a request body that was dropped before end-of-stream
/// is handed back for draining.
#[derive(Clone, Default)]
pub struct UnreadBody {
    slot: Arc<Mutex<Option<Body>>>,
}

impl UnreadBody {
    fn put(&self, body: Body) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(body);
    }

    pub fn take(&self) -> Option<Body> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Read and discard the remainder. Returns the number of bytes drained.
    ///
    /// Read errors stop the drain; the count so far is returned.
    pub async fn drain(&self) -> u64 {
        let Some(mut body) = self.take() else {
            return 0;
        };
        let mut drained = 0u64;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Some(data) = frame.data_ref() {
                        drained += data.len() as u64;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, drained, "Request body drain stopped");
                    break;
                }
            }
        }
        drained
    }
}

/// Request body wrapper that tees into a [`BodyCapture`].
pub struct RequestBodyTap {
    inner: Option<Body>,
    capture: BodyCapture,
    unread: UnreadBody,
}

impl RequestBodyTap {
    pub fn new(inner: Body, capture: BodyCapture, unread: UnreadBody) -> Self {
        Self {
            inner: Some(inner),
            capture,
            unread,
        }
    }
}

impl HttpBody for RequestBodyTap {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.capture.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.capture.mark_finished();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().map_or(true, |b| b.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        self.inner
            .as_ref()
            .map_or_else(|| SizeHint::with_exact(0), |b| b.size_hint())
    }
}

impl Drop for RequestBodyTap {
    fn drop(&mut self) {
        let Some(body) = self.inner.take() else {
            return;
        };
        if body.is_end_stream() {
            self.capture.mark_finished();
        } else if !self.capture.is_finished() {
            self.unread.put(body);
        }
    }
}
