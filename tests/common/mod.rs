//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use request_audit::audit::attrs_to_map;
use request_audit::{Attr, AuditConfig, AuditSink, Level, RequestAuditLayer};

/// One record as seen by the sink.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub level: Level,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl Emitted {
    /// Attributes rendered as a JSON object.
    pub fn json(&self) -> Value {
        Value::Object(attrs_to_map(&self.attrs))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.attrs.iter().map(|a| a.key.as_str()).collect()
    }
}

/// Sink that keeps every record in memory.
#[derive(Default)]
pub struct MemorySink {
    min_level: Option<Level>,
    records: Mutex<Vec<Emitted>>,
}

impl MemorySink {
    pub fn with_min_level(level: Level) -> Self {
        Self {
            min_level: Some(level),
            records: Mutex::default(),
        }
    }

    pub fn records(&self) -> Vec<Emitted> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Wait until `n` records arrived, for emissions that trail the response.
    pub async fn wait_for(&self, n: usize) -> Vec<Emitted> {
        for _ in 0..100 {
            if self.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.records()
    }
}

impl AuditSink for MemorySink {
    fn enabled(&self, level: Level) -> bool {
        self.min_level.map_or(true, |min| level >= min)
    }

    fn emit(&self, level: Level, message: &str, attrs: &[Attr]) {
        self.records.lock().unwrap().push(Emitted {
            level,
            message: message.to_string(),
            attrs: attrs.to_vec(),
        });
    }
}

/// Wrap `app` in an audit layer writing to a fresh [`MemorySink`].
pub fn audited(app: Router, config: AuditConfig) -> (Router, Arc<MemorySink>) {
    audited_with(app, config, |layer| layer)
}

/// Like [`audited`], with the layer customised by `build` (hooks, schema).
pub fn audited_with<F>(app: Router, config: AuditConfig, build: F) -> (Router, Arc<MemorySink>)
where
    F: FnOnce(RequestAuditLayer) -> RequestAuditLayer,
{
    let sink = Arc::new(MemorySink::default());
    let layer = build(RequestAuditLayer::new(config, sink.clone()));
    (app.layer(layer), sink)
}

/// Drive one request through `app` in-process.
pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

/// Collect a response body, completing the audited stream.
pub async fn body_text(res: Response<Body>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}
