//! Audited server over a real TCP listener.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use request_audit::{AuditConfig, HttpServer, RequestAuditLayer};

mod common;
use common::MemorySink;

#[tokio::test]
async fn test_records_peer_address_and_request_id() {
    let sink = Arc::new(MemorySink::default());
    let config = AuditConfig {
        request_headers: vec!["X-Request-Id".into()],
        ..AuditConfig::default()
    };
    let layer = RequestAuditLayer::new(config, sink.clone());
    let app = Router::new().route("/ping", get(|| async { "pong" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(HttpServer::new(app, layer).run(listener, async {
        let _ = stop_rx.await;
    }));

    let res = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
    assert_eq!(res.status(), 200);
    let request_id = res
        .headers()
        .get("x-request-id")
        .expect("request id propagated")
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(res.text().await.unwrap(), "pong");

    let records = sink.wait_for(1).await;
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["client.ip"], "127.0.0.1");
    assert_eq!(json["url.domain"], addr.to_string());
    assert_eq!(json["http.version"], "HTTP/1.1");
    assert_eq!(json["http.request.headers"]["X-Request-Id"], request_id);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_caller_supplied_request_id_is_kept() {
    let sink = Arc::new(MemorySink::default());
    let config = AuditConfig {
        request_headers: vec!["X-Request-Id".into()],
        ..AuditConfig::default()
    };
    let layer = RequestAuditLayer::new(config, sink.clone());
    let app = Router::new().route("/ping", get(|| async { "pong" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(HttpServer::new(app, layer).run(listener, async {
        let _ = stop_rx.await;
    }));

    let res = reqwest::Client::new()
        .get(format!("http://{addr}/ping"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");
    res.text().await.unwrap();

    let records = sink.wait_for(1).await;
    assert_eq!(records[0].json()["http.request.headers"]["X-Request-Id"], "abc-123");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
