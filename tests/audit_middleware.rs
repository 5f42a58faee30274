//! End-to-end behaviour of the audit layer driven in-process.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use http_body_util::BodyExt;
use serde_json::json;

use request_audit::audit::CLIENT_ABORTED;
use request_audit::{AbortHandler, Attr, AuditConfig, AuditHandle, Level, SchemaKind};

mod common;
use common::{audited, audited_with, body_text, get as get_req, send};

fn app() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/panic", get(explode))
        .route("/abort", get(abort))
        .route("/noisy", get(|| async { "noisy" }))
        .route(
            "/echo",
            post(|body: Bytes| async move {
                ([(header::CONTENT_TYPE, "application/json")], body)
            }),
        )
        .route(
            "/image",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
        )
        .route("/ignore-body", post(|| async { "ignored" }))
        .route(
            "/too-many",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        )
        .route("/slow", get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "late"
        }))
        .route(
            "/annotated",
            get(|audit: AuditHandle| async move {
                audit.set_attrs([Attr::new("user", "user1")]);
                request_audit::set_attrs([Attr::new("tenant", "acme")]);
                request_audit::set_level(Level::Debug);
                "ok"
            }),
        )
}

async fn explode() -> &'static str {
    panic!("oh no")
}

async fn abort() -> &'static str {
    std::panic::panic_any(AbortHandler)
}

fn post_json(uri: &str, body: &'static str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_ping_default_config() {
    let (app, sink) = audited(app(), AuditConfig::default());
    let res = send(&app, get_req("/ping")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "pong");

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.level, Level::Info);
    assert!(record.message.starts_with("GET /ping => HTTP 200 ("));

    let json = record.json();
    assert_eq!(json["http.request.method"], "GET");
    assert_eq!(json["url.path"], "/ping");
    assert_eq!(json["http.response.status_code"], 200);
    assert_eq!(json["http.response.body.bytes"], 4);
    assert!(json["event.duration"].is_f64());
    assert!(json.get("http.request.body.content").is_none());
    assert!(json.get("http.response.body.content").is_none());
}

#[tokio::test]
async fn test_panic_is_recovered_with_500() {
    let (app, sink) = audited(app(), AuditConfig::default());
    let res = send(&app, get_req("/panic")).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::Error);
    assert_eq!(records[0].attrs[0], Attr::new("error.message", "panic: oh no"));
    assert!(records[0].json()["error.stack_trace"].is_array());
    let json = records[0].json();
    let file = json["log.origin.file.name"].as_str().unwrap();
    assert!(file.ends_with("audit_middleware.rs"), "{file}");
    assert!(json["log.origin.file.line"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_panic_reraised_when_recovery_disabled() {
    let config = AuditConfig {
        recover_panics: false,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    let result = AssertUnwindSafe(send(&app, get_req("/panic")))
        .catch_unwind()
        .await;
    assert!(result.is_err());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].json()["error.message"], "panic: oh no");
    assert_eq!(records[0].level, Level::Error);
}

#[tokio::test]
async fn test_abort_sentinel_always_reraised_after_emission() {
    let (app, sink) = audited(app(), AuditConfig::default());

    let result = AssertUnwindSafe(send(&app, get_req("/abort")))
        .catch_unwind()
        .await;
    let payload = result.unwrap_err();
    assert!(payload.is::<AbortHandler>());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["error.message"], "panic: request handler aborted");
    assert!(json.get("error.stack_trace").is_none());
}

#[tokio::test]
async fn test_client_abort_before_response() {
    let (app, sink) = audited(app(), AuditConfig::default());

    let pending = send(&app, get_req("/slow"));
    assert!(tokio::time::timeout(Duration::from_millis(50), pending)
        .await
        .is_err());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["error.message"], CLIENT_ABORTED);
    assert_eq!(json["error.type"], "ClientAborted");
}

#[tokio::test]
async fn test_client_abort_mid_body() {
    let streaming = Router::new().route(
        "/stream",
        get(|| async {
            let first = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"first"))]);
            Body::from_stream(first.chain(stream::pending()))
        }),
    );
    let (app, sink) = audited(streaming, AuditConfig::default());

    let res = send(&app, get_req("/stream")).await;
    let mut body = res.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first"));
    assert_eq!(sink.len(), 0);
    drop(body);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["http.response.body.bytes"], 5);
    assert_eq!(json["error.type"], "ClientAborted");
}

#[tokio::test]
async fn test_quiet_down_suppresses_repeats() {
    let config = AuditConfig {
        quiet_down_routes: vec!["/noisy".into()],
        quiet_down_period_secs: 60,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    for _ in 0..2 {
        let res = send(&app, get_req("/noisy")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "noisy");
    }
    let res = send(&app, get_req("/ping")).await;
    body_text(res).await;

    let paths: Vec<_> = sink
        .records()
        .iter()
        .map(|r| r.json()["url.path"].clone())
        .collect();
    assert_eq!(paths, [json!("/noisy"), json!("/ping")]);
}

#[tokio::test]
async fn test_bodies_logged_when_enabled() {
    let config = AuditConfig {
        log_request_body: true,
        log_response_body: true,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    let res = send(&app, post_json("/echo", r#"{"data":"x"}"#)).await;
    assert_eq!(body_text(res).await, r#"{"data":"x"}"#);

    let json = sink.records()[0].json();
    assert_eq!(json["http.request.body.content"], r#"{"data":"x"}"#);
    assert_eq!(json["http.response.body.content"], r#"{"data":"x"}"#);
    assert_eq!(json["http.request.body.bytes"], 12);
}

#[tokio::test]
async fn test_body_redacted_and_truncated() {
    let config = AuditConfig {
        log_request_body: true,
        log_response_body: true,
        body_max_len: 10,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    let res = send(&app, get_req("/image")).await;
    body_text_lossy(res).await;
    let res = send(&app, post_json("/echo", "0123456789abcdefghij")).await;
    body_text(res).await;

    let records = sink.records();
    assert_eq!(
        records[0].json()["http.response.body.content"],
        "[body redacted for Content-Type: image/png]"
    );
    assert_eq!(
        records[1].json()["http.request.body.content"],
        "0123456789... [trimmed]"
    );
}

async fn body_text_lossy(res: axum::http::Response<Body>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_body_capture_by_predicate() {
    let (app, sink) = audited_with(app(), AuditConfig::default(), |layer| {
        layer
            .log_request_body_if(|req| req.headers.contains_key("x-debug"))
            .log_response_body_if(|req| req.headers.contains_key("x-debug"))
    });

    let res = send(&app, post_json("/echo", r#"{"a":1}"#)).await;
    body_text(res).await;

    let mut req = post_json("/echo", r#"{"a":2}"#);
    req.headers_mut().insert("x-debug", "1".parse().unwrap());
    let res = send(&app, req).await;
    body_text(res).await;

    let records = sink.records();
    assert!(records[0].json().get("http.request.body.content").is_none());
    assert_eq!(records[1].json()["http.request.body.content"], r#"{"a":2}"#);
    assert_eq!(records[1].json()["http.response.body.content"], r#"{"a":2}"#);
}

#[tokio::test]
async fn test_unread_request_body_is_drained() {
    let config = AuditConfig {
        log_request_body: true,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    let res = send(&app, post_json("/ignore-body", "0123456789")).await;
    assert_eq!(body_text(res).await, "ignored");

    let json = sink.records()[0].json();
    assert_eq!(json["http.request.body.unread.bytes"], 10);
    assert_eq!(json["http.request.body.content"], "");
}

#[tokio::test]
async fn test_selected_headers() {
    let config = AuditConfig {
        request_headers: vec!["Origin".into(), "X-Multi".into(), "Authorization".into()],
        response_headers: vec!["Content-Type".into()],
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    let req = Request::get("/ping")
        .header("origin", "https://example.com")
        .header("x-multi", "1")
        .header("x-multi", "2")
        .header("cookie", "secret")
        .body(Body::empty())
        .unwrap();
    body_text(send(&app, req).await).await;

    let json = sink.records()[0].json();
    assert_eq!(
        json["http.request.headers"],
        json!({"Origin": "https://example.com", "X-Multi": ["1", "2"]})
    );
    assert_eq!(
        json["http.response.headers"],
        json!({"Content-Type": "text/plain; charset=utf-8"})
    );
}

#[tokio::test]
async fn test_gcp_schema_nests_http_request() {
    let config = AuditConfig {
        schema: SchemaKind::Gcp,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);
    body_text(send(&app, get_req("/ping")).await).await;

    let json = sink.records()[0].json();
    assert_eq!(json["httpRequest"]["requestMethod"], "GET");
    assert_eq!(json["httpRequest"]["status"], 200);
    assert!(json.get("httpRequest:status").is_none());
}

#[tokio::test]
async fn test_handler_attrs_and_level() {
    let config = AuditConfig {
        level: Level::Warn,
        ..AuditConfig::default()
    };
    let (app, sink) = audited(app(), config);

    body_text(send(&app, get_req("/ping")).await).await;
    body_text(send(&app, get_req("/annotated")).await).await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let keys = records[0].keys();
    assert_eq!(&keys[keys.len() - 2..], ["user", "tenant"]);
}

#[tokio::test]
async fn test_rate_limited_is_info() {
    let (app, sink) = audited(app(), AuditConfig::default());
    body_text(send(&app, get_req("/too-many")).await).await;
    assert_eq!(sink.records()[0].level, Level::Info);
}

#[tokio::test]
async fn test_skip_and_extra_attrs_hooks() {
    let (app, sink) = audited_with(app(), AuditConfig::default(), |layer| {
        layer
            .skip_if(|_, status| status == StatusCode::NOT_FOUND)
            .extra_attrs(|req, body, status| {
                vec![Attr::new(
                    "curl",
                    request_audit::curl_request(req, &format!("{body}:{}", status.as_u16()), &[]),
                )]
            })
    });

    body_text(send(&app, get_req("/missing")).await).await;
    assert_eq!(sink.len(), 0);

    body_text(send(&app, post_json("/echo", "{}")).await).await;
    let records = sink.records();
    assert_eq!(records.len(), 1);
    let curl = records[0].json()["curl"].as_str().unwrap().to_string();
    assert!(curl.contains("--data-raw '{}:200'"), "{curl}");
    // The hook forces capture but not logging of the request body.
    assert!(records[0].json().get("http.request.body.content").is_none());
}

#[tokio::test]
async fn test_sink_gate_short_circuits() {
    use std::sync::Arc;

    let sink = Arc::new(common::MemorySink::with_min_level(Level::Error));
    let layer = request_audit::RequestAuditLayer::new(AuditConfig::default(), sink.clone());
    let app = app().layer(layer);

    body_text(send(&app, get_req("/ping")).await).await;
    assert_eq!(send(&app, get_req("/panic")).await.status(), 500);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_exactly_once_under_concurrency() {
    let (app, sink) = audited(app(), AuditConfig::default());

    let mut tasks = Vec::new();
    for i in 0..30 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            let uri = if i % 3 == 0 { "/panic" } else { "/ping" };
            let res = send(&app, get_req(uri)).await;
            body_text(res).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(sink.len(), 30);
}

#[tokio::test]
async fn test_late_capture_through_handle() {
    let app = Router::new().route(
        "/debug",
        post(|audit: AuditHandle, body: Bytes| async move {
            audit.enable_response_body_capture();
            audit.enable_response_body_capture();
            String::from_utf8_lossy(&body).to_uppercase()
        }),
    );
    let (app, sink) = audited(app, AuditConfig::default());

    let req = Request::post("/debug").body(Body::from("hello")).unwrap();
    assert_eq!(body_text(send(&app, req).await).await, "HELLO");

    let json = sink.records()[0].json();
    assert_eq!(json["http.response.body.content"], "HELLO");
    assert!(json.get("http.request.body.content").is_none());
}

#[tokio::test]
async fn test_panic_on_upgrade_is_reraised() {
    let (app, sink) = audited(app(), AuditConfig::default());

    let req = Request::get("/panic")
        .header(header::CONNECTION, "keep-alive, Upgrade")
        .header(header::UPGRADE, "websocket")
        .body(Body::empty())
        .unwrap();
    let result = AssertUnwindSafe(send(&app, req)).catch_unwind().await;
    assert!(result.is_err());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["error.message"], "panic: oh no");
    assert_eq!(json["http.response.status_code"], 500);
}

#[tokio::test]
async fn test_panicking_hooks_keep_response_and_record() {
    let (app, sink) = audited_with(app(), AuditConfig::default(), |layer| {
        layer
            .log_response_body_if(|_| panic!("predicate bug"))
            .skip_if(|_, _| panic!("skip bug"))
            .extra_attrs(|_, _, _| panic!("extra bug"))
    });

    let res = send(&app, get_req("/ping")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "pong");

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let json = records[0].json();
    assert_eq!(json["url.path"], "/ping");
    assert!(json.get("http.response.body.content").is_none());
}
