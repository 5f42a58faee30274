//! request-audit demo server.
//!
//! Serves a handful of routes behind the audit layer so every kind of record
//! can be produced from a terminal:
//!
//! ```text
//! curl -v http://localhost:8080/info
//! curl -v http://localhost:8080/panic
//! curl -v http://localhost:8080/abort
//! curl -v http://localhost:8080/slow            (Ctrl+C the client: aborted record)
//! curl -v http://localhost:8080/noisy           (repeat: quiet-down window)
//! curl -v http://localhost:8080/echo --json '{"data": "valid payload"}'
//! curl -v http://localhost:8080/echo --json '{"data": "valid payload"}' -H 'X-Debug: 1'
//! curl -v http://localhost:8080/echo --json '{"xx": "invalid payload"}'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use request_audit::config::{load_config, AppConfig};
use request_audit::http::shutdown_signal;
use request_audit::observability::init_logging;
use request_audit::{
    curl_request, AbortHandler, Attr, AuditHandle, HttpServer, RequestAuditLayer, RequestSnapshot,
    TracingSink,
};

#[derive(Parser)]
#[command(name = "request-audit")]
#[command(about = "Demo server for the request audit middleware", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in demo settings are used without it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => demo_config(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability.log_filter, config.observability.format)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        level = %config.audit.level,
        schema = ?config.audit.schema,
        concise = config.audit.concise,
        "Configuration loaded"
    );

    let audit = RequestAuditLayer::new(config.audit.clone(), Arc::new(TracingSink))
        .log_request_body_if(has_debug_header)
        .log_response_body_if(has_debug_header)
        .skip_if(|_, status| {
            status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED
        })
        .extra_attrs(|req, body, status| {
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
                vec![Attr::new("curl", curl_request(req, body, &["authorization"]))]
            } else {
                Vec::new()
            }
        });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(app(), audit)
        .run(listener, shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Settings used when no configuration file is given.
fn demo_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audit.request_headers = vec!["Origin".into(), "X-Request-Id".into()];
    config.audit.response_headers = vec!["Content-Type".into()];
    config.audit.quiet_down_routes = vec!["/noisy".into()];
    config.audit.quiet_down_period_secs = 30;
    config
        .audit
        .tags
        .insert("app".into(), env!("CARGO_PKG_NAME").into());
    config
        .audit
        .tags
        .insert("version".into(), env!("CARGO_PKG_VERSION").into());
    config
}

fn has_debug_header(req: &RequestSnapshot) -> bool {
    req.headers.contains_key("x-debug")
}

fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "request-audit demo\n" }))
        .route("/info", get(info))
        .route("/panic", get(explode))
        .route("/abort", get(abort))
        .route("/slow", get(slow))
        .route("/noisy", get(|| async { "noisy\n" }))
        .route("/echo", post(echo))
        .layer(middleware::from_fn(tag_user))
}

/// Attaches the caller identity to the request record.
async fn tag_user(req: Request<Body>, next: Next) -> Response {
    request_audit::set_attrs([Attr::new("user", "user1")]);
    next.run(req).await
}

async fn info() -> impl IntoResponse {
    tracing::info!("info here");
    ([("content-type", "text/plain")], "info here\n")
}

async fn explode() -> &'static str {
    panic!("oh no")
}

async fn abort() -> &'static str {
    std::panic::panic_any(AbortHandler)
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "slow operation completed\n"
}

#[derive(Debug, Deserialize, Serialize)]
struct Payload {
    #[serde(default)]
    data: String,
}

async fn echo(audit: AuditHandle, body: Bytes) -> Response {
    let mut payload: Payload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return reject(&audit, StatusCode::BAD_REQUEST, format!("invalid json: {e}")),
    };
    if payload.data.is_empty() {
        return reject(
            &audit,
            StatusCode::UNPROCESSABLE_ENTITY,
            "data field is required".to_string(),
        );
    }

    payload.data = payload.data.to_uppercase();
    Json(payload).into_response()
}

fn reject(audit: &AuditHandle, status: StatusCode, message: String) -> Response {
    audit.set_error(&message);
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
