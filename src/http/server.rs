//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap an application router with request ids and the audit layer
//! - Bind with peer-address info so records carry the client IP
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::middleware::RequestAuditLayer;

/// Audited HTTP server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Layer order, outermost first: request id assignment, request id
    /// propagation to the response, audit, application.
    pub fn new(app: Router, audit: RequestAuditLayer) -> Self {
        let router = app
            .layer(audit)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        Self { router }
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl+C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
