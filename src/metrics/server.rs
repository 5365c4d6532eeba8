//! HTTP server for the Prometheus metrics endpoint.

use crate::metrics::MetricsRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while serving metrics.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// HTTP server exposing the pipeline metrics.
///
/// The registry is shared with the streaming thread, which updates it
/// after each frame; the prometheus counter types are internally
/// synchronized, so no further locking is needed here.
pub struct MetricsServer {
    bind_addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
}

impl MetricsServer {
    /// Creates a server for the given registry on `0.0.0.0:port`.
    pub fn new(port: u16, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
            registry,
        }
    }

    /// Runs the HTTP server until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(self.registry);

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "metrics server listening");

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("failed to encode metrics: {e}"),
        ),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
