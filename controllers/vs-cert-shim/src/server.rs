//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (200 once both watchers finished their initial list)
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT` environment variable).

use crate::error::ControllerError;
use crate::metrics::Metrics;
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state behind the health and metrics handlers
#[derive(Debug)]
pub struct ServerState {
    /// Metrics served on `/metrics`
    pub metrics: Arc<Metrics>,
    virtual_servers_synced: AtomicBool,
    certificates_synced: AtomicBool,
}

impl ServerState {
    /// State with neither watcher synced
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            virtual_servers_synced: AtomicBool::new(false),
            certificates_synced: AtomicBool::new(false),
        }
    }

    /// The VirtualServer watcher finished its first list
    pub fn mark_virtual_servers_synced(&self) {
        self.virtual_servers_synced.store(true, Ordering::Relaxed);
    }

    /// The Certificate watcher finished its first list
    pub fn mark_certificates_synced(&self) {
        self.certificates_synced.store(true, Ordering::Relaxed);
    }

    /// Both watchers have listed once
    pub fn is_ready(&self) -> bool {
        self.virtual_servers_synced.load(Ordering::Relaxed) && self.certificates_synced.load(Ordering::Relaxed)
    }
}

/// Routes for `/metrics`, `/healthz` and `/readyz`
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn start_server(port: u16, state: Arc<ServerState>, shutdown: CancellationToken) -> Result<(), ControllerError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind {addr}: {e}")))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ControllerError::Server(e.to_string()))
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
