// HTTP server for Prometheus metrics and the snapshot board
//
// Listens on (default: 0.0.0.0:9090):
// - /metrics    Prometheus text exposition
// - /health     liveness
// - /snapshots  JSON view of the latest snapshot per domain

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::dashboard::SnapshotBoard;
use crate::metrics;

/// Build the HTTP routes over `board`
pub fn router(board: SnapshotBoard) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/snapshots", get(snapshots_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(board)
}

/// Start the metrics HTTP server
///
/// Runs until the listener fails.
pub async fn start_metrics_server(port: u16, board: SnapshotBoard) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind metrics server")?;

    axum::serve(listener, router(board))
        .await
        .context("Metrics server error")?;

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Latest snapshots
async fn snapshots_handler(State(board): State<SnapshotBoard>) -> impl IntoResponse {
    Json(board.view(Utc::now()))
}
