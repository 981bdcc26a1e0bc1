//! Liveness, probe target and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/dummy", post(dummy))
        .route("/metrics", get(metrics))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// No-op target for endpoint probes.
async fn dummy() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Prometheus metrics.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}
