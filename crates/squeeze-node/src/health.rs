//! Health and metrics endpoints.
//!
//! - `GET /health`: status, version and the number of tracked Vary axes.
//! - `GET /health/live`: the process is running.
//! - `GET /health/ready`: the artifact directory is usable.
//! - `GET /metrics`: Prometheus metrics in the OpenMetrics text format.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use squeeze_http::SqueezeState;

/// Health status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is healthy.
    Up,
    /// Component is unhealthy.
    Down,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Crate version.
    pub version: &'static str,
    /// Number of Vary axes with statistics.
    pub vary_axes: usize,
    /// Status of the artifact directory.
    pub artifact_cache: HealthStatus,
}

/// Creates the health and metrics routes.
pub fn health_routes(state: SqueezeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn artifact_cache_status(state: &SqueezeState) -> HealthStatus {
    if state.squeezer.merge_cache().dir().is_dir() {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    }
}

async fn health(State(state): State<SqueezeState>) -> impl IntoResponse {
    let artifact_cache = artifact_cache_status(&state);
    let response = HealthResponse {
        status: artifact_cache,
        version: env!("CARGO_PKG_VERSION"),
        vary_axes: state.squeezer.registry().len(),
        artifact_cache,
    };
    let code = match response.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": HealthStatus::Up }))
}

async fn readiness(State(state): State<SqueezeState>) -> impl IntoResponse {
    let status = artifact_cache_status(&state);
    let code = match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(serde_json::json!({ "status": status })))
}

async fn metrics_handler(State(state): State<SqueezeState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
