//! Health check endpoints.
//!
//! - `GET /health` - Liveness probe (always 200 if the server is up)
//! - `GET /health/ready` - Readiness probe (`ready=false` until a model is loaded)

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub model_loaded: bool,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Liveness probe: `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        model_loaded: state.is_ready().await,
    })
}

/// Readiness probe: `GET /health/ready`
///
/// Answers 503 while no model is loaded so orchestrators hold traffic back.
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    match state.engine().await {
        Ok(engine) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                model: Some(engine.model_name().to_string()),
                reason: None,
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                model: None,
                reason: state.unavailable_reason().await,
            }),
        ),
    }
}
