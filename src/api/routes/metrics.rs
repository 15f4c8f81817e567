//! Serving metrics endpoint.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::api::state::AppState;
use crate::metrics::MetricsSnapshot;

/// Counters and latency statistics: `GET /api/metrics`
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
