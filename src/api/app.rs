//! Axum application builder.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::routes::{health, metrics, model, predict};
use crate::api::state::AppState;
use crate::config::ServerConfig;

/// Create the Axum application with all routes.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server);

    Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        // Scoring
        .route("/api/predict", post(predict::predict))
        .route("/api/predict/batch", post(predict::predict_batch))
        .route("/api/predict/sample", get(predict::sample))
        // Model management
        .route("/api/model", get(model::get_model))
        .route(
            "/api/model/feature-importance",
            get(model::get_feature_importance),
        )
        .route("/api/model/metrics", get(model::get_model_metrics))
        .route("/api/model/evaluate", post(model::evaluate))
        .route("/api/model/threshold", post(model::set_threshold))
        .route("/api/model/threshold/search", post(model::search_threshold))
        .route("/api/model/reload", post(model::reload))
        // Serving metrics
        .route("/api/metrics", get(metrics::get_metrics))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    match server.allowed_origins() {
        None => base.allow_origin(Any),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(AllowOrigin::list(origins))
        }
    }
}
