//! Model inspection and management endpoints.
//!
//! - `GET /api/model` - loaded model, feature order and serving threshold
//! - `GET /api/model/feature-importance` - global importances, largest first
//! - `GET /api/model/metrics` - validation metrics recorded at training time
//! - `POST /api/model/evaluate` - metrics on caller-supplied labeled records
//! - `POST /api/model/threshold` - set the serving threshold
//! - `POST /api/model/threshold/search` - sweep thresholds and apply the best
//! - `POST /api/model/reload` - load a model from disk

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::api::error::{AppError, AppResult};
use crate::api::state::AppState;
use crate::models::ScoringEngine;
use crate::threshold::{EvaluationMetrics, ThresholdMetric, ThresholdSearch};
use crate::types::customer::{LabeledRecord, RawCustomerRecord};

/// Loaded model description.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub model: String,
    pub model_type: String,
    pub feature_names: Vec<String>,
    pub threshold: f64,
}

impl ModelInfo {
    fn of(engine: &ScoringEngine) -> Self {
        Self {
            model: engine.model_name().to_string(),
            model_type: engine.metadata().model_type.clone(),
            feature_names: engine.feature_names().to_vec(),
            threshold: engine.threshold(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RankedFeature {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Serialize)]
pub struct FeatureImportanceResponse {
    pub model: String,
    pub feature_importance: Vec<RankedFeature>,
}

/// Labeled records for evaluation, each carrying a `response` field.
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub records: Vec<RawCustomerRecord>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    pub threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct ThresholdResponse {
    pub previous: f64,
    pub threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub records: Vec<RawCustomerRecord>,
    #[serde(default)]
    pub metric: ThresholdMetric,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub search: ThresholdSearch,
    /// Serving threshold before the best one was applied
    pub previous_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    pub model_path: String,
    #[serde(default)]
    pub metadata_path: Option<String>,
}

/// Describe the loaded model: `GET /api/model`
pub async fn get_model(State(state): State<Arc<AppState>>) -> AppResult<Json<ModelInfo>> {
    let engine = state.engine().await?;
    Ok(Json(ModelInfo::of(&engine)))
}

/// Global importances: `GET /api/model/feature-importance`
pub async fn get_feature_importance(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<FeatureImportanceResponse>> {
    let engine = state.engine().await?;

    let mut ranked: Vec<RankedFeature> = engine
        .global_importance()
        .into_iter()
        .map(|(feature, importance)| RankedFeature {
            feature,
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    Ok(Json(FeatureImportanceResponse {
        model: engine.model_name().to_string(),
        feature_importance: ranked,
    }))
}

/// Training-time validation metrics: `GET /api/model/metrics`
pub async fn get_model_metrics(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<EvaluationMetrics>> {
    let engine = state.engine().await?;
    engine
        .metadata()
        .validation_metrics
        .clone()
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "no validation metrics recorded for model {}",
                engine.model_name()
            ))
        })
}

/// Evaluate on labeled records: `POST /api/model/evaluate`
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> AppResult<Json<EvaluationMetrics>> {
    let engine = state.engine().await?;
    let Json(request) = payload?;
    let labeled = labeled_records(request.records)?;

    let metrics =
        tokio::task::spawn_blocking(move || engine.evaluate(&labeled, request.threshold)).await??;
    Ok(Json(metrics))
}

/// Set the serving threshold: `POST /api/model/threshold`
pub async fn set_threshold(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ThresholdRequest>, JsonRejection>,
) -> AppResult<Json<ThresholdResponse>> {
    let engine = state.engine().await?;
    let Json(request) = payload?;

    let previous = engine.threshold();
    engine.set_threshold(request.threshold)?;

    Ok(Json(ThresholdResponse {
        previous,
        threshold: engine.threshold(),
    }))
}

/// Sweep thresholds and apply the best: `POST /api/model/threshold/search`
pub async fn search_threshold(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> AppResult<Json<SearchResponse>> {
    let engine = state.engine().await?;
    let Json(request) = payload?;
    let labeled = labeled_records(request.records)?;

    let search_engine = Arc::clone(&engine);
    let search = tokio::task::spawn_blocking(move || {
        search_engine.search_threshold(&labeled, request.metric)
    })
    .await??;

    let previous_threshold = engine.threshold();
    engine.set_threshold(search.best_threshold)?;

    Ok(Json(SearchResponse {
        search,
        previous_threshold,
    }))
}

/// Load a model from disk: `POST /api/model/reload`
///
/// Works in the unavailable state too; this is how an operator recovers a
/// service that started without a usable model.
pub async fn reload(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReloadRequest>, JsonRejection>,
) -> AppResult<Json<ModelInfo>> {
    let Json(request) = payload?;
    let onnx_threads = state.config.model.onnx_threads;
    let fallback_threshold = state.config.scoring.threshold;

    info!(model_path = %request.model_path, "Reloading model");
    let loaded = tokio::task::spawn_blocking(move || {
        ScoringEngine::load(
            &request.model_path,
            request.metadata_path.as_deref(),
            onnx_threads,
            fallback_threshold,
        )
    })
    .await?;

    let engine = match loaded {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Model reload failed");
            return Err(AppError::BadRequest(format!("failed to load model: {:#}", e)));
        }
    };

    let engine = state.install_engine(engine).await;
    Ok(Json(ModelInfo::of(&engine)))
}

fn labeled_records(records: Vec<RawCustomerRecord>) -> AppResult<Vec<LabeledRecord>> {
    if records.is_empty() {
        return Err(AppError::BadRequest("`records` must not be empty".into()));
    }
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            LabeledRecord::from_raw(record)
                .map_err(|e| AppError::BadRequest(format!("record {}: {}", i, e)))
        })
        .collect()
}
