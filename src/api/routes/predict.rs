//! Scoring endpoints.
//!
//! - `POST /api/predict` - score one customer, optional `?threshold=`
//! - `POST /api/predict/batch` - score many customers, row failures reported in place
//! - `GET /api/predict/sample` - an example customer payload

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::api::error::{AppError, AppResult};
use crate::api::state::AppState;
use crate::error::ScoreError;
use crate::types::customer::RawCustomerRecord;
use crate::types::score::{BatchScore, RowErrorKind, RowOutcome, ScoreResult};

/// Query parameters for single scoring.
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    pub threshold: Option<f64>,
}

/// Batch request body. Rows stay untyped so one bad row cannot fail the batch.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub customers: Vec<Value>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// Score one customer: `POST /api/predict`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    payload: Result<Json<RawCustomerRecord>, JsonRejection>,
) -> AppResult<Json<ScoreResult>> {
    let engine = state.engine().await?;
    let Query(query) = query?;
    let Json(record) = payload?;

    let threshold = query.threshold;
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || engine.score(&record, threshold)).await?;
    state.metrics.record_latency(started.elapsed());

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            match &e {
                ScoreError::Invalid(_) => state.metrics.record_validation_failure(),
                ScoreError::Inference(_) => state.metrics.record_inference_failure(),
                _ => {}
            }
            return Err(e.into());
        }
    };

    state
        .metrics
        .record_prediction(result.probability, result.prediction);
    if let Some(publisher) = &state.publisher {
        publisher.publish_result(&result).await;
    }

    Ok(Json(result))
}

/// Score many customers: `POST /api/predict/batch`
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> AppResult<Json<BatchScore>> {
    let engine = state.engine().await?;
    let Json(request) = payload?;

    if request.customers.is_empty() {
        return Err(AppError::BadRequest("`customers` must not be empty".into()));
    }
    let limit = state.config.scoring.max_batch_size;
    if request.customers.len() > limit {
        return Err(AppError::TooLarge(format!(
            "batch of {} exceeds the limit of {} customers",
            request.customers.len(),
            limit
        )));
    }

    let started = Instant::now();
    let batch = tokio::task::spawn_blocking(move || {
        engine.score_batch_json(request.customers, request.threshold)
    })
    .await??;
    state.metrics.record_latency(started.elapsed());
    state.metrics.record_batch();

    for outcome in &batch.predictions {
        match outcome {
            RowOutcome::Ok { result, .. } => state
                .metrics
                .record_prediction(result.probability, result.prediction),
            RowOutcome::Error {
                kind: RowErrorKind::Invalid,
                ..
            } => state.metrics.record_validation_failure(),
            RowOutcome::Error {
                kind: RowErrorKind::Inference,
                ..
            } => state.metrics.record_inference_failure(),
        }
    }
    debug!(
        total = batch.total_count,
        failed = batch.failure_count(),
        "Batch request served"
    );

    if let Some(publisher) = &state.publisher {
        publisher.publish_batch(&batch).await;
    }

    Ok(Json(batch))
}

/// Example payload: `GET /api/predict/sample`
///
/// Served without a model so clients can discover the record shape.
pub async fn sample() -> Json<RawCustomerRecord> {
    Json(RawCustomerRecord::sample())
}
