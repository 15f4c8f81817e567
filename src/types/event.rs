//! Prediction event data structures

use crate::types::score::ScoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a prediction was requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Single,
    Batch,
}

/// Event emitted for every successful prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionEvent {
    /// Unique event identifier
    pub prediction_id: String,

    /// Model that produced the score
    pub model: String,

    /// Purchase probability (0.0 - 1.0)
    pub probability: f64,

    /// Binary decision at `threshold`
    pub prediction: bool,

    /// Decision threshold applied
    pub threshold: f64,

    /// Request origin
    pub source: PredictionSource,

    /// Row index within a batch request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,

    /// Event generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl PredictionEvent {
    /// Create an event from a scoring result
    pub fn from_result(result: &ScoreResult, source: PredictionSource) -> Self {
        Self {
            prediction_id: uuid::Uuid::new_v4().to_string(),
            model: result.model.clone(),
            probability: result.probability,
            prediction: result.prediction,
            threshold: result.threshold,
            source,
            batch_index: None,
            timestamp: Utc::now(),
        }
    }

    /// Tag the event with its position in a batch
    pub fn with_batch_index(mut self, index: usize) -> Self {
        self.batch_index = Some(index);
        self
    }
}
