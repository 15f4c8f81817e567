//! Scoring result data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How per-prediction feature contributions were derived.
///
/// Only one method exists today. It is an approximation: global model
/// importances scaled by z-scored feature values, not a Shapley attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    #[default]
    ImportanceWeightedZscore,
}

/// Outcome of scoring a single customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Probability of purchasing the add-on (0.0 - 1.0)
    pub probability: f64,
    /// `probability >= threshold`
    pub prediction: bool,
    /// Decision threshold applied
    pub threshold: f64,
    /// Signed contribution per feature
    pub feature_importance: BTreeMap<String, f64>,
    /// Method behind `feature_importance`
    pub attribution: Attribution,
    /// Model that produced the probability
    pub model: String,
}

impl ScoreResult {
    pub fn new(probability: f64, threshold: f64, model: impl Into<String>) -> Self {
        Self {
            probability,
            prediction: probability >= threshold,
            threshold,
            feature_importance: BTreeMap::new(),
            attribution: Attribution::default(),
            model: model.into(),
        }
    }

    pub fn with_feature_importance(mut self, importance: BTreeMap<String, f64>) -> Self {
        self.feature_importance = importance;
        self
    }

    /// Features ordered by absolute contribution, largest first.
    pub fn top_features(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_importance
            .iter()
            .map(|(k, &v)| (k.as_str(), v))
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(n);
        ranked
    }
}

/// Why a batch row failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowErrorKind {
    /// The row itself was unusable
    Invalid,
    /// The model failed on a valid row
    Inference,
}

/// Per-row outcome in a batch; one bad row never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RowOutcome {
    Ok {
        index: usize,
        #[serde(flatten)]
        result: ScoreResult,
    },
    Error {
        index: usize,
        kind: RowErrorKind,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl RowOutcome {
    pub fn index(&self) -> usize {
        match self {
            RowOutcome::Ok { index, .. } | RowOutcome::Error { index, .. } => *index,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RowOutcome::Ok { .. })
    }

    pub fn result(&self) -> Option<&ScoreResult> {
        match self {
            RowOutcome::Ok { result, .. } => Some(result),
            RowOutcome::Error { .. } => None,
        }
    }
}

/// Aggregated response for a scored batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchScore {
    pub predictions: Vec<RowOutcome>,
    pub success_count: usize,
    pub total_count: usize,
}

impl BatchScore {
    pub fn from_outcomes(predictions: Vec<RowOutcome>) -> Self {
        let success_count = predictions.iter().filter(|o| o.is_ok()).count();
        let total_count = predictions.len();
        Self {
            predictions,
            success_count,
            total_count,
        }
    }

    pub fn failure_count(&self) -> usize {
        self.total_count - self.success_count
    }
}
