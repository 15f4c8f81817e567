//! Error types for the scoring pipeline

use thiserror::Error;

/// A raw customer field failed validation.
///
/// Carries the normalized name of the offending field so API clients can
/// point users at the exact input to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while scoring customer records.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// Input record rejected by preprocessing.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Decision threshold outside the open interval (0, 1).
    #[error("threshold {0} must lie strictly between 0 and 1")]
    InvalidThreshold(f64),

    /// Classifier failed or produced an unusable probability.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Input row is not a customer record at all (e.g. a bare number).
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Nothing usable to evaluate (e.g. every labeled row was rejected).
    #[error("no usable rows: {0}")]
    EmptyInput(String),
}

impl ScoreError {
    /// Whether the caller supplied bad input (as opposed to a server fault).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScoreError::Invalid(_)
                | ScoreError::InvalidThreshold(_)
                | ScoreError::Malformed(_)
                | ScoreError::EmptyInput(_)
        )
    }
}

/// Check that a decision threshold lies in (0, 1).
pub fn validate_threshold(threshold: f64) -> Result<f64, ScoreError> {
    if threshold.is_finite() && threshold > 0.0 && threshold < 1.0 {
        Ok(threshold)
    } else {
        Err(ScoreError::InvalidThreshold(threshold))
    }
}
