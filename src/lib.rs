//! Cross-Sell Scoring Library
//!
//! Predicts whether an existing health-insurance customer will buy vehicle
//! insurance. Raw customer records are validated and encoded, scored by an
//! ONNX-exported gradient-boosted classifier, thresholded into a decision and
//! explained with importance-weighted feature contributions.

pub mod api;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod threshold;
pub mod types;

pub use config::AppConfig;
pub use error::{ScoreError, ValidationError};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::{Classifier, ScoringEngine};
pub use producer::PredictionPublisher;
pub use types::{customer::RawCustomerRecord, score::ScoreResult};
