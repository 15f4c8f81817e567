//! ML model inference components

pub mod attribution;
pub mod inference;
pub mod loader;

pub use attribution::FeatureImportance;
pub use inference::{Classifier, OnnxClassifier, ScoringEngine};
pub use loader::{ModelLoader, ModelMetadata};
