//! ONNX model and metadata loader

use crate::threshold::EvaluationMetrics;
use crate::types::features::default_feature_names;
use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Training-time facts shipped alongside an exported model.
///
/// Written by the training pipeline as JSON next to the ONNX file; the
/// feature order here is the single source of truth for column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model family, e.g. "xgboost" or "lightgbm"
    pub model_type: String,
    /// Feature names in the column order used for training
    #[serde(default = "default_feature_names")]
    pub feature_names: Vec<String>,
    /// Global importances, aligned with `feature_names`
    pub feature_importances: Vec<f64>,
    /// Tuned decision threshold, if one was searched
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Hold-out metrics recorded at training time
    #[serde(default)]
    pub validation_metrics: Option<EvaluationMetrics>,
}

impl ModelMetadata {
    /// Metadata path conventionally paired with a model file
    /// (`models/xgboost.onnx` → `models/xgboost.json`).
    pub fn path_for_model<P: AsRef<Path>>(model_path: P) -> PathBuf {
        model_path.as_ref().with_extension("json")
    }

    /// Read and validate metadata from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model metadata {}", path.display()))?;
        let metadata: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model metadata {}", path.display()))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Write metadata back as pretty JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model metadata {}", path.display()))?;
        info!(path = %path.display(), "Model metadata saved");
        Ok(())
    }

    /// Reject metadata that would silently misalign features.
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            bail!("model metadata lists no features");
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            bail!("duplicate feature '{}' in model metadata", dup);
        }
        if self.feature_importances.len() != self.feature_names.len() {
            bail!(
                "model metadata has {} importances for {} features",
                self.feature_importances.len(),
                self.feature_names.len()
            );
        }
        if let Some(t) = self.threshold {
            if !(t > 0.0 && t < 1.0) {
                bail!("model metadata threshold {} outside (0, 1)", t);
            }
        }
        Ok(())
    }
}

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities
    pub output_name: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Model file not found: {}", path.display());
        }

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        // Classifier exports name the class-probability output "probabilities"
        // or "output_probability"; fall back to the last output.
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
        })
    }
}

/// Model name derived from the file stem (`models/xgboost.onnx` → `xgboost`).
pub fn model_name_from_path<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            model_type: "xgboost".into(),
            feature_names: vec!["age".into(), "vehicle_damage".into()],
            feature_importances: vec![0.4, 0.6],
            threshold: Some(0.35),
            validation_metrics: None,
        }
    }

    #[test]
    fn test_metadata_path_convention() {
        let path = ModelMetadata::path_for_model("models/xgboost.onnx");
        assert_eq!(path, PathBuf::from("models/xgboost.json"));
        assert_eq!(model_name_from_path("models/lgbm_model.onnx"), "lgbm_model");
    }

    #[test]
    fn test_metadata_validation() {
        assert!(metadata().validate().is_ok());

        let mut bad = metadata();
        bad.feature_importances.pop();
        assert!(bad.validate().is_err());

        let mut dup = metadata();
        dup.feature_names[1] = "age".into();
        assert!(dup.validate().is_err());

        let mut threshold = metadata();
        threshold.threshold = Some(1.5);
        assert!(threshold.validate().is_err());
    }

    #[test]
    fn test_metadata_defaults_feature_order() {
        let json = r#"{"model_type": "xgboost", "feature_importances": [0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.05,0.05,0.05,0.05]}"#;
        let metadata: ModelMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.feature_names.len(), 12);
        assert_eq!(metadata.threshold, None);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_metadata_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xgboost.json");
        metadata().save(&path).unwrap();
        assert_eq!(ModelMetadata::load(&path).unwrap(), metadata());
    }

    #[test]
    fn test_missing_metadata_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelMetadata::load(dir.path().join("absent.json")).is_err());
    }
}
