//! Scoring engine for cross-sell propensity

use crate::config::{ModelConfig, ScoringConfig};
use crate::error::{validate_threshold, ScoreError};
use crate::feature_extractor::FeatureExtractor;
use crate::models::attribution::{ColumnStats, FeatureImportance};
use crate::models::loader::{model_name_from_path, LoadedModel, ModelLoader, ModelMetadata};
use crate::threshold::{self, EvaluationMetrics, ThresholdMetric, ThresholdSearch};
use crate::types::customer::{LabeledRecord, RawCustomerRecord};
use crate::types::features::FeatureVector;
use crate::types::score::{BatchScore, RowErrorKind, RowOutcome, ScoreResult};
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A trained binary classifier.
///
/// Implementations return the probability of the positive class (the
/// customer buys the add-on) for one encoded feature row.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict_proba(&self, features: &[f32]) -> Result<f64>;
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    name: String,
    /// Sessions need `&mut` to run
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    /// Load an exported model from disk
    pub fn load<P: AsRef<Path>>(path: P, name: &str, onnx_threads: usize) -> Result<Self> {
        let loader = ModelLoader::with_threads(onnx_threads)?;
        let model = loader.load_model(path, name)?;
        Ok(Self {
            name: name.to_string(),
            model: Mutex::new(model),
        })
    }

    /// Extract positive-class probability from model output.
    /// Handles both tensor outputs (XGBoost, Random Forest) and seq(map)
    /// outputs (CatBoost, LightGBM).
    fn extract_probability(
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        model_name: &str,
    ) -> Result<f64> {
        if let Some(output) = outputs.get(output_name) {
            if let Some(prob) = Self::probability_from_value(output, model_name) {
                return Ok(prob);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = Self::probability_from_value(&output, model_name) {
                debug!(model = %model_name, output = %name, "Probability read from fallback output");
                return Ok(prob);
            }
        }

        anyhow::bail!("model {} produced no readable probability output", model_name)
    }

    fn probability_from_value(output: &ort::value::DynValue, model_name: &str) -> Option<f64> {
        if let Ok(tensor) = output.try_extract_tensor::<f32>() {
            let (shape, data) = tensor;
            let dims: Vec<i64> = shape.iter().copied().collect();
            let prob = Self::positive_prob_from_tensor(&dims, data);
            debug!(model = %model_name, prob = ?prob, "Extracted from tensor");
            return prob;
        }

        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            match Self::extract_from_sequence_map(output) {
                Ok(prob) => {
                    debug!(model = %model_name, prob = prob, "Extracted from seq(map)");
                    return Some(prob);
                }
                Err(e) => warn!(model = %model_name, error = %e, "Unreadable seq(map) output"),
            }
        }

        None
    }

    /// Extract probability from seq(map(int64, float)) format
    fn extract_from_sequence_map(output: &ort::value::DynValue) -> Result<f64> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
        let map_value = maps
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;

        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
            return Ok(*prob as f64);
        }
        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
            return Ok(1.0 - *prob as f64);
        }

        Err(anyhow::anyhow!("No probability found in map"))
    }

    /// Positive-class probability from a `[batch, classes]` or `[classes]` tensor
    fn positive_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
        let classes = dims.last().copied().unwrap_or(0);
        match classes {
            c if c >= 2 => data.get(1).map(|&v| v as f64),
            1 => data.first().map(|&v| v as f64),
            _ => None,
        }
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        use ort::value::Tensor;

        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let model: &mut LoadedModel = &mut guard;

        // Input tensor shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor =
            Tensor::from_array((shape, features.to_vec())).context("Failed to create input tensor")?;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        Self::extract_probability(&outputs, &model.output_name, &model.name)
    }
}

/// Scores raw customer records end to end: preprocessing, inference,
/// thresholding and attribution.
pub struct ScoringEngine {
    classifier: Box<dyn Classifier>,
    extractor: FeatureExtractor,
    importance: FeatureImportance,
    metadata: ModelMetadata,
    /// Serving default, replaceable at runtime
    threshold: RwLock<f64>,
}

impl ScoringEngine {
    /// Build an engine around an already-loaded classifier.
    ///
    /// `fallback_threshold` applies only when the metadata carries no tuned
    /// threshold.
    pub fn new(
        classifier: Box<dyn Classifier>,
        metadata: ModelMetadata,
        fallback_threshold: f64,
    ) -> Result<Self> {
        metadata.validate()?;
        let threshold = validate_threshold(metadata.threshold.unwrap_or(fallback_threshold))?;
        let importance =
            FeatureImportance::new(&metadata.feature_names, &metadata.feature_importances)?;
        let extractor = FeatureExtractor::with_feature_names(metadata.feature_names.clone());

        info!(
            model = %classifier.name(),
            model_type = %metadata.model_type,
            features = extractor.feature_count(),
            threshold = threshold,
            "Scoring engine initialized"
        );

        Ok(Self {
            classifier,
            extractor,
            importance,
            metadata,
            threshold: RwLock::new(threshold),
        })
    }

    /// Load the ONNX model and its metadata as configured.
    pub fn from_config(model: &ModelConfig, scoring: &ScoringConfig) -> Result<Self> {
        Self::load(
            &model.model_path,
            model.metadata_path.as_deref(),
            model.onnx_threads,
            scoring.threshold,
        )
    }

    /// Load an ONNX model plus metadata (defaulting to the sibling `.json`).
    pub fn load(
        model_path: &str,
        metadata_path: Option<&str>,
        onnx_threads: usize,
        fallback_threshold: f64,
    ) -> Result<Self> {
        let metadata_path = metadata_path
            .map(PathBuf::from)
            .unwrap_or_else(|| ModelMetadata::path_for_model(model_path));
        let metadata = ModelMetadata::load(&metadata_path)?;
        let name = model_name_from_path(model_path);
        let classifier = OnnxClassifier::load(model_path, &name, onnx_threads)?;
        Self::new(Box::new(classifier), metadata, fallback_threshold)
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn feature_names(&self) -> &[String] {
        self.extractor.feature_names()
    }

    /// Global importances of the loaded model
    pub fn global_importance(&self) -> BTreeMap<String, f64> {
        self.importance.as_map()
    }

    /// Current serving threshold
    pub fn threshold(&self) -> f64 {
        self.threshold.read().map(|t| *t).unwrap_or_else(|e| *e.into_inner())
    }

    /// Replace the serving threshold
    pub fn set_threshold(&self, threshold: f64) -> Result<(), ScoreError> {
        let threshold = validate_threshold(threshold)?;
        match self.threshold.write() {
            Ok(mut t) => *t = threshold,
            Err(e) => *e.into_inner() = threshold,
        }
        info!(threshold = threshold, "Serving threshold updated");
        Ok(())
    }

    fn resolve_threshold(&self, threshold: Option<f64>) -> Result<f64, ScoreError> {
        match threshold {
            Some(t) => validate_threshold(t),
            None => Ok(self.threshold()),
        }
    }

    /// Score one record.
    pub fn score(
        &self,
        raw: &RawCustomerRecord,
        threshold: Option<f64>,
    ) -> Result<ScoreResult, ScoreError> {
        let threshold = self.resolve_threshold(threshold)?;
        let vector = self.extractor.extract(raw)?;
        let probability = self.predict_vector(&vector)?;
        let contributions = self.importance.contributions_single(&vector);

        debug!(
            probability = probability,
            threshold = threshold,
            "Record scored"
        );

        Ok(ScoreResult::new(probability, threshold, self.model_name())
            .with_feature_importance(contributions))
    }

    /// Score rows independently; a failing row is reported in place and
    /// never aborts the batch. Only an invalid threshold fails the call.
    pub fn score_batch(
        &self,
        rows: &[RawCustomerRecord],
        threshold: Option<f64>,
    ) -> Result<BatchScore, ScoreError> {
        let threshold = self.resolve_threshold(threshold)?;
        let vectors: Vec<Result<FeatureVector, ScoreError>> = self
            .extractor
            .extract_batch(rows)
            .into_iter()
            .map(|v| v.map_err(ScoreError::from))
            .collect();
        Ok(self.score_vectors(vectors, threshold))
    }

    /// Like [`ScoringEngine::score_batch`] for rows straight off the wire.
    /// A row that is not a JSON object fails on its own.
    pub fn score_batch_json(
        &self,
        rows: Vec<Value>,
        threshold: Option<f64>,
    ) -> Result<BatchScore, ScoreError> {
        let threshold = self.resolve_threshold(threshold)?;
        let vectors: Vec<Result<FeatureVector, ScoreError>> = rows
            .into_iter()
            .map(|row| -> Result<FeatureVector, ScoreError> {
                let record = RawCustomerRecord::try_from(row)?;
                Ok(self.extractor.extract(&record)?)
            })
            .collect();
        Ok(self.score_vectors(vectors, threshold))
    }

    fn score_vectors(
        &self,
        vectors: Vec<Result<FeatureVector, ScoreError>>,
        threshold: f64,
    ) -> BatchScore {
        // Column statistics need at least two valid rows to mean anything.
        let valid = vectors.iter().filter(|v| v.is_ok()).count();
        let stats = if valid > 1 {
            ColumnStats::from_vectors(vectors.iter().filter_map(|v| v.as_ref().ok()))
        } else {
            None
        };

        let outcomes = vectors
            .into_iter()
            .enumerate()
            .map(|(index, vector)| {
                let scored = vector.and_then(|vector| {
                    let probability = self.predict_vector(&vector)?;
                    let contributions = match &stats {
                        Some(stats) => self.importance.contributions_in_batch(&vector, stats),
                        None => self.importance.contributions_single(&vector),
                    };
                    Ok(ScoreResult::new(probability, threshold, self.model_name())
                        .with_feature_importance(contributions))
                });

                match scored {
                    Ok(result) => RowOutcome::Ok { index, result },
                    Err(e) => {
                        warn!(row = index, error = %e, "Batch row failed");
                        let field = match &e {
                            ScoreError::Invalid(v) => Some(v.field.clone()),
                            _ => None,
                        };
                        let kind = if e.is_client_error() {
                            RowErrorKind::Invalid
                        } else {
                            RowErrorKind::Inference
                        };
                        RowOutcome::Error {
                            index,
                            kind,
                            reason: e.to_string(),
                            field,
                        }
                    }
                }
            })
            .collect();

        let batch = BatchScore::from_outcomes(outcomes);
        info!(
            total = batch.total_count,
            succeeded = batch.success_count,
            threshold = threshold,
            "Batch scored"
        );
        batch
    }

    /// Probabilities for labeled rows, skipping rows that fail.
    ///
    /// Returns the `(probability, label)` pairs and the number skipped.
    pub fn score_labeled(&self, rows: &[LabeledRecord]) -> (Vec<(f64, bool)>, usize) {
        let mut scored = Vec::with_capacity(rows.len());
        let mut skipped = 0;

        for (index, row) in rows.iter().enumerate() {
            let probability = self
                .extractor
                .extract(&row.record)
                .map_err(ScoreError::from)
                .and_then(|v| self.predict_vector(&v));
            match probability {
                Ok(p) => scored.push((p, row.label)),
                Err(e) => {
                    skipped += 1;
                    debug!(row = index, error = %e, "Labeled row skipped");
                }
            }
        }

        if skipped > 0 {
            warn!(skipped = skipped, total = rows.len(), "Labeled rows skipped");
        }
        (scored, skipped)
    }

    /// Sweep thresholds on labeled rows. Does not change the serving threshold.
    pub fn search_threshold(
        &self,
        rows: &[LabeledRecord],
        metric: ThresholdMetric,
    ) -> Result<ThresholdSearch, ScoreError> {
        let (scored, _) = self.score_labeled(rows);
        if scored.is_empty() {
            return Err(ScoreError::EmptyInput("no labeled row could be scored".into()));
        }
        let search = threshold::search_threshold(&scored, metric);
        info!(
            metric = %metric,
            best_threshold = search.best_threshold,
            best_score = search.best_score,
            samples = search.samples,
            "Threshold search complete"
        );
        Ok(search)
    }

    /// Evaluate on labeled rows at the given or current threshold.
    pub fn evaluate(
        &self,
        rows: &[LabeledRecord],
        threshold: Option<f64>,
    ) -> Result<EvaluationMetrics, ScoreError> {
        let threshold = self.resolve_threshold(threshold)?;
        let (scored, _) = self.score_labeled(rows);
        if scored.is_empty() {
            return Err(ScoreError::EmptyInput("no labeled row could be scored".into()));
        }
        Ok(threshold::evaluate(&scored, threshold))
    }

    fn predict_vector(&self, vector: &FeatureVector) -> Result<f64, ScoreError> {
        let probability = self
            .classifier
            .predict_proba(&vector.to_f32())
            .map_err(|e| ScoreError::Inference(e.to_string()))?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(ScoreError::Inference(format!(
                "model {} returned probability {} outside [0, 1]",
                self.model_name(),
                probability
            )));
        }
        Ok(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::features::default_feature_names;

    /// Probability driven by vehicle damage and prior insurance, like the
    /// real model's dominant splits.
    struct DamageClassifier;

    impl Classifier for DamageClassifier {
        fn name(&self) -> &str {
            "stub"
        }

        fn predict_proba(&self, features: &[f32]) -> Result<f64> {
            // default order: previously_insured = 4, vehicle_damage = 6
            let damage = features[6] as f64;
            let insured = features[4] as f64;
            Ok(0.1 + 0.6 * damage - 0.05 * insured)
        }
    }

    struct BrokenClassifier(f64);

    impl Classifier for BrokenClassifier {
        fn name(&self) -> &str {
            "broken"
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn metadata(threshold: Option<f64>) -> ModelMetadata {
        let names = default_feature_names();
        let n = names.len();
        ModelMetadata {
            model_type: "xgboost".into(),
            feature_names: names,
            feature_importances: vec![1.0 / n as f64; n],
            threshold,
            validation_metrics: None,
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(Box::new(DamageClassifier), metadata(None), 0.45).unwrap()
    }

    #[test]
    fn test_metadata_threshold_wins() {
        let engine = ScoringEngine::new(Box::new(DamageClassifier), metadata(Some(0.3)), 0.45).unwrap();
        assert_eq!(engine.threshold(), 0.3);
        assert_eq!(self::engine().threshold(), 0.45);
    }

    #[test]
    fn test_score_single() {
        let engine = engine();
        let result = engine.score(&RawCustomerRecord::sample(), None).unwrap();

        assert!((result.probability - 0.7).abs() < 1e-6);
        assert!(result.prediction);
        assert_eq!(result.threshold, 0.45);
        assert_eq!(result.model, "stub");
        assert_eq!(result.feature_importance.len(), 12);
    }

    #[test]
    fn test_prediction_matches_threshold() {
        let engine = engine();
        let raw = RawCustomerRecord::sample();
        for k in 1..100 {
            let t = k as f64 / 100.0;
            let result = engine.score(&raw, Some(t)).unwrap();
            assert_eq!(result.prediction, result.probability >= t, "threshold {t}");
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let engine = engine();
        let err = engine.score(&RawCustomerRecord::sample(), Some(1.0)).unwrap_err();
        assert!(matches!(err, ScoreError::InvalidThreshold(_)));
        assert!(engine.set_threshold(0.0).is_err());
        assert!(engine.set_threshold(0.6).is_ok());
        assert_eq!(engine.threshold(), 0.6);
    }

    #[test]
    fn test_out_of_range_probability_is_inference_error() {
        for bad in [1.2, -0.1, f64::NAN] {
            let engine =
                ScoringEngine::new(Box::new(BrokenClassifier(bad)), metadata(None), 0.5).unwrap();
            let err = engine.score(&RawCustomerRecord::sample(), None).unwrap_err();
            assert!(matches!(err, ScoreError::Inference(_)));
        }
    }

    #[test]
    fn test_batch_isolates_malformed_row() {
        let engine = engine();
        let rows = vec![
            RawCustomerRecord::sample(),
            RawCustomerRecord::sample().with("vehicle_damage", "No"),
            RawCustomerRecord::sample().with("age", 12),
            RawCustomerRecord::sample().with("previously_insured", 1),
        ];
        let batch = engine.score_batch(&rows, None).unwrap();

        assert_eq!(batch.total_count, 4);
        assert_eq!(batch.success_count, 3);
        match &batch.predictions[2] {
            RowOutcome::Error { index, field, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(field.as_deref(), Some("age"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!batch.predictions[1].result().unwrap().prediction);
    }

    #[test]
    fn test_json_batch_reports_non_object_rows() {
        let sample = serde_json::to_value(RawCustomerRecord::sample()).unwrap();
        let rows = vec![sample.clone(), serde_json::json!(42), Value::Null, sample];
        let batch = engine().score_batch_json(rows, None).unwrap();

        assert_eq!(batch.total_count, 4);
        assert_eq!(batch.success_count, 2);
        for index in [1, 2] {
            match &batch.predictions[index] {
                RowOutcome::Error {
                    kind, reason, field, ..
                } => {
                    assert_eq!(*kind, RowErrorKind::Invalid);
                    assert!(reason.contains("row must be a JSON object"));
                    assert_eq!(*field, None);
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
        assert!(batch.predictions[3].is_ok());
    }

    #[test]
    fn test_positive_prob_from_tensor_shapes() {
        let probs = [0.3_f32, 0.7];
        let prob = |dims: &[i64], data: &[f32]| OnnxClassifier::positive_prob_from_tensor(dims, data);

        assert!((prob(&[1, 2], &probs).unwrap() - 0.7).abs() < 1e-6);
        assert!((prob(&[2], &probs).unwrap() - 0.7).abs() < 1e-6);
        assert!((prob(&[1, 1], &[0.25]).unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(prob(&[], &probs), None);
        assert_eq!(prob(&[1, 2], &[]), None);
    }

    #[test]
    fn test_batch_contributions_use_column_stats() {
        let engine = engine();
        let rows = vec![
            RawCustomerRecord::sample().with("vehicle_damage", "Yes"),
            RawCustomerRecord::sample().with("vehicle_damage", "No"),
        ];
        let batch = engine.score_batch(&rows, None).unwrap();
        let yes = batch.predictions[0].result().unwrap();
        let no = batch.predictions[1].result().unwrap();

        assert!(yes.feature_importance["vehicle_damage"] > 0.0);
        assert!(no.feature_importance["vehicle_damage"] < 0.0);
        // Identical across rows, so zero variance.
        assert_eq!(yes.feature_importance["age"], 0.0);
    }

    #[test]
    fn test_search_and_evaluate_on_labeled_rows() {
        let engine = engine();
        let rows: Vec<LabeledRecord> = vec![
            ("Yes", true),
            ("Yes", true),
            ("No", false),
            ("No", false),
        ]
        .into_iter()
        .map(|(damage, label)| LabeledRecord {
            record: RawCustomerRecord::sample().with("vehicle_damage", damage),
            label,
        })
        .collect();

        let search = engine.search_threshold(&rows, ThresholdMetric::F1).unwrap();
        assert_eq!(search.best_score, 1.0);
        assert!(search.best_threshold > 0.1 && search.best_threshold <= 0.7);

        let metrics = engine.evaluate(&rows, Some(0.5)).unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.auc_roc, Some(1.0));
    }

    #[test]
    fn test_labeled_rows_all_invalid() {
        let engine = engine();
        let rows = vec![LabeledRecord {
            record: RawCustomerRecord::sample().with("gender", "?"),
            label: true,
        }];
        assert!(matches!(
            engine.search_threshold(&rows, ThresholdMetric::F1),
            Err(ScoreError::EmptyInput(_))
        ));
    }
}
