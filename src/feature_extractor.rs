//! Feature extraction for cross-sell model inference.
//!
//! Turns raw customer records into the encoded feature vectors the
//! gradient-boosted model was trained on. The categorical encodings,
//! derived features and column order here must stay identical to the
//! training pipeline; nothing downstream detects a mismatch.

use crate::error::ValidationError;
use crate::types::customer::{Categorical, Gender, RawCustomerRecord, VehicleAge, VehicleDamage};
use crate::types::features::{default_feature_names, FeatureVector, RAW_FIELDS};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Inclusive age range accepted for scoring.
pub const MIN_AGE: i64 = 18;
pub const MAX_AGE: i64 = 100;

/// Feature extractor that transforms raw customer records into model input.
///
/// Output columns follow `feature_names`, normally taken from the model
/// metadata shipped with the trained model.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    feature_names: Vec<String>,
}

impl FeatureExtractor {
    /// Create an extractor producing the default 12-column layout.
    pub fn new() -> Self {
        Self::with_feature_names(default_feature_names())
    }

    /// Create an extractor for a model-specific column order.
    pub fn with_feature_names(feature_names: Vec<String>) -> Self {
        Self { feature_names }
    }

    /// Number of features produced.
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Feature names in model order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Extract the feature vector for one record.
    pub fn extract(&self, raw: &RawCustomerRecord) -> Result<FeatureVector, ValidationError> {
        let fields = normalize_fields(raw)?;
        let columns = encode_columns(&fields)?;
        Ok(self.assemble(&columns))
    }

    /// Extract every row independently; failures stay in their slot.
    pub fn extract_batch(
        &self,
        rows: &[RawCustomerRecord],
    ) -> Vec<Result<FeatureVector, ValidationError>> {
        rows.iter().map(|row| self.extract(row)).collect()
    }

    /// Lay columns out in model order, dropping unexpected ones and
    /// filling missing expected ones with 0.
    fn assemble(&self, columns: &BTreeMap<String, f64>) -> FeatureVector {
        let mut values = Vec::with_capacity(self.feature_names.len());
        let mut filled = Vec::new();

        for name in &self.feature_names {
            match columns.get(name) {
                Some(&v) => values.push(v),
                None => {
                    values.push(0.0);
                    filled.push(name.clone());
                }
            }
        }

        if !filled.is_empty() {
            debug!(filled = ?filled, "Expected features missing from input, filled with 0");
        }
        let dropped: Vec<&String> = columns
            .keys()
            .filter(|k| !self.feature_names.contains(k))
            .collect();
        if !dropped.is_empty() {
            debug!(dropped = ?dropped, "Input fields not used by the model");
        }

        FeatureVector::new(self.feature_names.clone(), values, filled)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a field name to lowercase snake case.
///
/// `"Driving_License"`, `"driving-license"` and `" Driving License "` all
/// become `"driving_license"`.
pub fn normalize_field_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Ordinal age bucket: <25 → 0, <40 → 1, <60 → 2, otherwise 3.
pub fn age_group(age: i64) -> u8 {
    if age < 25 {
        0
    } else if age < 40 {
        1
    } else if age < 60 {
        2
    } else {
        3
    }
}

/// `ln(1 + annual_premium)`
pub fn annual_premium_log(annual_premium: f64) -> f64 {
    annual_premium.ln_1p()
}

/// Re-key a record by normalized field name. `null` values count as absent.
fn normalize_fields(raw: &RawCustomerRecord) -> Result<BTreeMap<String, &Value>, ValidationError> {
    let mut fields = BTreeMap::new();
    for (key, value) in raw.fields() {
        if value.is_null() {
            continue;
        }
        let name = normalize_field_name(key);
        if fields.insert(name.clone(), value).is_some() {
            return Err(ValidationError::new(
                name,
                "field supplied more than once under different spellings",
            ));
        }
    }
    Ok(fields)
}

/// Validate and encode every known field, then add derived features.
///
/// Known fields are checked in canonical order and the first violation is
/// returned. Unknown numeric fields pass through untouched so a model
/// trained on extra columns can still find them.
fn encode_columns(fields: &BTreeMap<String, &Value>) -> Result<BTreeMap<String, f64>, ValidationError> {
    let mut columns = BTreeMap::new();

    for field in RAW_FIELDS {
        if let Some(value) = fields.get(field) {
            let encoded = encode_field(field, value).map_err(|reason| ValidationError::new(field, reason))?;
            columns.insert(field.to_string(), encoded);
        }
    }

    for (name, value) in fields {
        if RAW_FIELDS.contains(&name.as_str()) {
            continue;
        }
        if let Some(v) = as_number(value) {
            columns.insert(name.clone(), v);
        }
    }

    if let Some(&age) = columns.get("age") {
        columns.insert("age_group".to_string(), age_group(age as i64) as f64);
    }
    if let Some(&premium) = columns.get("annual_premium") {
        columns.insert("annual_premium_log".to_string(), annual_premium_log(premium));
    }

    Ok(columns)
}

fn encode_field(field: &str, value: &Value) -> Result<f64, String> {
    match field {
        f if f == Gender::FIELD => encode_categorical::<Gender>(value),
        f if f == VehicleAge::FIELD => encode_categorical::<VehicleAge>(value),
        f if f == VehicleDamage::FIELD => encode_categorical::<VehicleDamage>(value),
        "age" => match as_integer(value) {
            Some(age) if (MIN_AGE..=MAX_AGE).contains(&age) => Ok(age as f64),
            _ => Err(format!("must be an integer between {MIN_AGE} and {MAX_AGE}")),
        },
        "driving_license" | "previously_insured" => match as_integer(value) {
            Some(flag @ (0 | 1)) => Ok(flag as f64),
            _ => Err("must be 0 or 1".to_string()),
        },
        "vintage" => match as_integer(value) {
            Some(days) if days >= 0 => Ok(days as f64),
            _ => Err("must be a non-negative integer".to_string()),
        },
        "annual_premium" => match as_number(value) {
            Some(premium) if premium >= 0.0 => Ok(premium),
            _ => Err("must be a non-negative number".to_string()),
        },
        _ => as_number(value).ok_or_else(|| "must be numeric".to_string()),
    }
}

fn encode_categorical<C: Categorical>(value: &Value) -> Result<f64, String> {
    value
        .as_str()
        .and_then(C::parse)
        .map(|c| c.encode() as f64)
        .ok_or_else(|| format!("must be one of {}", C::domain()))
}

/// Finite number from a JSON number or numeric string.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Whole number from a JSON number or numeric string; rejects fractions.
fn as_integer(value: &Value) -> Option<i64> {
    let n = as_number(value)?;
    (n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawCustomerRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let features = extractor.extract(&RawCustomerRecord::sample()).unwrap();

        assert_eq!(features.len(), extractor.feature_count());
        assert_eq!(features.get("gender"), Some(0.0));
        assert_eq!(features.get("age"), Some(35.0));
        assert_eq!(features.get("vehicle_age"), Some(1.0));
        assert_eq!(features.get("vehicle_damage"), Some(1.0));
        assert_eq!(features.get("age_group"), Some(1.0));
        assert!(features.filled().is_empty());
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 12);
        assert_eq!(extractor.feature_names().len(), 12);
    }

    #[test]
    fn test_field_name_normalization() {
        assert_eq!(normalize_field_name("Driving_License"), "driving_license");
        assert_eq!(normalize_field_name("policy-sales-channel"), "policy_sales_channel");
        assert_eq!(normalize_field_name(" Vehicle Age "), "vehicle_age");

        let extractor = FeatureExtractor::new();
        let raw = record(json!({
            "Gender": "Female", "Age": 61, "Driving_License": 1, "Region_Code": 8,
            "Previously_Insured": 1, "Vehicle_Age": "> 2 Years", "Vehicle_Damage": "No",
            "Annual_Premium": 2630, "Policy_Sales_Channel": 26, "Vintage": 12
        }));
        let features = extractor.extract(&raw).unwrap();
        assert_eq!(features.get("gender"), Some(1.0));
        assert_eq!(features.get("vehicle_age"), Some(2.0));
        assert_eq!(features.get("age_group"), Some(3.0));
        assert!(features.filled().is_empty());
    }

    #[test]
    fn test_age_group_boundaries() {
        assert_eq!(age_group(18), 0);
        assert_eq!(age_group(24), 0);
        assert_eq!(age_group(25), 1);
        assert_eq!(age_group(39), 1);
        assert_eq!(age_group(40), 2);
        assert_eq!(age_group(59), 2);
        assert_eq!(age_group(60), 3);
        assert_eq!(age_group(100), 3);
    }

    #[test]
    fn test_annual_premium_log() {
        let extractor = FeatureExtractor::new();
        for premium in [0.0_f64, 1.0, 2630.0, 35000.0, 540165.0] {
            let raw = RawCustomerRecord::sample().with("annual_premium", premium);
            let features = extractor.extract(&raw).unwrap();
            let expected = (1.0 + premium).ln();
            let actual = features.get("annual_premium_log").unwrap();
            assert!((actual - expected).abs() < 1e-12, "premium {premium}");
        }
    }

    #[test]
    fn test_categorical_fields_are_raw_fields() {
        for field in [Gender::FIELD, VehicleAge::FIELD, VehicleDamage::FIELD] {
            assert!(RAW_FIELDS.contains(&field), "{field}");
        }
        assert_eq!(encode_field(VehicleAge::FIELD, &json!("> 2 Years")), Ok(2.0));
        assert_eq!(encode_field(Gender::FIELD, &json!("Female")), Ok(1.0));
    }

    #[test]
    fn test_invalid_categorical_rejected() {
        let extractor = FeatureExtractor::new();
        let raw = RawCustomerRecord::sample().with("vehicle_damage", "Maybe");
        let err = extractor.extract(&raw).unwrap_err();
        assert_eq!(err.field, "vehicle_damage");
        assert!(err.reason.contains("'Yes'"));
    }

    #[test]
    fn test_age_range_enforced() {
        let extractor = FeatureExtractor::new();
        for age in [json!(17), json!(101), json!(35.5), json!("old")] {
            let raw = RawCustomerRecord::sample().with("age", age.clone());
            let err = extractor.extract(&raw).unwrap_err();
            assert_eq!(err.field, "age", "age {age}");
        }
        let raw = RawCustomerRecord::sample().with("age", 100);
        assert!(extractor.extract(&raw).is_ok());
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let extractor = FeatureExtractor::new();
        let raw = RawCustomerRecord::sample().with("region_code", "north");
        assert_eq!(extractor.extract(&raw).unwrap_err().field, "region_code");

        let raw = RawCustomerRecord::sample().with("annual_premium", -1.0);
        assert_eq!(extractor.extract(&raw).unwrap_err().field, "annual_premium");

        let raw = RawCustomerRecord::sample().with("driving_license", 2);
        assert_eq!(extractor.extract(&raw).unwrap_err().field, "driving_license");
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let extractor = FeatureExtractor::new();
        let raw = RawCustomerRecord::sample()
            .with("age", "44")
            .with("region_code", " 28.0 ");
        let features = extractor.extract(&raw).unwrap();
        assert_eq!(features.get("age"), Some(44.0));
        assert_eq!(features.get("region_code"), Some(28.0));
    }

    #[test]
    fn test_first_violation_reported() {
        let extractor = FeatureExtractor::new();
        // Key order in the request is irrelevant; canonical order decides.
        let raw = record(json!({
            "vintage": -5, "vehicle_damage": "Maybe", "gender": "Robot", "age": 30
        }));
        assert_eq!(extractor.extract(&raw).unwrap_err().field, "gender");

        let raw = record(json!({ "vintage": -5, "vehicle_damage": "Maybe", "age": 30 }));
        assert_eq!(extractor.extract(&raw).unwrap_err().field, "vehicle_damage");
    }

    #[test]
    fn test_duplicate_spellings_rejected() {
        let extractor = FeatureExtractor::new();
        let raw = RawCustomerRecord::sample().with("Age", 40);
        let err = extractor.extract(&raw).unwrap_err();
        assert_eq!(err.field, "age");
    }

    #[test]
    fn test_missing_features_filled_with_zero() {
        let extractor = FeatureExtractor::new();
        let raw = record(json!({ "gender": "Female", "age": 22, "vintage": null }));
        let features = extractor.extract(&raw).unwrap();

        assert_eq!(features.get("gender"), Some(1.0));
        assert_eq!(features.get("age_group"), Some(0.0));
        assert_eq!(features.get("annual_premium"), Some(0.0));
        assert_eq!(features.get("annual_premium_log"), Some(0.0));
        assert!(features.filled().contains(&"vintage".to_string()));
        assert!(features.filled().contains(&"annual_premium_log".to_string()));
        assert!(!features.filled().contains(&"age_group".to_string()));
    }

    #[test]
    fn test_custom_order_drops_unexpected_features() {
        let extractor = FeatureExtractor::with_feature_names(vec![
            "annual_premium_log".into(),
            "previously_insured".into(),
            "id".into(),
        ]);
        let raw = RawCustomerRecord::sample().with("id", 17);
        let features = extractor.extract(&raw).unwrap();

        assert_eq!(features.len(), 3);
        assert_eq!(features.names()[0], "annual_premium_log");
        assert_eq!(features.values()[1], 0.0);
        assert_eq!(features.values()[2], 17.0);
        assert_eq!(features.get("gender"), None);
    }

    #[test]
    fn test_batch_extraction_isolates_failures() {
        let extractor = FeatureExtractor::new();
        let rows = vec![
            RawCustomerRecord::sample(),
            RawCustomerRecord::sample().with("gender", "X"),
            RawCustomerRecord::sample(),
        ];
        let results = extractor.extract_batch(&rows);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
