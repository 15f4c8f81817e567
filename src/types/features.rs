//! Model-ready feature vectors

use serde::Serialize;

/// Raw customer fields in canonical order.
///
/// Validation walks fields in this order, so the first violation reported
/// is deterministic regardless of the key order in the request.
pub const RAW_FIELDS: [&str; 10] = [
    "gender",
    "age",
    "driving_license",
    "region_code",
    "previously_insured",
    "vehicle_age",
    "vehicle_damage",
    "annual_premium",
    "policy_sales_channel",
    "vintage",
];

/// Features computed from raw fields.
pub const DERIVED_FIELDS: [&str; 2] = ["age_group", "annual_premium_log"];

/// Feature order used when model metadata does not specify one:
/// raw fields followed by derived fields.
pub fn default_feature_names() -> Vec<String> {
    RAW_FIELDS
        .iter()
        .chain(DERIVED_FIELDS.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Encoded customer features laid out in the column order a model expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
    /// Expected features that were absent from the input and set to 0.
    filled: Vec<String>,
}

impl FeatureVector {
    pub(crate) fn new(names: Vec<String>, values: Vec<f64>, filled: Vec<String>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self {
            names,
            values,
            filled,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn filled(&self) -> &[String] {
        &self.filled
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named feature.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Single-precision copy for the inference runtime.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }

    /// Iterate `(name, value)` pairs in model order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_feature_order() {
        let names = default_feature_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "gender");
        assert_eq!(names[9], "vintage");
        assert_eq!(names[10], "age_group");
        assert_eq!(names[11], "annual_premium_log");
    }

    #[test]
    fn test_vector_lookup() {
        let v = FeatureVector::new(
            vec!["age".into(), "vintage".into()],
            vec![30.0, 100.0],
            vec![],
        );
        assert_eq!(v.get("vintage"), Some(100.0));
        assert_eq!(v.get("gender"), None);
        assert_eq!(v.to_f32(), vec![30.0_f32, 100.0_f32]);
    }
}
