//! Per-prediction feature attribution
//!
//! Contributions are global model importances scaled by z-scored feature
//! values. This is a cheap explanation aid, not a Shapley attribution: it
//! ignores feature interactions and the tree structure entirely.

use crate::types::features::FeatureVector;
use anyhow::{bail, Result};
use std::collections::BTreeMap;

/// Global feature importances of a trained ensemble, aligned to the
/// model's feature order.
#[derive(Debug, Clone)]
pub struct FeatureImportance {
    names: Vec<String>,
    weights: Vec<f64>,
}

impl FeatureImportance {
    /// Pair importances with feature names. Lengths must match.
    pub fn new(names: &[String], weights: &[f64]) -> Result<Self> {
        if names.len() != weights.len() {
            bail!(
                "{} feature importances for {} features",
                weights.len(),
                names.len()
            );
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            bail!("non-finite feature importance {}", w);
        }
        Ok(Self {
            names: names.to_vec(),
            weights: weights.to_vec(),
        })
    }

    /// Importances keyed by feature name.
    pub fn as_map(&self) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Contributions for a record scored on its own.
    ///
    /// With no batch to compare against, the record's feature values are
    /// standardized against each other.
    pub fn contributions_single(&self, vector: &FeatureVector) -> BTreeMap<String, f64> {
        let z = standardize_within(vector.values());
        self.weighted(&z)
    }

    /// Contributions for a record scored as part of a batch.
    pub fn contributions_in_batch(
        &self,
        vector: &FeatureVector,
        stats: &ColumnStats,
    ) -> BTreeMap<String, f64> {
        let z = stats.z_scores(vector.values());
        self.weighted(&z)
    }

    fn weighted(&self, z: &[f64]) -> BTreeMap<String, f64> {
        self.names
            .iter()
            .zip(self.weights.iter().zip(z.iter()))
            .map(|(name, (&w, &z))| (name.clone(), w * z))
            .collect()
    }
}

/// Per-column mean and population standard deviation over a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

impl ColumnStats {
    /// Compute column statistics. Returns `None` for an empty batch.
    pub fn from_vectors<'a, I>(vectors: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let rows: Vec<&[f64]> = vectors.into_iter().map(|v| v.values()).collect();
        let first = rows.first()?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in &rows {
            for (m, v) in means.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut std_devs = vec![0.0; width];
        for row in &rows {
            for ((s, v), m) in std_devs.iter_mut().zip(row.iter()).zip(means.iter()) {
                *s += (v - m).powi(2);
            }
        }
        std_devs.iter_mut().for_each(|s| *s = (*s / n).sqrt());

        Some(Self { means, std_devs })
    }

    /// Z-score a row; zero-variance columns map to 0.
    pub fn z_scores(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.means.iter().zip(self.std_devs.iter()))
            .map(|(&v, (&m, &s))| if s > 0.0 { (v - m) / s } else { 0.0 })
            .collect()
    }
}

/// Standardize values against their own mean and population std dev.
pub fn standardize_within(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std_dev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    if std_dev > 0.0 {
        values.iter().map(|v| (v - mean) / std_dev).collect()
    } else {
        vec![0.0; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f64]) -> FeatureVector {
        let names = (0..values.len()).map(|i| format!("f{i}")).collect();
        FeatureVector::new(names, values.to_vec(), vec![])
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn test_length_mismatch_rejected() {
        assert!(FeatureImportance::new(&names(3), &[0.5, 0.5]).is_err());
        assert!(FeatureImportance::new(&names(2), &[0.5, f64::NAN]).is_err());
    }

    #[test]
    fn test_batch_contributions_are_signed() {
        let importance = FeatureImportance::new(&names(2), &[0.8, 0.2]).unwrap();
        let rows = [vector(&[1.0, 5.0]), vector(&[3.0, 5.0])];
        let stats = ColumnStats::from_vectors(rows.iter()).unwrap();

        assert_eq!(stats.means, vec![2.0, 5.0]);
        assert_eq!(stats.std_devs, vec![1.0, 0.0]);

        let low = importance.contributions_in_batch(&rows[0], &stats);
        let high = importance.contributions_in_batch(&rows[1], &stats);
        assert!((low["f0"] + 0.8).abs() < 1e-12);
        assert!((high["f0"] - 0.8).abs() < 1e-12);
        // Constant column carries no signal.
        assert_eq!(low["f1"], 0.0);
    }

    #[test]
    fn test_single_record_standardization() {
        let z = standardize_within(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((z[0] + 1.5).abs() < 1e-12);
        assert!((z[7] - 2.0).abs() < 1e-12);

        assert_eq!(standardize_within(&[3.0, 3.0]), vec![0.0, 0.0]);
        assert!(standardize_within(&[]).is_empty());
    }

    #[test]
    fn test_global_map() {
        let importance = FeatureImportance::new(&names(2), &[0.7, 0.3]).unwrap();
        let map = importance.as_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["f0"], 0.7);
    }

    #[test]
    fn test_empty_batch_has_no_stats() {
        assert!(ColumnStats::from_vectors(std::iter::empty()).is_none());
    }
}
