//! Decision threshold search and classifier evaluation
//!
//! Works on `(probability, label)` pairs so the same code serves the offline
//! tool and the online `/api/model/threshold/search` endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of points on the threshold grid (0.05 ..= 0.95, step 0.05).
pub const GRID_POINTS: usize = 19;

/// Metric maximized by the threshold search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMetric {
    #[default]
    F1,
    Accuracy,
    Precision,
    Recall,
}

impl ThresholdMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdMetric::F1 => "f1",
            ThresholdMetric::Accuracy => "accuracy",
            ThresholdMetric::Precision => "precision",
            ThresholdMetric::Recall => "recall",
        }
    }

    fn of(self, point: &ThresholdPoint) -> f64 {
        match self {
            ThresholdMetric::F1 => point.f1,
            ThresholdMetric::Accuracy => point.accuracy,
            ThresholdMetric::Precision => point.precision,
            ThresholdMetric::Recall => point.recall,
        }
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f1" | "f1_score" => Ok(ThresholdMetric::F1),
            "accuracy" => Ok(ThresholdMetric::Accuracy),
            "precision" => Ok(ThresholdMetric::Precision),
            "recall" => Ok(ThresholdMetric::Recall),
            other => Err(format!(
                "unsupported metric '{other}', expected one of f1, accuracy, precision, recall"
            )),
        }
    }
}

/// Binary confusion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive: u64,
    pub false_positive: u64,
    pub true_negative: u64,
    pub false_negative: u64,
}

impl ConfusionCounts {
    /// Count outcomes with `probability >= threshold` as positive.
    pub fn at(scored: &[(f64, bool)], threshold: f64) -> Self {
        let mut counts = Self::default();
        for &(probability, label) in scored {
            match (probability >= threshold, label) {
                (true, true) => counts.true_positive += 1,
                (true, false) => counts.false_positive += 1,
                (false, false) => counts.true_negative += 1,
                (false, true) => counts.false_negative += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    /// 0 when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// 0 when there are no actual positives.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    /// `[[tn, fp], [fn, tp]]`, rows = actual class.
    pub fn matrix(&self) -> [[u64; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Metrics at one grid threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
}

impl ThresholdPoint {
    fn from_counts(threshold: f64, counts: &ConfusionCounts) -> Self {
        Self {
            threshold,
            precision: counts.precision(),
            recall: counts.recall(),
            f1: counts.f1(),
            accuracy: counts.accuracy(),
        }
    }
}

/// Result of a threshold sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSearch {
    pub metric: ThresholdMetric,
    pub best_threshold: f64,
    pub best_score: f64,
    pub samples: usize,
    pub sweep: Vec<ThresholdPoint>,
}

/// Candidate thresholds: 0.05, 0.10, ..., 0.95.
///
/// Built from integer steps so every point is the closest double to its
/// decimal value (no accumulated drift).
pub fn threshold_grid() -> Vec<f64> {
    (1..=GRID_POINTS).map(|k| (k * 5) as f64 / 100.0).collect()
}

/// Sweep the grid and pick the threshold maximizing `metric`.
///
/// Ties keep the first (lowest) threshold seen.
pub fn search_threshold(scored: &[(f64, bool)], metric: ThresholdMetric) -> ThresholdSearch {
    let sweep: Vec<ThresholdPoint> = threshold_grid()
        .into_iter()
        .map(|t| ThresholdPoint::from_counts(t, &ConfusionCounts::at(scored, t)))
        .collect();

    let mut best = sweep[0];
    for point in &sweep[1..] {
        if metric.of(point) > metric.of(&best) {
            best = *point;
        }
    }

    ThresholdSearch {
        metric,
        best_threshold: best.threshold,
        best_score: metric.of(&best),
        samples: scored.len(),
        sweep,
    }
}

/// Classifier quality at a fixed threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `None` when only one class is present
    pub auc_roc: Option<f64>,
    pub confusion_matrix: [[u64; 2]; 2],
    pub threshold: f64,
    #[serde(default)]
    pub samples: usize,
}

/// Evaluate scored pairs at `threshold`.
pub fn evaluate(scored: &[(f64, bool)], threshold: f64) -> EvaluationMetrics {
    let counts = ConfusionCounts::at(scored, threshold);
    EvaluationMetrics {
        accuracy: counts.accuracy(),
        precision: counts.precision(),
        recall: counts.recall(),
        f1_score: counts.f1(),
        auc_roc: roc_auc(scored),
        confusion_matrix: counts.matrix(),
        threshold,
        samples: scored.len(),
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied probabilities receive their average rank.
pub fn roc_auc(scored: &[(f64, bool)]) -> Option<f64> {
    let positives = scored.iter().filter(|(_, label)| *label).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut sorted: Vec<&(f64, bool)> = scored.iter().collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1].0 == sorted[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        let tied_positives = sorted[i..=j].iter().filter(|(_, label)| *label).count();
        positive_rank_sum += avg_rank * tied_positives as f64;
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_exact() {
        let grid = threshold_grid();
        assert_eq!(grid.len(), GRID_POINTS);
        assert_eq!(grid[0], 0.05);
        assert_eq!(grid[7], 0.4);
        assert_eq!(grid[18], 0.95);
    }

    #[test]
    fn test_recovers_known_optimum() {
        // Positives exactly at or above 0.40; negatives just below.
        let scored = vec![
            (0.10, false),
            (0.34, false),
            (0.36, false),
            (0.39, false),
            (0.41, true),
            (0.60, true),
            (0.90, true),
        ];
        let search = search_threshold(&scored, ThresholdMetric::F1);
        assert!((search.best_threshold - 0.40).abs() < 1e-9);
        assert_eq!(search.best_score, 1.0);
        assert_eq!(search.sweep.len(), GRID_POINTS);
        assert_eq!(search.samples, 7);
    }

    #[test]
    fn test_ties_keep_lowest_threshold() {
        // Every threshold in 0.25..=0.70 separates perfectly.
        let scored = vec![(0.2, false), (0.22, false), (0.75, true), (0.8, true)];
        let search = search_threshold(&scored, ThresholdMetric::Accuracy);
        assert!((search.best_threshold - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_recall_prefers_low_thresholds() {
        let scored = vec![(0.07, true), (0.5, false), (0.9, true)];
        let search = search_threshold(&scored, ThresholdMetric::Recall);
        assert!((search.best_threshold - 0.05).abs() < 1e-9);
        assert_eq!(search.best_score, 1.0);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let counts = ConfusionCounts::at(&[(0.1, false), (0.2, false)], 0.5);
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(counts.f1(), 0.0);
        assert_eq!(counts.accuracy(), 1.0);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("F1".parse::<ThresholdMetric>(), Ok(ThresholdMetric::F1));
        assert_eq!("recall".parse::<ThresholdMetric>(), Ok(ThresholdMetric::Recall));
        assert!("auc".parse::<ThresholdMetric>().is_err());
    }

    #[test]
    fn test_evaluate() {
        let scored = vec![(0.9, true), (0.8, false), (0.3, true), (0.1, false)];
        let metrics = evaluate(&scored, 0.5);
        assert_eq!(metrics.confusion_matrix, [[1, 1], [1, 1]]);
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.precision, 0.5);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.auc_roc, Some(0.75));
    }

    #[test]
    fn test_auc_edge_cases() {
        assert_eq!(roc_auc(&[(0.2, true), (0.9, true)]), None);
        assert_eq!(roc_auc(&[(0.2, false), (0.9, true)]), Some(1.0));
        assert_eq!(roc_auc(&[(0.5, false), (0.5, true)]), Some(0.5));
    }
}
