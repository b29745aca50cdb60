//! Decision threshold tuning

use crate::error::{ExoError, Result};
use crate::training::models::argmax;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Number of cutoffs scanned: 0.10, 0.11, ..., 0.90
pub const N_CUTOFFS: usize = 81;

/// Threshold persisted for multiclass runs and used before tuning
pub const NEUTRAL_THRESHOLD: f64 = 0.5;

/// Cutoffs in ascending order
pub fn candidate_thresholds() -> Vec<f64> {
    (0..N_CUTOFFS).map(|i| (10 + i) as f64 / 100.0).collect()
}

/// Winning cutoff and its accuracy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSearch {
    pub threshold: f64,
    pub accuracy: f64,
}

/// Positive when `p > threshold`
pub fn apply_threshold(positive_proba: &Array1<f64>, threshold: f64) -> Array1<f64> {
    positive_proba.mapv(|p| if p > threshold { 1.0 } else { 0.0 })
}

/// Scan every cutoff and keep the most accurate; ties keep the lowest cutoff
pub fn tune_threshold(y_true: &Array1<f64>, positive_proba: &Array1<f64>) -> Result<ThresholdSearch> {
    if y_true.len() != positive_proba.len() {
        return Err(ExoError::ShapeError {
            expected: format!("{} probabilities", y_true.len()),
            actual: format!("{} probabilities", positive_proba.len()),
        });
    }
    if y_true.is_empty() {
        return Err(ExoError::ValidationError("Cannot tune a threshold on an empty split".to_string()));
    }

    let n = y_true.len() as f64;
    let mut best = ThresholdSearch { threshold: NEUTRAL_THRESHOLD, accuracy: 0.0 };
    for t in candidate_thresholds() {
        let correct = y_true
            .iter()
            .zip(positive_proba.iter())
            .filter(|(&y, &p)| (p > t) == (y >= 0.5))
            .count();
        let acc = correct as f64 / n;
        if acc > best.accuracy {
            best = ThresholdSearch { threshold: t, accuracy: acc };
        }
    }
    Ok(best)
}

/// How a probability row becomes a class index
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecisionRule {
    /// Binary: class 1 when its probability exceeds the cutoff
    Threshold(f64),
    Argmax,
}

impl DecisionRule {
    /// Thresholds only apply to binary problems
    pub fn for_classes(n_classes: usize, threshold: f64) -> Self {
        if n_classes == 2 {
            DecisionRule::Threshold(threshold)
        } else {
            DecisionRule::Argmax
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> usize {
        match self {
            DecisionRule::Threshold(t) if row.len() == 2 => usize::from(row[1] > *t),
            _ => argmax(row),
        }
    }

    pub fn apply(&self, proba: &Array2<f64>) -> Array1<f64> {
        proba.rows().into_iter().map(|r| self.predict_row(r) as f64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_candidates() {
        let c = candidate_thresholds();
        assert_eq!(c.len(), 81);
        assert!((c[0] - 0.10).abs() < 1e-12);
        assert!((c[80] - 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_tie_keeps_lowest_cutoff() {
        // Any cutoff in [0.30, 0.70) separates perfectly
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.2, 0.3, 0.7, 0.9];
        let best = tune_threshold(&y, &p).unwrap();
        assert!((best.threshold - 0.30).abs() < 1e-12);
        assert!((best.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strictly_greater() {
        let p = array![0.5, 0.51];
        assert_eq!(apply_threshold(&p, 0.5).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_decision_rule() {
        let proba = array![[0.6, 0.4], [0.3, 0.7]];
        assert_eq!(DecisionRule::for_classes(2, 0.35).apply(&proba).to_vec(), vec![1.0, 1.0]);
        assert_eq!(DecisionRule::Argmax.apply(&proba).to_vec(), vec![0.0, 1.0]);

        let multi = array![[0.2, 0.5, 0.3]];
        assert_eq!(DecisionRule::for_classes(3, 0.1).apply(&multi).to_vec(), vec![1.0]);
    }

    #[test]
    fn test_empty_split() {
        assert!(tune_threshold(&Array1::zeros(0), &Array1::zeros(0)).is_err());
    }
}
