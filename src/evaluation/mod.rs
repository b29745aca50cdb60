//! Evaluation module
//!
//! Turns probabilities into decisions (tuned threshold or argmax) and scores
//! them against held-out labels.

mod metrics;
mod threshold;

pub use metrics::{
    accuracy, average_precision, confusion_matrix, roc_auc, AveragedMetrics, ClassMetrics,
    ClassificationReport,
};
pub use threshold::{
    apply_threshold, candidate_thresholds, tune_threshold, DecisionRule, ThresholdSearch, N_CUTOFFS,
    NEUTRAL_THRESHOLD,
};

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2};

/// Apply `rule` to `proba` and report against `y_true`
pub fn evaluate(
    y_true: &Array1<f64>,
    proba: &Array2<f64>,
    rule: DecisionRule,
    class_names: &[String],
) -> Result<ClassificationReport> {
    if proba.ncols() != class_names.len() {
        return Err(ExoError::ShapeError {
            expected: format!("{} probability columns", class_names.len()),
            actual: format!("{} probability columns", proba.ncols()),
        });
    }

    let y_pred = rule.apply(proba);
    let report = ClassificationReport::compute(y_true, &y_pred, class_names)?;
    if class_names.len() == 2 {
        Ok(report.with_positive_scores(y_true, &proba.column(1).to_owned()))
    } else {
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_evaluate_binary_uses_threshold() {
        let names = vec!["CONFIRMED".to_string(), "FALSE POSITIVE".to_string()];
        let y = array![0.0, 1.0, 1.0];
        let proba = array![[0.9, 0.1], [0.7, 0.3], [0.2, 0.8]];

        let report = evaluate(&y, &proba, DecisionRule::Threshold(0.25), &names).unwrap();
        assert!((report.accuracy - 1.0).abs() < 1e-12);
        assert!(report.roc_auc.is_some());

        let report = evaluate(&y, &proba, DecisionRule::Argmax, &names).unwrap();
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_shape_mismatch() {
        let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert!(evaluate(&array![0.0], &array![[0.5, 0.5]], DecisionRule::Argmax, &names).is_err());
    }
}
