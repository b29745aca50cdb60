//! Classification metrics

use crate::error::{ExoError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Fraction of matching labels
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Counts indexed `[true][predicted]`, classes in encoder order
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>, n_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (t.round() as usize, p.round() as usize);
        if t < n_classes && p < n_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}

/// Precision / recall / F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Averaged precision / recall / F1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Full evaluation of one model on a held-out split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub n_samples: usize,
    pub accuracy: f64,
    pub class_names: Vec<String>,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    /// Binary only, from positive-class scores
    pub roc_auc: Option<f64>,
    /// Binary only, from positive-class scores
    pub average_precision: Option<f64>,
}

impl ClassificationReport {
    /// Build a report from encoded labels
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, class_names: &[String]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }

        let n_classes = class_names.len();
        let matrix = confusion_matrix(y_true, y_pred, n_classes);

        let per_class: Vec<ClassMetrics> = (0..n_classes)
            .map(|c| {
                let tp = matrix[c][c] as f64;
                let support: usize = matrix[c].iter().sum();
                let predicted: usize = matrix.iter().map(|row| row[c]).sum();
                let precision = safe_div(tp, predicted as f64);
                let recall = safe_div(tp, support as f64);
                ClassMetrics {
                    label: class_names[c].clone(),
                    precision,
                    recall,
                    f1: safe_div(2.0 * precision * recall, precision + recall),
                    support,
                }
            })
            .collect();

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let mut macro_avg = AveragedMetrics::default();
        let mut weighted_avg = AveragedMetrics::default();
        for m in &per_class {
            macro_avg.precision += m.precision / n_classes.max(1) as f64;
            macro_avg.recall += m.recall / n_classes.max(1) as f64;
            macro_avg.f1 += m.f1 / n_classes.max(1) as f64;

            let w = safe_div(m.support as f64, total_support as f64);
            weighted_avg.precision += w * m.precision;
            weighted_avg.recall += w * m.recall;
            weighted_avg.f1 += w * m.f1;
        }

        Ok(Self {
            n_samples: y_true.len(),
            accuracy: accuracy(y_true, y_pred),
            class_names: class_names.to_vec(),
            confusion_matrix: matrix,
            per_class,
            macro_avg,
            weighted_avg,
            roc_auc: None,
            average_precision: None,
        })
    }

    /// Attach ranking metrics from positive-class scores
    pub fn with_positive_scores(mut self, y_true: &Array1<f64>, scores: &Array1<f64>) -> Self {
        self.roc_auc = roc_auc(y_true, scores);
        self.average_precision = average_precision(y_true, scores);
        self
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Area under the ROC curve via the rank-sum statistic; `None` without both classes
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Average ranks over tied scores
    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks.iter().zip(y_true.iter()).filter(|(_, &y)| y >= 0.5).map(|(r, _)| r).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Step-wise average precision; `None` without positives
pub fn average_precision(y_true: &Array1<f64>, scores: &Array1<f64>) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y >= 0.5).count();
    if n_pos == 0 || scores.len() != y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ap = 0.0;
    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut prev_recall = 0.0;
    let mut i = 0;
    while i < order.len() {
        // Tied scores form one operating point
        let mut j = i;
        while j < order.len() && scores[order[j]] == scores[order[i]] {
            if y_true[order[j]] >= 0.5 {
                tp += 1;
            }
            seen += 1;
            j += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        i = j;
    }
    Some(ap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("C{}", i)).collect()
    }

    #[test]
    fn test_report_binary() {
        let y_true = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0, 0.0];
        let report = ClassificationReport::compute(&y_true, &y_pred, &names(2)).unwrap();

        assert!((report.accuracy - 0.6).abs() < 1e-12);
        assert_eq!(report.confusion_matrix, vec![vec![1, 1], vec![1, 2]]);
        assert_eq!(report.per_class[1].support, 3);
        assert!((report.per_class[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.per_class[0].recall - 0.5).abs() < 1e-12);
        let expected_weighted = (2.0 * 0.5 + 3.0 * (2.0 / 3.0)) / 5.0;
        assert!((report.weighted_avg.recall - expected_weighted).abs() < 1e-12);
    }

    #[test]
    fn test_absent_class_scores_zero() {
        let y_true = array![0.0, 1.0];
        let y_pred = array![0.0, 1.0];
        let report = ClassificationReport::compute(&y_true, &y_pred, &names(3)).unwrap();
        assert_eq!(report.per_class[2].support, 0);
        assert_eq!(report.per_class[2].f1, 0.0);
        assert_eq!(report.confusion_matrix.len(), 3);
    }

    #[test]
    fn test_roc_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert!((roc_auc(&y, &array![0.1, 0.4, 0.35, 0.8]).unwrap() - 0.75).abs() < 1e-12);
        assert!((roc_auc(&y, &array![0.1, 0.2, 0.8, 0.9]).unwrap() - 1.0).abs() < 1e-12);
        assert!((roc_auc(&y, &array![0.5, 0.5, 0.5, 0.5]).unwrap() - 0.5).abs() < 1e-12);
        assert!(roc_auc(&array![1.0, 1.0], &array![0.2, 0.3]).is_none());
    }

    #[test]
    fn test_average_precision() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let ap = average_precision(&y, &array![0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((ap - (0.5 + 0.5 * 2.0 / 3.0)).abs() < 1e-12);
        assert!(average_precision(&array![0.0], &array![0.3]).is_none());
    }
}
