//! Classifier trait and shared helpers

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Common surface of every probabilistic classifier in the ensemble.
///
/// Targets are encoded class indices stored as `f64`. Probability matrices
/// always have `n_classes` columns ordered by class index, even when a
/// training fold happened to miss a class.
pub trait Classifier: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Class-probability matrix, one row per sample
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Most probable class index per sample
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|r| argmax(r) as f64).collect())
    }

    /// Normalized feature importances, if the model defines them
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Validate that `x` and `y` agree on the sample count and are non-empty
pub fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ExoError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(ExoError::TrainingError("Cannot fit on an empty dataset".to_string()));
    }
    Ok(())
}

/// Number of classes implied by the targets, at least `min_classes`
pub fn infer_n_classes(y: &Array1<f64>, min_classes: usize) -> usize {
    let max_label = y.iter().fold(0.0f64, |m, &v| m.max(v)).round() as usize;
    (max_label + 1).max(min_classes).max(2)
}

/// Index of the largest value; first index on ties
pub fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best = i;
        }
    }
    best
}

/// Logistic function, clamped to avoid overflow
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z.clamp(-500.0, 500.0)).exp())
}

/// Renormalize each row to sum to one; all-zero rows become uniform
pub fn normalize_rows(proba: &mut Array2<f64>) {
    let n_classes = proba.ncols().max(1) as f64;
    for mut row in proba.rows_mut() {
        let sum: f64 = row.sum();
        if sum > 0.0 && sum.is_finite() {
            row.mapv_inplace(|v| v / sum);
        } else {
            row.fill(1.0 / n_classes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_first_on_tie() {
        assert_eq!(argmax(array![0.2, 0.4, 0.4].view()), 1);
        assert_eq!(argmax(array![0.9, 0.1].view()), 0);
    }

    #[test]
    fn test_infer_n_classes() {
        assert_eq!(infer_n_classes(&array![0.0, 0.0], 0), 2);
        assert_eq!(infer_n_classes(&array![0.0, 2.0], 0), 3);
        assert_eq!(infer_n_classes(&array![0.0, 1.0], 3), 3);
    }

    #[test]
    fn test_normalize_rows() {
        let mut p = array![[2.0, 2.0], [0.0, 0.0]];
        normalize_rows(&mut p);
        assert_eq!(p, array![[0.5, 0.5], [0.5, 0.5]]);
    }

    #[test]
    fn test_check_xy() {
        assert!(check_xy(&array![[1.0], [2.0]], &array![0.0]).is_err());
        assert!(check_xy(&Array2::zeros((0, 2)), &Array1::zeros(0)).is_err());
        assert!(check_xy(&array![[1.0]], &array![0.0]).is_ok());
    }
}
