//! Linear models
//!
//! Multinomial logistic regression, used as the stacking meta-learner.

use super::models::{check_xy, infer_n_classes, Classifier};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Softmax (multinomial) logistic regression with L2 regularization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients, shape (n_features, n_classes)
    pub coefficients: Option<Array2<f64>>,
    /// Fitted intercepts, one per class
    pub intercept: Option<Array1<f64>>,
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    n_classes: usize,
    /// Whether model is fitted
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.5,
            n_classes: 0,
            is_fitted: false,
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Row-wise softmax, shifted by the row max
    fn softmax(z: &mut Array2<f64>) {
        for mut row in z.rows_mut() {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
    }

    /// Fit the model using full-batch gradient descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_classes = infer_n_classes(y, self.n_classes);
        let k = self.n_classes;

        let mut one_hot = Array2::zeros((n_samples, k));
        for (i, &label) in y.iter().enumerate() {
            if let Some(v) = one_hot.get_mut((i, label as usize)) {
                *v = 1.0;
            }
        }

        let mut weights: Array2<f64> = Array2::zeros((n_features, k));
        let mut bias: Array1<f64> = Array1::zeros(k);
        let lr = self.learning_rate;
        let alpha = 1.0 / (self.c.max(1e-12) * n_samples as f64);

        for _iter in 0..self.max_iter {
            let mut probs = x.dot(&weights) + &bias;
            Self::softmax(&mut probs);

            let errors = probs - &one_hot;
            let dw = x.t().dot(&errors) / n_samples as f64 + alpha * &weights;
            let db = errors.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(k));

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights.scaled_add(-lr, &dw);
            bias.scaled_add(-lr, &db);
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        self.is_fitted = true;

        Ok(self)
    }

    /// Predict class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(coefficients), Some(intercept)) = (&self.coefficients, &self.intercept) else {
            return Err(ExoError::ModelNotFitted);
        };
        if x.ncols() != coefficients.nrows() {
            return Err(ExoError::ShapeError {
                expected: format!("{} columns", coefficients.nrows()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut probs = x.dot(coefficients) + intercept;
        Self::softmax(&mut probs);
        Ok(probs)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LogisticRegression::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        LogisticRegression::predict_proba(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binary_logistic() {
        let x = array![[0.0], [0.5], [1.0], [3.0], [3.5], [4.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y).unwrap();

        let proba = lr.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        assert!(proba[[0, 0]] > 0.5);
        assert!(proba[[5, 1]] > 0.5);
    }

    #[test]
    fn test_multinomial_logistic() {
        let x = array![
            [1.0, 0.0, 0.0], [0.9, 0.1, 0.0],
            [0.0, 1.0, 0.0], [0.1, 0.9, 0.0],
            [0.0, 0.0, 1.0], [0.0, 0.1, 0.9],
        ];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];

        let mut lr = LogisticRegression::new().with_max_iter(3000);
        lr.fit(&x, &y).unwrap();

        let preds = Classifier::predict(&lr, &x).unwrap();
        assert_eq!(preds.to_vec(), y.to_vec());
        for row in lr.predict_proba(&x).unwrap().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_unfitted_and_shape() {
        let lr = LogisticRegression::new();
        assert!(matches!(lr.predict_proba(&array![[1.0]]), Err(ExoError::ModelNotFitted)));

        let mut lr = LogisticRegression::new();
        lr.fit(&array![[0.0, 1.0], [1.0, 0.0]], &array![0.0, 1.0]).unwrap();
        assert!(lr.predict_proba(&array![[1.0]]).is_err());
    }
}
