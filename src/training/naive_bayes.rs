//! Naive Bayes classifiers
//!
//! Implements Gaussian Naive Bayes for continuous features.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::models::{check_xy, infer_n_classes, Classifier};
use crate::error::{ExoError, Result};

/// Per-class Gaussian parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassStats {
    prior: f64,
    means: Vec<f64>,
    variances: Vec<f64>,
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Indexed by class; `None` for classes absent from the training data
    stats: Vec<Option<ClassStats>>,
    /// Smoothing added to every variance, relative to the largest feature variance
    var_smoothing: f64,
    n_classes: usize,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            stats: Vec::new(),
            var_smoothing: 1e-9,
            n_classes: 0,
        }
    }

    /// Set variance smoothing parameter
    pub fn with_var_smoothing(mut self, smoothing: f64) -> Self {
        self.var_smoothing = smoothing;
        self
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Fit the classifier
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_classes = infer_n_classes(y, self.n_classes);

        // Largest overall feature variance sets the smoothing scale
        let max_var = (0..n_features)
            .map(|j| {
                let col = x.column(j);
                let mean = col.sum() / n_samples as f64;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n_samples as f64
            })
            .fold(0.0f64, f64::max);
        let epsilon = self.var_smoothing * max_var.max(1e-12);

        self.stats = (0..self.n_classes)
            .map(|class| {
                // Single-pass Welford's algorithm for mean and variance
                let mut means = vec![0.0; n_features];
                let mut m2 = vec![0.0; n_features];
                let mut count = 0usize;
                for (row, _) in x.rows().into_iter().zip(y.iter()).filter(|(_, &yi)| yi as usize == class) {
                    count += 1;
                    for (j, &val) in row.iter().enumerate() {
                        let delta = val - means[j];
                        means[j] += delta / count as f64;
                        m2[j] += delta * (val - means[j]);
                    }
                }
                if count == 0 {
                    return None;
                }
                Some(ClassStats {
                    prior: count as f64 / n_samples as f64,
                    variances: m2.iter().map(|&v| v / count as f64 + epsilon).collect(),
                    means,
                })
            })
            .collect();

        Ok(())
    }

    /// Normalized log probabilities; absent classes get -inf
    pub fn predict_log_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stats.is_empty() {
            return Err(ExoError::ModelNotFitted);
        }

        let mut log_probs = Array2::from_elem((x.nrows(), self.n_classes), f64::NEG_INFINITY);
        for (i, row) in x.rows().into_iter().enumerate() {
            for (j, stats) in self.stats.iter().enumerate() {
                if let Some(stats) = stats {
                    log_probs[[i, j]] = stats.prior.ln() + log_likelihood(row, stats);
                }
            }
        }

        // Normalize (log-sum-exp trick)
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum: f64 = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            for val in row.iter_mut() {
                *val = *val - max_val - log_sum;
            }
        }

        Ok(log_probs)
    }

    /// Predict probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_log_proba(x)?.mapv(f64::exp))
    }

    /// Class priors indexed by class (zero for absent classes)
    pub fn class_priors(&self) -> Vec<f64> {
        self.stats.iter().map(|s| s.as_ref().map_or(0.0, |s| s.prior)).collect()
    }
}

fn log_likelihood(x: ArrayView1<f64>, stats: &ClassStats) -> f64 {
    x.iter()
        .zip(stats.means.iter())
        .zip(stats.variances.iter())
        .map(|((&xi, &mean), &var)| -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln()))
        .sum()
}

impl Classifier for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GaussianNaiveBayes::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        GaussianNaiveBayes::predict_proba(self, x)
    }
}
