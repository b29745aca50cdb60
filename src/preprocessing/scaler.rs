//! Standard (z-score) feature scaling

use crate::error::{ExoError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature centering and scaling: (x - mean) / scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    n_samples_seen: usize,
    is_fitted: bool,
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardScaler {
    /// Create an unfitted scaler
    pub fn new() -> Self {
        Self {
            feature_names: Vec::new(),
            mean: Vec::new(),
            scale: Vec::new(),
            n_samples_seen: 0,
            is_fitted: false,
        }
    }

    /// Attach feature names (kept for the artifact file)
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    /// Fit mean and population standard deviation per column.
    ///
    /// Non-finite values are ignored; constant columns get scale 1.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(ExoError::PreprocessingError("Cannot fit scaler on empty data".to_string()));
        }

        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for col in x.axis_iter(Axis(1)) {
            let values: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
            if values.is_empty() {
                mean.push(0.0);
                scale.push(1.0);
                continue;
            }
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > 1e-12 { std } else { 1.0 });
        }

        self.mean = mean;
        self.scale = scale;
        self.n_samples_seen = x.nrows();
        self.is_fitted = true;
        Ok(self)
    }

    /// Scale a matrix with the fitted statistics
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Undo the scaling
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| v * s + m);
        }
        Ok(out)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        if x.ncols() != self.mean.len() {
            return Err(ExoError::ShapeError {
                expected: format!("{} columns", self.mean.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fitted per-feature means
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Fitted per-feature scales
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0], [4.0, 10.0], [5.0, 10.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();

        let mean = scaled.column(0).sum() / 5.0;
        assert!(mean.abs() < 1e-10);
        // population std of 1..5 is sqrt(2)
        assert!((scaler.scale()[0] - 2f64.sqrt()).abs() < 1e-10);
        // constant column keeps scale 1
        assert_eq!(scaler.scale()[1], 1.0);
        assert!(scaled.column(1).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, -3.0], [2.0, 0.5], [7.0, 9.0]];
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&x).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in x.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_fit_ignores_nan() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let mut scaler = StandardScaler::new();
        scaler.fit(&x).unwrap();
        assert!((scaler.mean()[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_and_width_errors() {
        let scaler = StandardScaler::new();
        assert!(matches!(scaler.transform(&array![[1.0]]), Err(ExoError::ModelNotFitted)));

        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(matches!(scaler.transform(&array![[1.0]]), Err(ExoError::ShapeError { .. })));
    }
}
