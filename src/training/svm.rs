//! Support Vector Machine classifier
//!
//! SMO (Sequential Minimal Optimization) over a precomputed kernel matrix,
//! one-vs-rest for multiclass, with Platt-scaled probability outputs.

use super::models::{check_xy, infer_n_classes, normalize_rows, Classifier};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of samples for eager kernel matrix computation.
/// Larger training sets are randomly subsampled down to this bound.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: u32, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    RBF,
    /// Sigmoid kernel: K(x, y) = tanh(γ * x · y + r)
    Sigmoid { coef0: f64 },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::RBF
    }
}

impl KernelType {
    /// Parse a kernel name as used in hyperparameter grids
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "linear" => Ok(KernelType::Linear),
            "rbf" => Ok(KernelType::RBF),
            "poly" | "polynomial" => Ok(KernelType::Polynomial { degree: 3, coef0: 0.0 }),
            "sigmoid" => Ok(KernelType::Sigmoid { coef0: 0.0 }),
            other => Err(ExoError::InvalidParameter {
                name: "kernel".to_string(),
                value: other.to_string(),
                reason: "expected linear, rbf, poly or sigmoid".to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KernelType::Linear => "linear",
            KernelType::Polynomial { .. } => "poly",
            KernelType::RBF => "rbf",
            KernelType::Sigmoid { .. } => "sigmoid",
        }
    }

    fn eval(&self, gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, coef0 } => (gamma * a.dot(&b) + coef0).powi(*degree as i32),
            KernelType::RBF => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * norm_sq).exp()
            }
            KernelType::Sigmoid { coef0 } => (gamma * a.dot(&b) + coef0).tanh(),
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// Kernel coefficient; `None` means 1 / (n_features * Var(X))
    pub gamma: Option<f64>,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of full passes over the data
    pub max_iter: usize,
    /// Training rows kept before the kernel matrix is built
    pub max_train_samples: usize,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::RBF,
            gamma: None,
            tol: 1e-3,
            max_iter: 200,
            max_train_samples: 2_000,
            random_state: Some(42),
        }
    }
}

/// A single binary machine plus its Platt sigmoid
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    coef: Array1<f64>,
    bias: f64,
    platt_a: f64,
    platt_b: f64,
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    /// Resolved kernel coefficient
    gamma: f64,
    n_classes: usize,
    /// One machine for binary problems, one per class otherwise
    machines: Vec<BinarySVM>,
    is_fitted: bool,
}

impl Default for SVMClassifier {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMClassifier {
    /// Create a new SVM classifier
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: 1.0,
            n_classes: 0,
            machines: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// Fit the classifier (binary directly, multiclass one-vs-rest)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        for (i, &v) in y.iter().enumerate() {
            if (v - v.round()).abs() > 1e-9 || v < 0.0 {
                return Err(ExoError::ValidationError(format!(
                    "SVM classifier requires class indices, but sample {} has label {}",
                    i, v
                )));
            }
        }
        self.n_classes = infer_n_classes(y, self.n_classes);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let limit = self.config.max_train_samples.min(MAX_KERNEL_MATRIX_SAMPLES).max(2);
        let (x_fit, y_fit) = if x.nrows() > limit {
            let mut rows: Vec<usize> = (0..x.nrows()).collect();
            rows.shuffle(&mut rng);
            rows.truncate(limit);
            rows.sort_unstable();
            debug!(rows = x.nrows(), kept = limit, "Subsampling SVM training set");
            let y_sub: Array1<f64> = rows.iter().map(|&i| y[i]).collect();
            (x.select(Axis(0), &rows), y_sub)
        } else {
            (x.to_owned(), y.to_owned())
        };

        self.gamma = self.config.gamma.unwrap_or_else(|| scale_gamma(&x_fit));
        let kernel_matrix = self.compute_kernel_matrix(&x_fit);

        let targets: Vec<usize> = if self.n_classes == 2 { vec![1] } else { (0..self.n_classes).collect() };
        let mut machines = Vec::with_capacity(targets.len());
        for class in targets {
            let y_binary: Array1<f64> = y_fit.mapv(|v| if v as usize == class { 1.0 } else { -1.0 });
            machines.push(self.train_machine(&x_fit, &y_binary, &kernel_matrix, &mut rng));
        }

        self.machines = machines;
        self.is_fitted = true;
        Ok(())
    }

    fn train_machine(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        kernel_matrix: &Array2<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> BinarySVM {
        let (alphas, bias) = self.smo_train(y, kernel_matrix, rng);

        let support: Vec<usize> = (0..alphas.len()).filter(|&i| alphas[i] > 1e-8).collect();
        let coef: Array1<f64> = support.iter().map(|&i| alphas[i] * y[i]).collect();

        // Decision values on the training rows calibrate the sigmoid
        let decisions: Vec<f64> = (0..x.nrows())
            .map(|k| support.iter().zip(coef.iter()).map(|(&i, c)| c * kernel_matrix[[i, k]]).sum::<f64>() + bias)
            .collect();
        let (platt_a, platt_b) = platt_scaling(&decisions, y);

        BinarySVM {
            support_vectors: x.select(Axis(0), &support),
            coef,
            bias,
            platt_a,
            platt_b,
        }
    }

    /// SMO training algorithm with a cached output vector
    fn smo_train(
        &self,
        y: &Array1<f64>,
        k: &Array2<f64>,
        rng: &mut Xoshiro256PlusPlus,
    ) -> (Array1<f64>, f64) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas: Array1<f64> = Array1::zeros(n);
        let mut bias = 0.0;
        // f[k] = sum_i alpha_i y_i K(i, k), excluding bias
        let mut f: Array1<f64> = Array1::zeros(n);

        if n <= 1 {
            return (alphas, bias);
        }

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = f[i] + bias - y[i];

                // KKT violation check
                if !((y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0)) {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = f[j] + bias - y[j];

                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                let (l, h) = if y[i] != y[j] {
                    ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                } else {
                    ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let alpha_j = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alpha_j - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                let alpha_i = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha_j);
                alphas[i] = alpha_i;
                alphas[j] = alpha_j;

                let d_i = y[i] * (alpha_i - alpha_i_old);
                let d_j = y[j] * (alpha_j - alpha_j_old);

                let b1 = bias - e_i - d_i * k[[i, i]] - d_j * k[[i, j]];
                let b2 = bias - e_j - d_i * k[[i, j]] - d_j * k[[j, j]];
                bias = if alpha_i > 0.0 && alpha_i < c {
                    b1
                } else if alpha_j > 0.0 && alpha_j < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                let row_i = k.row(i);
                let row_j = k.row(j);
                for m in 0..n {
                    f[m] += d_i * row_i[m] + d_j * row_j[m];
                }

                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        (alphas, bias)
    }

    /// Compute kernel matrix, rows in parallel
    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let kernel = &self.config.kernel;
        let gamma = self.gamma;

        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| kernel.eval(gamma, x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                k[[i, j]] = v;
            }
        }
        k
    }

    /// Raw decision values, one column per machine
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }

        let kernel = &self.config.kernel;
        let gamma = self.gamma;
        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|r| {
                let sample = x.row(r);
                self.machines
                    .iter()
                    .map(|m| {
                        m.support_vectors
                            .rows()
                            .into_iter()
                            .zip(m.coef.iter())
                            .map(|(sv, c)| c * kernel.eval(gamma, sample, sv))
                            .sum::<f64>()
                            + m.bias
                    })
                    .collect()
            })
            .collect();

        let mut out = Array2::zeros((x.nrows(), self.machines.len()));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, v) in row.into_iter().enumerate() {
                out[[r, c]] = v;
            }
        }
        Ok(out)
    }

    /// Platt-calibrated class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let decisions = self.decision_function(x)?;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));

        if self.n_classes == 2 {
            let m = &self.machines[0];
            for (r, &d) in decisions.column(0).iter().enumerate() {
                let p = platt_probability(d, m.platt_a, m.platt_b);
                proba[[r, 1]] = p;
                proba[[r, 0]] = 1.0 - p;
            }
        } else {
            for (c, m) in self.machines.iter().enumerate() {
                for (r, &d) in decisions.column(c).iter().enumerate() {
                    proba[[r, c]] = platt_probability(d, m.platt_a, m.platt_b);
                }
            }
            normalize_rows(&mut proba);
        }
        Ok(proba)
    }

    /// Total number of support vectors across machines
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }
}

impl Classifier for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        SVMClassifier::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        SVMClassifier::predict_proba(self, x)
    }
}

/// 1 / (n_features * Var(X)) over all entries
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let n = x.len() as f64;
    if n == 0.0 {
        return 1.0;
    }
    let mean = x.sum() / n;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var > 1e-12 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

/// P(y = +1 | f) = 1 / (1 + exp(A f + B)), evaluated stably
fn platt_probability(decision: f64, a: f64, b: f64) -> f64 {
    let f_ap_b = decision * a + b;
    if f_ap_b >= 0.0 {
        (-f_ap_b).exp() / (1.0 + (-f_ap_b).exp())
    } else {
        1.0 / (1.0 + f_ap_b.exp())
    }
}

/// Fit Platt's sigmoid with Newton's method and backtracking line search.
///
/// `labels` are ±1. Targets are smoothed by the class priors.
fn platt_scaling(decisions: &[f64], labels: &Array1<f64>) -> (f64, f64) {
    let prior1 = labels.iter().filter(|&&v| v > 0.0).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels.iter().map(|&v| if v > 0.0 { hi_target } else { lo_target }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(targets.iter())
            .map(|(&f, &t)| {
                let f_ap_b = f * a + b;
                if f_ap_b >= 0.0 {
                    t * f_ap_b + (1.0 + (-f_ap_b).exp()).ln()
                } else {
                    (t - 1.0) * f_ap_b + (1.0 + f_ap_b.exp()).ln()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);
    let sigma = 1e-12;

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (sigma, sigma, 0.0, 0.0, 0.0);
        for (&f, &t) in decisions.iter().zip(targets.iter()) {
            let p = platt_probability(f, a, b);
            let q = 1.0 - p;
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= 1e-10 {
            let (new_a, new_b) = (a + step * da, b + step * db);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            break;
        }
    }

    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [-2.0, -2.0], [-2.5, -1.5], [-1.5, -2.5], [-3.0, -2.0],
            [2.0, 2.0], [2.5, 1.5], [1.5, 2.5], [3.0, 2.0],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_binary_svm() {
        let (x, y) = separable();
        let mut svm = SVMClassifier::default();
        svm.fit(&x, &y).unwrap();

        let decisions = svm.decision_function(&x).unwrap();
        for (d, &label) in decisions.column(0).iter().zip(y.iter()) {
            assert_eq!(*d > 0.0, label > 0.5);
        }

        let proba = svm.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-10);
        }
        // calibrated probabilities still rank the classes correctly
        assert!(proba[[4, 1]] > proba[[0, 1]]);
    }

    #[test]
    fn test_multiclass_ovr() {
        let x = array![
            [0.0, 0.0], [0.2, 0.1], [0.1, 0.2],
            [5.0, 0.0], [5.2, 0.1], [5.1, 0.2],
            [0.0, 5.0], [0.2, 5.1], [0.1, 5.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut svm = SVMClassifier::new(SVMConfig { c: 10.0, ..Default::default() });
        svm.fit(&x, &y).unwrap();

        let proba = svm.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        let preds = Classifier::predict(&svm, &x).unwrap();
        assert_eq!(preds.to_vec(), y.to_vec());
    }

    #[test]
    fn test_subsampling_bounds_support_vectors() {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { i as f64 / 10.0 } else { (i % 7) as f64 });
        let y: Array1<f64> = (0..n).map(|i| if i < n / 2 { 0.0 } else { 1.0 }).collect();
        let mut svm = SVMClassifier::new(SVMConfig { max_train_samples: 20, ..Default::default() });
        svm.fit(&x, &y).unwrap();
        assert!(svm.n_support_vectors() <= 20);
        assert_eq!(svm.predict_proba(&x).unwrap().nrows(), n);
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(KernelType::from_name("RBF").unwrap(), KernelType::RBF);
        assert_eq!(KernelType::from_name("linear").unwrap().name(), "linear");
        assert!(KernelType::from_name("cubic").is_err());
    }

    #[test]
    fn test_rejects_non_integer_labels() {
        let mut svm = SVMClassifier::default();
        assert!(svm.fit(&array![[0.0], [1.0]], &array![0.0, 0.5]).is_err());
    }
}
