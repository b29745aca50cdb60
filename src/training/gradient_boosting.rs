//! Gradient Boosting implementation
//!
//! Gradient boosted regression trees on the log-loss gradient. Binary targets
//! train a single booster; multiclass targets train one booster per class
//! (one-vs-rest) and renormalize the per-class probabilities.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::models::{check_xy, infer_n_classes, normalize_rows, sigmoid, Classifier};
use crate::error::{ExoError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

/// One binary log-odds booster
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryBooster {
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    feature_importances: Vec<f64>,
}

impl BinaryBooster {
    fn fit(config: &GradientBoostingConfig, x: &Array2<f64>, y: &Array1<f64>, seed: u64) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        let initial_log_odds = (p / (1.0 - p)).ln();
        let mut log_odds = Array1::from_elem(n_samples, initial_log_odds);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut booster = Self {
            trees: Vec::with_capacity(config.n_estimators),
            col_indices_per_tree: Vec::with_capacity(config.n_estimators),
            initial_log_odds,
            feature_importances: vec![0.0; n_features],
        };

        for _ in 0..config.n_estimators {
            // Gradient of log loss
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(yi, &lo)| yi - sigmoid(lo))
                .collect();

            let row_indices = sample_indices(n_samples, config.subsample, &mut rng);
            let col_indices = sample_indices(n_features, config.colsample_bytree, &mut rng);

            let x_cols = x.select(Axis(1), &col_indices);
            let x_sub = x_cols.select(Axis(0), &row_indices);
            let y_sub: Array1<f64> = row_indices.iter().map(|&i| residuals[i]).collect();

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(config.max_depth)
                .with_min_samples_leaf(config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            let update = tree.predict(&x_cols)?;
            log_odds.scaled_add(config.learning_rate, &update);

            if let Some(tree_importance) = tree.feature_importances() {
                for (j, &col_idx) in col_indices.iter().enumerate() {
                    booster.feature_importances[col_idx] += tree_importance[j];
                }
            }

            booster.trees.push(tree);
            booster.col_indices_per_tree.push(col_indices);
        }

        Ok(booster)
    }

    fn positive_proba(&self, x: &Array2<f64>, learning_rate: f64) -> Result<Array1<f64>> {
        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, cols) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let update = tree.predict(&x.select(Axis(1), cols))?;
            log_odds.scaled_add(learning_rate, &update);
        }
        Ok(log_odds.mapv(sigmoid))
    }
}

/// Sorted random subset of `ceil(n * ratio)` indices
fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let sample_size = (((n as f64) * ratio).ceil() as usize).clamp(1, n.max(1));
    let mut indices: Vec<usize> = (0..n).collect();
    if sample_size < n {
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
    }
    indices
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    boosters: Vec<BinaryBooster>,
    n_classes: usize,
    feature_importances: Vec<f64>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            boosters: Vec::new(),
            n_classes: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Fit one booster (binary) or one per class (multiclass)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_classes = infer_n_classes(y, self.n_classes);
        let seed = self.config.random_state.unwrap_or(42);

        let targets: Vec<usize> = if self.n_classes == 2 { vec![1] } else { (0..self.n_classes).collect() };

        let boosters: Vec<Result<BinaryBooster>> = targets
            .par_iter()
            .map(|&class| {
                let y_bin: Array1<f64> = y.mapv(|v| if v as usize == class { 1.0 } else { 0.0 });
                BinaryBooster::fit(&self.config, x, &y_bin, seed.wrapping_add(class as u64))
            })
            .collect();
        self.boosters = boosters.into_iter().collect::<Result<Vec<_>>>()?;

        let mut importances = vec![0.0; x.ncols()];
        for booster in &self.boosters {
            for (total, &v) in importances.iter_mut().zip(booster.feature_importances.iter()) {
                *total += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = importances;

        Ok(())
    }

    /// Class probabilities; multiclass rows are renormalized one-vs-rest scores
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.boosters.is_empty() {
            return Err(ExoError::ModelNotFitted);
        }

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        if self.n_classes == 2 {
            let p = self.boosters[0].positive_proba(x, self.config.learning_rate)?;
            proba.column_mut(1).assign(&p);
            proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
        } else {
            for (class, booster) in self.boosters.iter().enumerate() {
                let p = booster.positive_proba(x, self.config.learning_rate)?;
                proba.column_mut(class).assign(&p);
            }
            normalize_rows(&mut proba);
        }
        Ok(proba)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

impl Classifier for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GradientBoostingClassifier::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        GradientBoostingClassifier::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.feature_importances.is_empty() {
            None
        } else {
            Some(Array1::from_vec(self.feature_importances.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data(n_classes: usize) -> (Array2<f64>, Array1<f64>) {
        let n = 60;
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let class = i % n_classes;
            x[[i, 0]] = class as f64 * 3.0 + (i as f64 * 0.37).sin() * 0.5;
            x[[i, 1]] = (i as f64 * 0.11).cos();
            y[i] = class as f64;
        }
        (x, y)
    }

    #[test]
    fn test_binary_classifier() {
        let (x, y) = create_classification_data(2);
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 30,
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();

        let proba = gb.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        let preds = Classifier::predict(&gb, &x).unwrap();
        let correct = preds.iter().zip(y.iter()).filter(|(p, a)| (*p - *a).abs() < 0.5).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn test_multiclass_one_vs_rest() {
        let (x, y) = create_classification_data(3);
        let mut gb = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        });
        gb.fit(&x, &y).unwrap();

        let proba = gb.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        let preds = Classifier::predict(&gb, &x).unwrap();
        let correct = preds.iter().zip(y.iter()).filter(|(p, a)| (*p - *a).abs() < 0.5).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn test_row_and_column_subsampling_is_seeded() {
        let (x, y) = create_classification_data(2);
        let config = GradientBoostingConfig {
            n_estimators: 15,
            subsample: 0.5,
            colsample_bytree: 0.5,
            random_state: Some(7),
            ..Default::default()
        };

        let mut first = GradientBoostingClassifier::new(config.clone());
        first.fit(&x, &y).unwrap();
        let mut second = GradientBoostingClassifier::new(config);
        second.fit(&x, &y).unwrap();

        let proba = first.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (x.nrows(), 2));
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(proba, second.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_feature_importances() {
        let (x, y) = create_classification_data(2);
        let mut gb = GradientBoostingClassifier::default();
        gb.fit(&x, &y).unwrap();
        let imp = gb.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!(imp[0] > imp[1]);
    }
}
