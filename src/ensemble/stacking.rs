//! Stacking ensemble method
//!
//! Base learners are trained on each cross-validation fold and predict class
//! probabilities on the held-out part. Those out-of-fold probabilities become
//! the meta learner's inputs, after which every base learner is refit on the
//! full training set.

use super::learners::{BaseLearner, EnsembleParams, LearnerKind};
use crate::error::{ExoError, Result};
use crate::training::cross_validation::{CVStrategy, CrossValidator};
use crate::training::linear_models::LogisticRegression;
use crate::training::models::{check_xy, infer_n_classes, Classifier};
use ndarray::{s, Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Stacking classifier over the five heterogeneous base learners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingClassifier {
    params: EnsembleParams,
    /// Base learners, in `LearnerKind::ALL` order once fitted
    learners: Vec<BaseLearner>,
    meta: LogisticRegression,
    n_classes: usize,
    is_fitted: bool,
}

impl StackingClassifier {
    pub fn new(params: EnsembleParams) -> Self {
        let meta = LogisticRegression::new().with_c(params.meta_c);
        Self {
            params,
            learners: Vec::new(),
            meta,
            n_classes: 0,
            is_fitted: false,
        }
    }

    /// Declare the number of classes so probability widths stay fixed
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit the ensemble
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.n_classes = infer_n_classes(y, self.n_classes);
        let k = self.n_classes;
        let n_learners = LearnerKind::ALL.len();

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.params.cv_folds,
            shuffle: true,
        })
        .with_random_state(self.params.random_state);
        let splits = cv.split(x.nrows(), Some(y))?;

        let mut meta_features = Array2::zeros((x.nrows(), n_learners * k));

        for split in &splits {
            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_test = x.select(Axis(0), &split.test_indices);

            let fold_proba: Vec<Result<Array2<f64>>> = LearnerKind::ALL
                .par_iter()
                .map(|&kind| {
                    let mut learner = BaseLearner::build(kind, &self.params, k)?;
                    learner.fit(&x_train, &y_train)?;
                    learner.predict_proba(&x_test)
                })
                .collect();

            for (learner_idx, proba) in fold_proba.into_iter().enumerate() {
                let proba = proba?;
                for (local_idx, &global_idx) in split.test_indices.iter().enumerate() {
                    meta_features
                        .slice_mut(s![global_idx, learner_idx * k..(learner_idx + 1) * k])
                        .assign(&proba.row(local_idx));
                }
            }
            debug!(fold = split.fold_idx, rows = split.test_indices.len(), "Out-of-fold predictions collected");
        }

        self.meta = LogisticRegression::new().with_c(self.params.meta_c).with_n_classes(k);
        self.meta.fit(&meta_features, y)?;

        let learners: Vec<Result<BaseLearner>> = LearnerKind::ALL
            .par_iter()
            .map(|&kind| {
                let mut learner = BaseLearner::build(kind, &self.params, k)?;
                learner.fit(x, y)?;
                Ok(learner)
            })
            .collect();
        self.learners = learners.into_iter().collect::<Result<Vec<_>>>()?;
        self.is_fitted = true;

        Ok(())
    }

    fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let k = self.n_classes;
        let mut features = Array2::zeros((x.nrows(), self.learners.len() * k));
        for (idx, learner) in self.learners.iter().enumerate() {
            let proba = learner.predict_proba(x)?;
            features.slice_mut(s![.., idx * k..(idx + 1) * k]).assign(&proba);
        }
        Ok(features)
    }

    /// Meta learner probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ExoError::ModelNotFitted);
        }
        self.meta.predict_proba(&self.meta_features(x)?)
    }

    /// A refit base learner
    pub fn learner(&self, kind: LearnerKind) -> Option<&BaseLearner> {
        self.learners.iter().find(|l| l.kind() == kind)
    }

    pub fn learners(&self) -> &[BaseLearner] {
        &self.learners
    }

    /// Probabilities from a single refit base learner
    pub fn base_predict_proba(&self, kind: LearnerKind, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.learner(kind).ok_or(ExoError::ModelNotFitted)?.predict_proba(x)
    }

    /// Mean of the tree-based learners' importances
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        let importances: Vec<Array1<f64>> = self
            .learners
            .iter()
            .filter(|l| l.kind().is_tree_based())
            .filter_map(|l| l.feature_importances())
            .collect();
        let first = importances.first()?;
        let mut mean = Array1::zeros(first.len());
        for imp in &importances {
            if imp.len() == mean.len() {
                mean += imp;
            }
        }
        mean /= importances.len() as f64;
        Some(mean)
    }
}

impl Classifier for StackingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        StackingClassifier::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        StackingClassifier::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        StackingClassifier::feature_importances(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> EnsembleParams {
        EnsembleParams {
            rf_n_estimators: 10,
            et_n_estimators: 10,
            gb_n_estimators: 10,
            svm_max_samples: 200,
            ..EnsembleParams::default()
        }
    }

    fn blobs(n_classes: usize, n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((n, 3));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let class = i % n_classes;
            x[[i, 0]] = class as f64 * 4.0 + (i as f64 * 0.7).sin();
            x[[i, 1]] = -(class as f64) * 2.0 + (i as f64 * 0.3).cos();
            x[[i, 2]] = (i as f64 * 1.3).sin();
            y[i] = class as f64;
        }
        (x, y)
    }

    #[test]
    fn test_stacking_binary() {
        let (x, y) = blobs(2, 60);
        let mut model = StackingClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (60, 2));
        let preds = Classifier::predict(&model, &x).unwrap();
        let correct = preds.iter().zip(y.iter()).filter(|(p, a)| p == a).count();
        assert!(correct >= 54);
    }

    #[test]
    fn test_stacking_multiclass_rows_sum_to_one() {
        let (x, y) = blobs(3, 60);
        let mut model = StackingClassifier::new(small_params());
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.learners().len(), 5);
        let svm = model.base_predict_proba(LearnerKind::Svm, &x).unwrap();
        assert_eq!(svm.ncols(), 3);
    }

    #[test]
    fn test_importances_cover_features() {
        let (x, y) = blobs(2, 40);
        let mut model = StackingClassifier::new(small_params());
        model.fit(&x, &y).unwrap();
        let imp = model.feature_importances().unwrap();
        assert_eq!(imp.len(), 3);
        assert!(imp[0] > imp[2]);
    }

    #[test]
    fn test_unfitted() {
        let model = StackingClassifier::new(EnsembleParams::default());
        assert!(matches!(model.predict_proba(&Array2::zeros((1, 3))), Err(ExoError::ModelNotFitted)));
    }
}
