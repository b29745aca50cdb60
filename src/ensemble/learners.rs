//! Base learners of the stacking ensemble and their hyperparameters

use crate::error::{ExoError, Result};
use crate::optimizer::ParamValue;
use crate::training::extra_trees::ExtraTrees;
use crate::training::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use crate::training::models::Classifier;
use crate::training::naive_bayes::GaussianNaiveBayes;
use crate::training::random_forest::RandomForest;
use crate::training::svm::{KernelType, SVMClassifier, SVMConfig};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Identifies one member of the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LearnerKind {
    RandomForest,
    ExtraTrees,
    GradientBoosting,
    Svm,
    NaiveBayes,
}

impl LearnerKind {
    /// Members in stacking order
    pub const ALL: [LearnerKind; 5] = [
        LearnerKind::RandomForest,
        LearnerKind::ExtraTrees,
        LearnerKind::GradientBoosting,
        LearnerKind::Svm,
        LearnerKind::NaiveBayes,
    ];

    /// Short id used in parameter names and by the API
    pub fn id(&self) -> &'static str {
        match self {
            LearnerKind::RandomForest => "rf",
            LearnerKind::ExtraTrees => "et",
            LearnerKind::GradientBoosting => "gb",
            LearnerKind::Svm => "svm",
            LearnerKind::NaiveBayes => "nb",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LearnerKind::RandomForest => "Random Forest",
            LearnerKind::ExtraTrees => "Extra Trees",
            LearnerKind::GradientBoosting => "Gradient Boosting",
            LearnerKind::Svm => "Support Vector Machine",
            LearnerKind::NaiveBayes => "Gaussian Naive Bayes",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    /// Whether the learner reports impurity-based feature importances
    pub fn is_tree_based(&self) -> bool {
        matches!(
            self,
            LearnerKind::RandomForest | LearnerKind::ExtraTrees | LearnerKind::GradientBoosting
        )
    }
}

/// Hyperparameters of every base learner plus the meta learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub rf_n_estimators: usize,
    pub rf_max_depth: Option<usize>,
    pub et_n_estimators: usize,
    pub et_max_depth: Option<usize>,
    pub gb_n_estimators: usize,
    pub gb_learning_rate: f64,
    pub gb_max_depth: usize,
    pub svm_c: f64,
    pub svm_kernel: String,
    /// Rows the SVM keeps before building its kernel matrix
    pub svm_max_samples: usize,
    /// Inverse regularization of the logistic meta learner
    pub meta_c: f64,
    /// Folds used to build out-of-fold meta features
    pub cv_folds: usize,
    pub random_state: u64,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            rf_n_estimators: 100,
            rf_max_depth: None,
            et_n_estimators: 100,
            et_max_depth: None,
            gb_n_estimators: 100,
            gb_learning_rate: 0.1,
            gb_max_depth: 3,
            svm_c: 1.0,
            svm_kernel: "rbf".to_string(),
            svm_max_samples: 2_000,
            meta_c: 1.0,
            cv_folds: 3,
            random_state: 42,
        }
    }
}

impl EnsembleParams {
    /// Smaller ensembles for quick single-fit training
    pub fn lightweight() -> Self {
        Self {
            rf_n_estimators: 50,
            rf_max_depth: Some(15),
            et_n_estimators: 50,
            et_max_depth: Some(15),
            gb_n_estimators: 50,
            svm_max_samples: 1_000,
            ..Self::default()
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Assign one `learner__param` value, as named in a search grid
    pub fn set(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let invalid = |reason: &str| ExoError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match name {
            "rf__n_estimators" => self.rf_n_estimators = value.as_count().ok_or_else(|| invalid("expected a positive integer"))?,
            "rf__max_depth" => self.rf_max_depth = value.as_depth().ok_or_else(|| invalid("expected an integer or None"))?,
            "et__n_estimators" => self.et_n_estimators = value.as_count().ok_or_else(|| invalid("expected a positive integer"))?,
            "et__max_depth" => self.et_max_depth = value.as_depth().ok_or_else(|| invalid("expected an integer or None"))?,
            "gb__n_estimators" => self.gb_n_estimators = value.as_count().ok_or_else(|| invalid("expected a positive integer"))?,
            "gb__learning_rate" => self.gb_learning_rate = value.as_positive_float().ok_or_else(|| invalid("expected a positive number"))?,
            "gb__max_depth" => self.gb_max_depth = value.as_count().ok_or_else(|| invalid("expected a positive integer"))?,
            "svm__C" | "svm__c" => self.svm_c = value.as_positive_float().ok_or_else(|| invalid("expected a positive number"))?,
            "svm__kernel" => {
                let kernel = value.as_text().ok_or_else(|| invalid("expected a kernel name"))?;
                KernelType::from_name(kernel)?;
                self.svm_kernel = kernel.to_lowercase();
            }
            _ => return Err(invalid("unknown hyperparameter")),
        }
        Ok(())
    }

    fn svm_config(&self) -> Result<SVMConfig> {
        Ok(SVMConfig {
            c: self.svm_c,
            kernel: KernelType::from_name(&self.svm_kernel)?,
            max_train_samples: self.svm_max_samples,
            random_state: Some(self.random_state),
            ..SVMConfig::default()
        })
    }
}

/// A fitted or unfitted base learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BaseLearner {
    RandomForest(RandomForest),
    ExtraTrees(ExtraTrees),
    GradientBoosting(GradientBoostingClassifier),
    Svm(SVMClassifier),
    NaiveBayes(GaussianNaiveBayes),
}

impl BaseLearner {
    /// Construct an unfitted learner of `kind`
    pub fn build(kind: LearnerKind, params: &EnsembleParams, n_classes: usize) -> Result<Self> {
        let seed = params.random_state;
        Ok(match kind {
            LearnerKind::RandomForest => BaseLearner::RandomForest(
                RandomForest::new_classifier(params.rf_n_estimators)
                    .with_max_depth(params.rf_max_depth)
                    .with_random_state(seed)
                    .with_n_classes(n_classes),
            ),
            LearnerKind::ExtraTrees => BaseLearner::ExtraTrees(
                ExtraTrees::new_classifier(params.et_n_estimators)
                    .with_max_depth(params.et_max_depth)
                    .with_random_state(seed)
                    .with_n_classes(n_classes),
            ),
            LearnerKind::GradientBoosting => BaseLearner::GradientBoosting(
                GradientBoostingClassifier::new(GradientBoostingConfig {
                    n_estimators: params.gb_n_estimators,
                    learning_rate: params.gb_learning_rate,
                    max_depth: params.gb_max_depth,
                    random_state: Some(seed),
                    ..GradientBoostingConfig::default()
                })
                .with_n_classes(n_classes),
            ),
            LearnerKind::Svm => BaseLearner::Svm(SVMClassifier::new(params.svm_config()?).with_n_classes(n_classes)),
            LearnerKind::NaiveBayes => BaseLearner::NaiveBayes(GaussianNaiveBayes::new().with_n_classes(n_classes)),
        })
    }

    pub fn kind(&self) -> LearnerKind {
        match self {
            BaseLearner::RandomForest(_) => LearnerKind::RandomForest,
            BaseLearner::ExtraTrees(_) => LearnerKind::ExtraTrees,
            BaseLearner::GradientBoosting(_) => LearnerKind::GradientBoosting,
            BaseLearner::Svm(_) => LearnerKind::Svm,
            BaseLearner::NaiveBayes(_) => LearnerKind::NaiveBayes,
        }
    }

    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            BaseLearner::RandomForest(m) => m,
            BaseLearner::ExtraTrees(m) => m,
            BaseLearner::GradientBoosting(m) => m,
            BaseLearner::Svm(m) => m,
            BaseLearner::NaiveBayes(m) => m,
        }
    }

    fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            BaseLearner::RandomForest(m) => m,
            BaseLearner::ExtraTrees(m) => m,
            BaseLearner::GradientBoosting(m) => m,
            BaseLearner::Svm(m) => m,
            BaseLearner::NaiveBayes(m) => m,
        }
    }
}

impl Classifier for BaseLearner {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_classifier_mut().fit(x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.as_classifier().predict_proba(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.as_classifier().feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learner_ids_round_trip() {
        for kind in LearnerKind::ALL {
            assert_eq!(LearnerKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(LearnerKind::from_id("stacking"), None);
    }

    #[test]
    fn test_set_grid_params() {
        let mut params = EnsembleParams::default();
        params.set("rf__n_estimators", &ParamValue::Int(50)).unwrap();
        params.set("rf__max_depth", &ParamValue::OptInt(None)).unwrap();
        params.set("et__max_depth", &ParamValue::OptInt(Some(10))).unwrap();
        params.set("svm__C", &ParamValue::Float(0.1)).unwrap();
        params.set("svm__kernel", &ParamValue::Text("RBF".to_string())).unwrap();

        assert_eq!(params.rf_n_estimators, 50);
        assert_eq!(params.rf_max_depth, None);
        assert_eq!(params.et_max_depth, Some(10));
        assert!((params.svm_c - 0.1).abs() < 1e-12);
        assert_eq!(params.svm_kernel, "rbf");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut params = EnsembleParams::default();
        assert!(params.set("rf__n_estimators", &ParamValue::Text("many".to_string())).is_err());
        assert!(params.set("svm__kernel", &ParamValue::Text("cubic".to_string())).is_err());
        assert!(params.set("knn__k", &ParamValue::Int(3)).is_err());
    }

    #[test]
    fn test_build_every_kind() {
        let params = EnsembleParams::lightweight();
        for kind in LearnerKind::ALL {
            let learner = BaseLearner::build(kind, &params, 3).unwrap();
            assert_eq!(learner.kind(), kind);
        }
    }
}
