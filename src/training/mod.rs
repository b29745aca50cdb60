//! Model training module
//!
//! Provides the model families used by the stacking ensemble:
//! - Decision trees, Random Forests and Extra Trees
//! - Gradient boosting (one-vs-rest for multiclass)
//! - Support Vector Machines with Platt-scaled probabilities
//! - Gaussian Naive Bayes
//! - Multinomial logistic regression (meta learner)
//!
//! plus stratified splitting, cross-validation and the end-to-end
//! training pipeline.

mod config;
mod engine;
pub mod models;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod gradient_boosting;
pub mod naive_bayes;
pub mod svm;
pub mod extra_trees;

pub use config::{TrainingConfig, TrainingMode};
pub use engine::{SearchSummary, TrainEngine, TrainingReport};
pub use models::Classifier;
pub use cross_validation::{CrossValidator, CVStrategy, CVSplit, CVResults};
pub use linear_models::LogisticRegression;
pub use decision_tree::{DecisionTree, TreeNode, Criterion};
pub use random_forest::{RandomForest, MaxFeatures};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use naive_bayes::GaussianNaiveBayes;
pub use svm::{SVMClassifier, SVMConfig, KernelType};
pub use extra_trees::ExtraTrees;
