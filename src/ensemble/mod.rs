//! Ensemble methods module
//!
//! Provides the stacking ensemble used for candidate classification:
//! - Base learners (random forest, extra trees, gradient boosting, SVM, naive Bayes)
//! - Stacking with a logistic meta learner over out-of-fold probabilities

mod learners;
mod stacking;

pub use learners::{BaseLearner, EnsembleParams, LearnerKind};
pub use stacking::StackingClassifier;
