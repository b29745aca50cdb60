//! Hyperparameter search module
//!
//! Exhaustive grid search over named `learner__param` values, scored by
//! stratified cross-validated accuracy of the full stacking ensemble.

mod grid_search;

pub use grid_search::{GridSearch, GridSearchResult, GridTrial, ParamGrid, ParamValue};
