//! Model explainability module
//!
//! Local, per-prediction feature attributions and the short rationale
//! sentence returned by the prediction API.

mod local_explanations;

pub use local_explanations::{FeatureContribution, LocalExplanation, OcclusionExplainer};
