//! Inference module
//!
//! Single and batch classification over the immutable artifact bundle. Every
//! path runs the same coerce, impute and scale preparation before the model.

mod predictor;

pub use predictor::{ModelSelector, Prediction, Predictor, CONFIDENCE_COLUMN, PREDICTED_LABEL_COLUMN};
