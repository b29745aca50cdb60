//! ExoAI - Stacking-ensemble exoplanet candidate classifier
//!
//! This crate provides:
//! - Schema normalization of Kepler, K2 and TESS catalog exports
//! - Training of a five-learner stacking ensemble with threshold tuning
//! - A prediction service with per-feature attributions
//! - An HTTP API and a command-line interface
//!
//! # Modules
//!
//! ## Data
//! - [`schema`] - Canonical feature set and header/label normalization
//! - [`preprocessing`] - Scaling, label encoding, coercion and imputation
//! - [`dataset`] - Paginated browsing of mission snapshots
//!
//! ## Modelling
//! - [`training`] - Base learners, cross-validation and the training pipeline
//! - [`ensemble`] - Stacking classifier over the base learners
//! - [`optimizer`] - Grid search for full training runs
//! - [`evaluation`] - Metrics and decision-threshold tuning
//! - [`export`] - Artifact bundle persistence
//!
//! ## Serving
//! - [`inference`] - Single and batch prediction
//! - [`explainability`] - Occlusion attributions and rationales
//! - [`server`] - HTTP API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod schema;
pub mod preprocessing;
pub mod dataset;
pub mod utils;

// Modelling
pub mod training;
pub mod ensemble;
pub mod optimizer;
pub mod evaluation;
pub mod export;

// Serving
pub mod inference;
pub mod explainability;
pub mod server;
pub mod cli;

pub use error::{ExoError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ExoError, Result};
    pub use crate::schema::{Feature, SchemaNormalizer};
    pub use crate::preprocessing::{FeaturePreparer, LabelEncoder, StandardScaler};
    pub use crate::training::{TrainEngine, TrainingConfig, TrainingMode, TrainingReport};
    pub use crate::ensemble::{EnsembleParams, LearnerKind, StackingClassifier};
    pub use crate::optimizer::{GridSearch, ParamGrid, ParamValue};
    pub use crate::evaluation::{tune_threshold, ClassificationReport, DecisionRule};
    pub use crate::export::{ArtifactBundle, ArtifactPaths};
    pub use crate::inference::{ModelSelector, Prediction, Predictor};
    pub use crate::dataset::{DatasetBrowser, DatasetQuery, Mission};
    pub use crate::utils::{DataLoader, DataSaver};
}
