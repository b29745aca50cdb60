//! Training configuration

use crate::ensemble::EnsembleParams;
use crate::error::ExoError;
use crate::optimizer::ParamGrid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How much effort training spends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    /// Small ensembles, a single fit, optional downsampling
    Lightweight,
    /// Grid search with cross-validation, then refit on the best combination
    Full,
}

impl FromStr for TrainingMode {
    type Err = ExoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lightweight" | "light" => Ok(TrainingMode::Lightweight),
            "full" => Ok(TrainingMode::Full),
            other => Err(ExoError::InvalidParameter {
                name: "mode".to_string(),
                value: other.to_string(),
                reason: "expected lightweight or full".to_string(),
            }),
        }
    }
}

impl fmt::Display for TrainingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingMode::Lightweight => write!(f, "lightweight"),
            TrainingMode::Full => write!(f, "full"),
        }
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub mode: TrainingMode,

    /// Stratified downsampling bound for lightweight runs (None = keep all rows)
    pub max_samples: Option<usize>,

    /// Random seed for splits, sampling and every learner
    pub random_state: u64,

    /// Fraction of labelled rows held out for threshold tuning
    pub validation_fraction: f64,

    /// Fraction of labelled rows held out for the final report
    pub test_fraction: f64,

    /// Cross-validation folds for stacking and grid search
    pub cv_folds: usize,

    /// Starting hyperparameters; full runs overwrite the searched ones
    pub params: EnsembleParams,

    /// Grid searched in full mode
    pub grid: ParamGrid,

    /// Where the artifact files are written
    pub output_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(TrainingMode::Lightweight)
    }
}

impl TrainingConfig {
    /// Configuration with the default parameters for `mode`
    pub fn new(mode: TrainingMode) -> Self {
        let params = match mode {
            TrainingMode::Lightweight => EnsembleParams::lightweight(),
            TrainingMode::Full => EnsembleParams::default(),
        };
        Self {
            mode,
            max_samples: None,
            random_state: 42,
            validation_fraction: 0.15,
            test_fraction: 0.15,
            cv_folds: 3,
            params,
            grid: ParamGrid::default_stacking(),
            output_dir: PathBuf::from("models"),
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_cv(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_params(mut self, params: EnsembleParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Ensemble parameters with the run-level seed and fold count applied
    pub fn effective_params(&self) -> EnsembleParams {
        self.params
            .clone()
            .with_random_state(self.random_state)
            .with_cv_folds(self.cv_folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.mode, TrainingMode::Lightweight);
        assert_eq!(config.cv_folds, 3);
        assert_eq!(config.params.rf_n_estimators, 50);
        assert!((config.validation_fraction - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("FULL".parse::<TrainingMode>().unwrap(), TrainingMode::Full);
        assert_eq!("lightweight".parse::<TrainingMode>().unwrap(), TrainingMode::Lightweight);
        assert!("turbo".parse::<TrainingMode>().is_err());
        assert_eq!(TrainingMode::Full.to_string(), "full");
    }

    #[test]
    fn test_builder() {
        let config = TrainingConfig::new(TrainingMode::Full)
            .with_max_samples(500)
            .with_random_state(7)
            .with_cv(5);
        let params = config.effective_params();
        assert_eq!(params.random_state, 7);
        assert_eq!(params.cv_folds, 5);
        assert_eq!(config.max_samples, Some(500));
        assert_eq!(params.rf_n_estimators, 100);
    }
}
