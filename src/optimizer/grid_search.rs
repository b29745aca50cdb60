//! Exhaustive grid search over ensemble hyperparameters

use crate::ensemble::{EnsembleParams, StackingClassifier};
use crate::error::{ExoError, Result};
use crate::evaluation::{accuracy, DecisionRule};
use crate::training::cross_validation::{CVResults, CVStrategy, CrossValidator};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// A single candidate value in a parameter grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(usize),
    /// Integer that may be unbounded, e.g. a tree depth
    OptInt(Option<usize>),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Positive integer view
    pub fn as_count(&self) -> Option<usize> {
        match self {
            ParamValue::Int(n) | ParamValue::OptInt(Some(n)) if *n > 0 => Some(*n),
            _ => None,
        }
    }

    /// Optional depth view; `OptInt(None)` means unbounded
    pub fn as_depth(&self) -> Option<Option<usize>> {
        match self {
            ParamValue::Int(n) if *n > 0 => Some(Some(*n)),
            ParamValue::OptInt(depth) => Some(*depth),
            _ => None,
        }
    }

    pub fn as_positive_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) if *v > 0.0 && v.is_finite() => Some(*v),
            ParamValue::Int(n) if *n > 0 => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(n) | ParamValue::OptInt(Some(n)) => write!(f, "{}", n),
            ParamValue::OptInt(None) => write!(f, "None"),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Named parameter lists, expanded in declaration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    params: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a parameter's candidate values
    pub fn with_param(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = values,
            None => self.params.push((name, values)),
        }
        self
    }

    /// Number of combinations in the grid
    pub fn len(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    /// Cartesian product; the last parameter varies fastest
    pub fn combinations(&self) -> Vec<Vec<(String, ParamValue)>> {
        let mut combos: Vec<Vec<(String, ParamValue)>> = vec![Vec::new()];
        for (name, values) in &self.params {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut combo = prefix.clone();
                        combo.push((name.clone(), v.clone()));
                        combo
                    })
                })
                .collect();
        }
        if self.params.is_empty() {
            Vec::new()
        } else {
            combos
        }
    }

    /// Grid searched by full training
    pub fn default_stacking() -> Self {
        let depths = vec![ParamValue::OptInt(Some(10)), ParamValue::OptInt(Some(15)), ParamValue::OptInt(None)];
        Self::new()
            .with_param("rf__n_estimators", vec![ParamValue::Int(50), ParamValue::Int(100)])
            .with_param("rf__max_depth", depths.clone())
            .with_param("et__n_estimators", vec![ParamValue::Int(50), ParamValue::Int(100)])
            .with_param("et__max_depth", depths)
            .with_param("svm__C", vec![ParamValue::Float(0.1), ParamValue::Float(1.0)])
            .with_param("svm__kernel", vec![ParamValue::Text("rbf".to_string())])
    }
}

/// Outcome of one grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTrial {
    pub trial_id: usize,
    pub params: Vec<(String, ParamValue)>,
    pub cv: CVResults,
    pub duration_secs: f64,
}

/// All trials plus the winning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub trials: Vec<GridTrial>,
    pub best_trial_idx: usize,
    pub best_params: EnsembleParams,
    pub total_duration_secs: f64,
}

impl GridSearchResult {
    pub fn best_trial(&self) -> &GridTrial {
        &self.trials[self.best_trial_idx]
    }

    pub fn best_score(&self) -> f64 {
        self.best_trial().cv.mean_score
    }
}

/// Cross-validated accuracy search over a `ParamGrid`
pub struct GridSearch {
    grid: ParamGrid,
    cv_folds: usize,
    random_state: u64,
}

impl GridSearch {
    pub fn new(grid: ParamGrid) -> Self {
        Self {
            grid,
            cv_folds: 3,
            random_state: 42,
        }
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Score every combination and keep the first with the highest mean accuracy
    pub fn fit(
        &self,
        base: &EnsembleParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
    ) -> Result<GridSearchResult> {
        let combos = self.grid.combinations();
        if combos.is_empty() {
            return Err(ExoError::ConfigError("Parameter grid is empty".to_string()));
        }

        let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.cv_folds,
            shuffle: true,
        })
        .with_random_state(self.random_state)
        .split(x.nrows(), Some(y))?;

        info!(combinations = combos.len(), folds = self.cv_folds, "Starting grid search");
        let start = Instant::now();
        let mut trials = Vec::with_capacity(combos.len());
        let mut best: Option<(usize, f64)> = None;

        for (trial_id, combo) in combos.into_iter().enumerate() {
            let trial_start = Instant::now();
            let mut params = base.clone();
            for (name, value) in &combo {
                params.set(name, value)?;
            }

            let mut scores = Vec::with_capacity(splits.len());
            for split in &splits {
                let mut model = StackingClassifier::new(params.clone()).with_n_classes(n_classes);
                model.fit(&x.select(Axis(0), &split.train_indices), &y.select(Axis(0), &split.train_indices))?;
                let proba = model.predict_proba(&x.select(Axis(0), &split.test_indices))?;
                scores.push(accuracy(&y.select(Axis(0), &split.test_indices), &DecisionRule::Argmax.apply(&proba)));
            }
            let cv = CVResults::from_scores(scores);

            debug!(trial = trial_id, mean = cv.mean_score, std = cv.std_score, "Grid point scored");
            if best.map_or(true, |(_, score)| cv.mean_score > score) {
                best = Some((trial_id, cv.mean_score));
            }

            trials.push(GridTrial {
                trial_id,
                params: combo,
                cv,
                duration_secs: trial_start.elapsed().as_secs_f64(),
            });
        }

        let best_trial_idx = best.map_or(0, |(idx, _)| idx);
        let mut best_params = base.clone();
        for (name, value) in &trials[best_trial_idx].params {
            best_params.set(name, value)?;
        }

        info!(
            best_trial = best_trial_idx,
            best_score = trials[best_trial_idx].cv.mean_score,
            "Grid search finished"
        );

        Ok(GridSearchResult {
            trials,
            best_trial_idx,
            best_params,
            total_duration_secs: start.elapsed().as_secs_f64(),
        })
    }
}
