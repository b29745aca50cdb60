//! Training engine implementation
//!
//! End-to-end pipeline from a labelled survey CSV to a persisted artifact
//! bundle: schema normalization, imputation, label encoding, stratified
//! splitting, scaling, ensemble fitting (optionally grid searched), threshold
//! tuning and held-out evaluation.

use super::config::{TrainingConfig, TrainingMode};
use super::cross_validation::{stratified_subsample, stratified_train_val_test_split};
use crate::ensemble::{LearnerKind, StackingClassifier};
use crate::error::{ExoError, Result};
use crate::evaluation::{
    accuracy, evaluate, tune_threshold, ClassificationReport, DecisionRule, NEUTRAL_THRESHOLD,
};
use crate::export::{ArtifactBundle, ArtifactPaths, TrainedEnsemble};
use crate::optimizer::{GridSearch, ParamValue};
use crate::preprocessing::{extract_raw, impute_raw, median_fill, LabelEncoder, StandardScaler};
use crate::schema::{canonical_keys, label_values, SchemaNormalizer};
use crate::utils::DataLoader;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Summary of the grid search stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSummary {
    pub n_combinations: usize,
    pub best_params: Vec<(String, ParamValue)>,
    pub best_cv_accuracy: f64,
    pub duration_secs: f64,
}

/// Everything a training run measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub mode: TrainingMode,
    pub n_rows_loaded: usize,
    pub n_rows_labelled: usize,
    pub n_train: usize,
    pub n_validation: usize,
    pub n_test: usize,
    pub class_names: Vec<String>,
    pub class_counts: BTreeMap<String, usize>,
    /// Argmax accuracy of the ensemble on the validation split
    pub validation_accuracy: Option<f64>,
    pub threshold: f64,
    /// Validation accuracy at the tuned threshold
    pub threshold_accuracy: Option<f64>,
    /// Ensemble report on the test split
    pub test_report: Option<ClassificationReport>,
    /// Test accuracy of each refit base learner
    pub base_test_accuracy: BTreeMap<String, f64>,
    pub search: Option<SearchSummary>,
    pub trained_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Rows that survive label filtering, as model inputs
struct LabelledData {
    x: Array2<f64>,
    labels: Vec<String>,
    n_rows_loaded: usize,
}

/// Main training engine
pub struct TrainEngine {
    config: TrainingConfig,
    normalizer: SchemaNormalizer,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            normalizer: SchemaNormalizer::new(),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train from a CSV file and write the artifacts to the output directory
    pub fn run(&self, data_path: impl AsRef<Path>) -> Result<TrainingReport> {
        let data_path = data_path.as_ref();
        info!(path = %data_path.display(), mode = %self.config.mode, "Loading training data");
        let df = DataLoader::new().load_csv(data_path)?;

        let (bundle, report) = self.train_frame(df)?;
        bundle.save(&ArtifactPaths::new(&self.config.output_dir))?;
        Ok(report)
    }

    /// Train from an in-memory frame without touching the filesystem
    pub fn train_frame(&self, df: DataFrame) -> Result<(ArtifactBundle, TrainingReport)> {
        let start = Instant::now();
        let seed = self.config.random_state;
        let data = self.labelled_rows(df)?;

        let mut encoder = LabelEncoder::new();
        encoder.fit(data.labels.iter());
        let n_classes = encoder.n_classes();
        if n_classes < 2 {
            return Err(ExoError::DataError(format!(
                "Training needs at least two classes, found {}",
                n_classes
            )));
        }
        let mut y = encoder.transform(&data.labels)?;
        let mut x = data.x;

        if self.config.mode == TrainingMode::Lightweight {
            if let Some(max_samples) = self.config.max_samples.filter(|&m| m < y.len()) {
                let kept = stratified_subsample(&y, max_samples, seed);
                info!(from = y.len(), to = kept.len(), "Downsampling training rows");
                x = x.select(Axis(0), &kept);
                y = y.select(Axis(0), &kept);
            }
        }

        let class_counts = count_classes(&y, encoder.classes());
        let split = stratified_train_val_test_split(
            &y,
            self.config.validation_fraction,
            self.config.test_fraction,
            seed,
        )?;
        info!(
            train = split.train.len(),
            validation = split.validation.len(),
            test = split.test.len(),
            classes = n_classes,
            "Split labelled rows"
        );

        let mut scaler = StandardScaler::new().with_feature_names(canonical_keys().iter().map(|s| s.to_string()).collect());
        let x_train = scaler.fit_transform(&x.select(Axis(0), &split.train))?;
        let y_train = y.select(Axis(0), &split.train);
        let x_val = scaler.transform(&x.select(Axis(0), &split.validation))?;
        let y_val = y.select(Axis(0), &split.validation);
        let x_test = scaler.transform(&x.select(Axis(0), &split.test))?;
        let y_test = y.select(Axis(0), &split.test);

        let mut params = self.config.effective_params();
        let search = match self.config.mode {
            TrainingMode::Full => {
                let result = GridSearch::new(self.config.grid.clone())
                    .with_cv_folds(self.config.cv_folds)
                    .with_random_state(seed)
                    .fit(&params, &x_train, &y_train, n_classes)?;
                params = result.best_params.clone();
                Some(SearchSummary {
                    n_combinations: result.trials.len(),
                    best_params: result.best_trial().params.clone(),
                    best_cv_accuracy: result.best_score(),
                    duration_secs: result.total_duration_secs,
                })
            }
            TrainingMode::Lightweight => None,
        };

        info!(rows = x_train.nrows(), "Fitting stacking ensemble");
        let mut classifier = StackingClassifier::new(params).with_n_classes(n_classes);
        classifier.fit(&x_train, &y_train)?;

        let (validation_accuracy, threshold, threshold_accuracy) = if y_val.is_empty() {
            warn!("Validation split is empty, keeping the neutral threshold");
            (None, NEUTRAL_THRESHOLD, None)
        } else {
            let proba = classifier.predict_proba(&x_val)?;
            let val_acc = accuracy(&y_val, &DecisionRule::Argmax.apply(&proba));
            if n_classes == 2 {
                let tuned = tune_threshold(&y_val, &proba.column(1).to_owned())?;
                info!(threshold = tuned.threshold, accuracy = tuned.accuracy, "Threshold tuned");
                (Some(val_acc), tuned.threshold, Some(tuned.accuracy))
            } else {
                (Some(val_acc), NEUTRAL_THRESHOLD, None)
            }
        };

        let rule = DecisionRule::for_classes(n_classes, threshold);
        let mut base_test_accuracy = BTreeMap::new();
        let test_report = if y_test.is_empty() {
            None
        } else {
            for kind in LearnerKind::ALL {
                let proba = classifier.base_predict_proba(kind, &x_test)?;
                base_test_accuracy.insert(kind.id().to_string(), accuracy(&y_test, &rule.apply(&proba)));
            }
            let proba = classifier.predict_proba(&x_test)?;
            Some(evaluate(&y_test, &proba, rule, encoder.classes())?)
        };
        if let Some(report) = &test_report {
            info!(accuracy = report.accuracy, macro_f1 = report.macro_avg.f1, "Test evaluation");
        }

        let trained_at = Utc::now();
        let model = TrainedEnsemble {
            classifier,
            feature_names: canonical_keys().iter().map(|s| s.to_string()).collect(),
            mode: self.config.mode,
            trained_at,
        };

        let report = TrainingReport {
            mode: self.config.mode,
            n_rows_loaded: data.n_rows_loaded,
            n_rows_labelled: data.labels.len(),
            n_train: split.train.len(),
            n_validation: split.validation.len(),
            n_test: split.test.len(),
            class_names: encoder.classes().to_vec(),
            class_counts,
            validation_accuracy,
            threshold,
            threshold_accuracy,
            test_report,
            base_test_accuracy,
            search,
            trained_at,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        let bundle = ArtifactBundle::new(model, scaler, encoder, threshold)?;
        Ok((bundle, report))
    }

    /// Normalize, drop unlabelled rows and impute features with column medians
    fn labelled_rows(&self, df: DataFrame) -> Result<LabelledData> {
        let n_rows_loaded = df.height();
        let df = self.normalizer.normalize(df)?;
        let label_column = self.normalizer.resolve_label_column(&df).ok_or_else(|| {
            ExoError::DataError("No disposition column found in training data".to_string())
        })?;

        let labels = label_values(&df, &label_column)?;
        let keep: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|_| i))
            .collect();
        if keep.is_empty() {
            return Err(ExoError::DataError(format!("Column '{}' has no labels", label_column)));
        }
        if keep.len() < n_rows_loaded {
            warn!(dropped = n_rows_loaded - keep.len(), "Dropping rows without a label");
        }

        let mut x = extract_raw(&df)?.select(Axis(0), &keep);
        let fill = median_fill(&x);
        impute_raw(&mut x, &fill);

        Ok(LabelledData {
            x,
            labels: labels.into_iter().flatten().collect(),
            n_rows_loaded,
        })
    }
}

fn count_classes(y: &Array1<f64>, classes: &[String]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = classes.iter().map(|c| (c.clone(), 0)).collect();
    for &v in y.iter() {
        if let Some(name) = classes.get(v as usize) {
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleParams;
    use crate::optimizer::ParamGrid;
    use polars::prelude::*;

    fn small_params() -> EnsembleParams {
        EnsembleParams {
            rf_n_estimators: 8,
            et_n_estimators: 8,
            gb_n_estimators: 8,
            svm_max_samples: 200,
            ..EnsembleParams::lightweight()
        }
    }

    fn survey_frame(n: usize) -> DataFrame {
        let mut period = Vec::new();
        let mut radius = Vec::new();
        let mut label = Vec::new();
        for i in 0..n {
            let confirmed = i % 2 == 0;
            period.push(if confirmed { 10.0 + (i % 7) as f64 } else { 200.0 + (i % 5) as f64 });
            radius.push(if confirmed { 1.0 + (i % 3) as f64 * 0.1 } else { 12.0 });
            label.push(if i % 9 == 4 { "" } else if confirmed { "CONFIRMED" } else { "FALSE POSITIVE" });
        }
        DataFrame::new(vec![
            Series::new("koi_period".into(), period).into(),
            Series::new("Planetary Radius".into(), radius).into(),
            Series::new("koi_disposition".into(), label).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_train_frame_binary() {
        let config = TrainingConfig::default().with_params(small_params());
        let (bundle, report) = TrainEngine::new(config).train_frame(survey_frame(90)).unwrap();

        assert_eq!(report.class_names, vec!["CONFIRMED", "FALSE POSITIVE"]);
        assert_eq!(report.n_rows_loaded, 90);
        assert_eq!(report.n_rows_labelled, 80);
        assert_eq!(report.n_train + report.n_validation + report.n_test, 80);
        assert_eq!(report.class_counts.values().sum::<usize>(), 80);
        assert!(report.threshold >= 0.1 && report.threshold <= 0.9);
        assert!(report.test_report.as_ref().unwrap().accuracy > 0.9);
        assert_eq!(report.base_test_accuracy.len(), 5);
        assert!(report.search.is_none());
        assert_eq!(bundle.encoder.n_classes(), 2);
        assert!(bundle.scaler.is_fitted());
    }

    #[test]
    fn test_train_frame_full_mode_applies_best_params() {
        let grid = ParamGrid::new().with_param("svm__C", vec![ParamValue::Float(0.05), ParamValue::Float(5.0)]);
        let config = TrainingConfig::new(TrainingMode::Full)
            .with_params(small_params())
            .with_grid(grid);
        let (bundle, report) = TrainEngine::new(config).train_frame(survey_frame(90)).unwrap();

        let search = report.search.as_ref().unwrap();
        assert_eq!(search.n_combinations, 2);
        assert!(search.best_cv_accuracy > 0.0 && search.best_cv_accuracy <= 1.0);

        let best_c = search
            .best_params
            .iter()
            .find_map(|(name, value)| match (name.as_str(), value) {
                ("svm__C", ParamValue::Float(c)) => Some(*c),
                _ => None,
            })
            .unwrap();
        assert!(best_c == 0.05 || best_c == 5.0);
        assert_eq!(bundle.model.classifier.params().svm_c, best_c);
        assert_eq!(bundle.model.mode, TrainingMode::Full);
    }

    #[test]
    fn test_requires_label_column() {
        let df = DataFrame::new(vec![Series::new("koi_period".into(), vec![1.0, 2.0]).into()]).unwrap();
        assert!(TrainEngine::new(TrainingConfig::default()).train_frame(df).is_err());
    }

    #[test]
    fn test_single_class_rejected() {
        let df = DataFrame::new(vec![
            Series::new("koi_period".into(), vec![1.0, 2.0, 3.0]).into(),
            Series::new("disposition".into(), vec!["CP", "KP", "CONFIRMED"]).into(),
        ])
        .unwrap();
        let err = TrainEngine::new(TrainingConfig::default()).train_frame(df).unwrap_err();
        assert!(err.to_string().contains("two classes"));
    }

    #[test]
    fn test_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("kepler.csv");
        let mut df = survey_frame(60);
        crate::utils::DataSaver::save_csv(&mut df, &csv_path).unwrap();

        let config = TrainingConfig::default()
            .with_params(small_params())
            .with_output_dir(dir.path().join("models"));
        TrainEngine::new(config).run(&csv_path).unwrap();

        let paths = ArtifactPaths::new(dir.path().join("models"));
        assert!(paths.missing().is_empty());
        let bundle = ArtifactBundle::load(&paths).unwrap();
        assert_eq!(bundle.model.feature_names.len(), 7);
    }
}
