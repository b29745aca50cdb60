//! Integration test: training, artifact round trip and prediction

use std::collections::HashMap;
use std::sync::Arc;

use exoai::ensemble::EnsembleParams;
use exoai::export::{ArtifactBundle, ArtifactPaths};
use exoai::inference::{Predictor, CONFIDENCE_COLUMN, PREDICTED_LABEL_COLUMN};
use exoai::schema::{Feature, N_FEATURES};
use exoai::training::{TrainEngine, TrainingConfig, TrainingMode};
use exoai::ExoError;
use ndarray::Array2;
use polars::prelude::*;

const EARTH_LIKE: [f64; N_FEATURES] = [365.25, 13.5, 1.0, 1000.0, 5778.0, 1.0, 4.44];

fn small_params() -> EnsembleParams {
    EnsembleParams {
        rf_n_estimators: 10,
        et_n_estimators: 10,
        gb_n_estimators: 10,
        svm_max_samples: 300,
        ..EnsembleParams::lightweight()
    }
}

/// Two well separated populations with canonical headers
fn koi_frame(n: usize) -> DataFrame {
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(n); N_FEATURES];
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let confirmed = i % 2 == 0;
        let jitter = (i as f64 * 0.37).sin();
        let row = if confirmed {
            [300.0 + 20.0 * jitter, 12.0 + jitter, 1.1 + 0.1 * jitter, 900.0 + 50.0 * jitter, 5700.0 + 80.0 * jitter, 1.0, 4.4]
        } else {
            [3.0 + jitter, 2.0 + 0.2 * jitter, 14.0 + jitter, 20000.0 + 500.0 * jitter, 6500.0 + 80.0 * jitter, 1.6, 4.0]
        };
        for (col, v) in columns.iter_mut().zip(row) {
            col.push(v);
        }
        labels.push(if confirmed { "CONFIRMED" } else { "FALSE POSITIVE" });
    }

    let mut series: Vec<Column> = Feature::ALL
        .iter()
        .zip(columns)
        .map(|(f, values)| Series::new(f.canonical_key().into(), values).into())
        .collect();
    series.push(Series::new("koi_disposition".into(), labels).into());
    DataFrame::new(series).unwrap()
}

fn trained_bundle() -> ArtifactBundle {
    let config = TrainingConfig::new(TrainingMode::Lightweight).with_params(small_params());
    TrainEngine::new(config).train_frame(koi_frame(120)).unwrap().0
}

fn earth_like_features() -> HashMap<String, f64> {
    Feature::ALL
        .iter()
        .zip(EARTH_LIKE)
        .map(|(f, v)| (f.friendly_key().to_string(), v))
        .collect()
}

fn display_frame(rows: &[[f64; N_FEATURES]], skip: Option<Feature>) -> DataFrame {
    let columns: Vec<Column> = Feature::ALL
        .iter()
        .filter(|f| Some(**f) != skip)
        .map(|f| {
            let values: Vec<f64> = rows.iter().map(|r| r[f.index()]).collect();
            Series::new(f.display_name().into(), values).into()
        })
        .collect();
    DataFrame::new(columns).unwrap()
}

#[test]
fn test_predict_one_matches_direct_inference() {
    let bundle = trained_bundle();

    let raw = Array2::from_shape_vec((1, N_FEATURES), EARTH_LIKE.to_vec()).unwrap();
    let scaled = bundle.scaler.transform(&raw).unwrap();
    let direct = bundle.model.classifier.predict_proba(&scaled).unwrap();
    let direct_class = bundle.decision_rule().predict_row(direct.row(0));
    let direct_label = bundle.encoder.decode(direct_class).unwrap().to_string();

    let predictor = Predictor::new(Arc::new(bundle));
    let prediction = predictor.predict_one(&earth_like_features(), None).unwrap();

    assert_eq!(prediction.label, direct_label);
    assert_eq!(prediction.class_index, direct_class);
    for (i, class) in predictor.class_names().iter().enumerate() {
        assert!((prediction.probabilities[class] - direct[[0, i]]).abs() < 1e-12);
    }
    assert_eq!(prediction.attributions.len(), N_FEATURES);
    assert!(!prediction.rationale.is_empty());
}

#[test]
fn test_earth_like_candidate_is_confirmed() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    let prediction = predictor.predict_one(&earth_like_features(), Some("stacking")).unwrap();
    assert_eq!(prediction.label, "CONFIRMED");
}

#[test]
fn test_predict_one_lists_missing_keys() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    let mut features = earth_like_features();
    features.remove("transit_depth");
    features.remove("stellar_radius");

    match predictor.predict_one(&features, None) {
        Err(ExoError::ValidationError(msg)) => {
            assert!(msg.contains("transit_depth"));
            assert!(msg.contains("stellar_radius"));
            assert!(!msg.contains("orbital_period"));
        }
        other => panic!("expected validation error, got {:?}", other.map(|p| p.label)),
    }
}

#[test]
fn test_canonical_keys_not_accepted_for_single_prediction() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    let features: HashMap<String, f64> = Feature::ALL
        .iter()
        .zip(EARTH_LIKE)
        .map(|(f, v)| (f.canonical_key().to_string(), v))
        .collect();
    assert!(matches!(predictor.predict_one(&features, None), Err(ExoError::ValidationError(_))));
}

#[test]
fn test_base_learner_selection() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    for id in ["rf", "et", "gb", "svm", "nb"] {
        let prediction = predictor.predict_one(&earth_like_features(), Some(id)).unwrap();
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-6, "{} probabilities sum to {}", id, total);
    }
    assert!(predictor.predict_one(&earth_like_features(), Some("knn")).is_err());
}

#[test]
fn test_predict_batch_appends_columns() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    let df = display_frame(&[EARTH_LIKE, [3.0, 2.0, 14.0, 20000.0, 6500.0, 1.6, 4.0]], None);

    let out = predictor.predict_batch(df).unwrap();
    assert_eq!(out.height(), 2);
    assert_eq!(out.width(), N_FEATURES + 2);

    let labels = out.column(PREDICTED_LABEL_COLUMN).unwrap().as_materialized_series().str().unwrap().clone();
    assert_eq!(labels.get(0), Some("CONFIRMED"));
    assert_eq!(labels.get(1), Some("FALSE POSITIVE"));

    let confidence = out.column(CONFIDENCE_COLUMN).unwrap().as_materialized_series().f64().unwrap().clone();
    for c in confidence.into_iter().flatten() {
        assert!((0.5..=1.0).contains(&c));
    }
}

#[test]
fn test_predict_batch_names_exactly_the_missing_header() {
    let predictor = Predictor::new(Arc::new(trained_bundle()));
    let df = display_frame(&[EARTH_LIKE], Some(Feature::TransitDepth));

    match predictor.predict_batch(df) {
        Err(ExoError::MissingColumns(missing)) => assert_eq!(missing, vec!["Transit Depth".to_string()]),
        other => panic!("expected missing columns, got {:?}", other.map(|df| df.width())),
    }
}

#[test]
fn test_artifact_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::new(dir.path());
    let bundle = trained_bundle();
    bundle.save(&paths).unwrap();
    assert!(paths.missing().is_empty());

    let loaded = ArtifactBundle::load(&paths).unwrap();
    assert_eq!(loaded.encoder.classes(), bundle.encoder.classes());
    assert!((loaded.threshold - bundle.threshold).abs() < 1e-12);

    let before = Predictor::new(Arc::new(bundle)).predict_one(&earth_like_features(), None).unwrap();
    let after = Predictor::new(Arc::new(loaded)).predict_one(&earth_like_features(), None).unwrap();
    assert_eq!(before.label, after.label);
    for (class, p) in &before.probabilities {
        assert!((after.probabilities[class] - p).abs() < 1e-9);
    }
}

#[test]
fn test_missing_artifact_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::new(dir.path());
    trained_bundle().save(&paths).unwrap();
    std::fs::remove_file(paths.threshold()).unwrap();

    assert!(matches!(ArtifactBundle::load(&paths), Err(ExoError::ArtifactMissing(_))));
}

#[test]
fn test_run_writes_artifacts_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("koi.csv");
    let mut df = koi_frame(80);
    exoai::utils::DataSaver::save_csv(&mut df, &csv).unwrap();

    let out_dir = dir.path().join("models");
    let config = TrainingConfig::new(TrainingMode::Lightweight)
        .with_params(small_params())
        .with_output_dir(&out_dir);
    let report = TrainEngine::new(config).run(&csv).unwrap();

    assert_eq!(report.n_rows_labelled, 80);
    assert!(ArtifactPaths::new(&out_dir).missing().is_empty());
}
