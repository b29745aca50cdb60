//! Artifact persistence
//!
//! A trained run produces four JSON files in the models directory. All four
//! are written together and must all be present to load a bundle.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::ensemble::StackingClassifier;
use crate::error::{ExoError, Result};
use crate::evaluation::DecisionRule;
use crate::preprocessing::{LabelEncoder, StandardScaler};
use crate::training::TrainingMode;

pub const MODEL_FILE: &str = "exoai_stacking_model.json";
pub const SCALER_FILE: &str = "exoai_scaler.json";
pub const ENCODER_FILE: &str = "exoai_label_encoder.json";
pub const THRESHOLD_FILE: &str = "exoai_threshold.json";

/// The fitted ensemble plus training provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedEnsemble {
    pub classifier: StackingClassifier,
    /// Canonical feature keys in matrix column order
    pub feature_names: Vec<String>,
    pub mode: TrainingMode,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ThresholdFile {
    threshold: f64,
}

/// File locations of one artifact set
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::new(std::env::var("MODELS_DIR").unwrap_or_else(|_| "models".to_string()))
    }
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn model(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn scaler(&self) -> PathBuf {
        self.dir.join(SCALER_FILE)
    }

    pub fn encoder(&self) -> PathBuf {
        self.dir.join(ENCODER_FILE)
    }

    pub fn threshold(&self) -> PathBuf {
        self.dir.join(THRESHOLD_FILE)
    }

    /// Paths that do not exist on disk
    pub fn missing(&self) -> Vec<PathBuf> {
        [self.model(), self.scaler(), self.encoder(), self.threshold()]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Immutable set of fitted artifacts shared by inference
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub model: TrainedEnsemble,
    pub scaler: StandardScaler,
    pub encoder: LabelEncoder,
    /// Binary cutoff on the class-1 probability
    pub threshold: f64,
}

impl ArtifactBundle {
    /// Assemble a bundle, checking the parts agree with each other
    pub fn new(model: TrainedEnsemble, scaler: StandardScaler, encoder: LabelEncoder, threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ExoError::InvalidParameter {
                name: "threshold".to_string(),
                value: threshold.to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }
        if !scaler.is_fitted() || !model.classifier.is_fitted() {
            return Err(ExoError::ModelNotFitted);
        }
        if model.classifier.n_classes() != encoder.n_classes() {
            return Err(ExoError::ShapeError {
                expected: format!("{} classes", encoder.n_classes()),
                actual: format!("{} classes", model.classifier.n_classes()),
            });
        }
        Ok(Self { model, scaler, encoder, threshold })
    }

    /// Threshold for binary runs, argmax otherwise
    pub fn decision_rule(&self) -> DecisionRule {
        DecisionRule::for_classes(self.encoder.n_classes(), self.threshold)
    }

    /// Write all four artifact files, creating the directory if needed
    pub fn save(&self, paths: &ArtifactPaths) -> Result<()> {
        fs::create_dir_all(&paths.dir)?;
        write_json(&paths.model(), &self.model)?;
        write_json(&paths.scaler(), &self.scaler)?;
        write_json(&paths.encoder(), &self.encoder)?;
        write_json(&paths.threshold(), &ThresholdFile { threshold: self.threshold })?;
        info!(dir = %paths.dir.display(), "Artifacts saved");
        Ok(())
    }

    /// Load all four artifact files; any absent file is an error
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        if let Some(missing) = paths.missing().first() {
            return Err(ExoError::ArtifactMissing(missing.display().to_string()));
        }

        let model: TrainedEnsemble = read_json(&paths.model())?;
        let scaler: StandardScaler = read_json(&paths.scaler())?;
        let encoder: LabelEncoder = read_json(&paths.encoder())?;
        let threshold: ThresholdFile = read_json(&paths.threshold())?;

        let bundle = Self::new(model, scaler, encoder, threshold.threshold)?;
        info!(
            dir = %paths.dir.display(),
            classes = bundle.encoder.n_classes(),
            threshold = bundle.threshold,
            "Artifacts loaded"
        );
        Ok(bundle)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), value)
        .map_err(|e| ExoError::SerializationError(format!("Failed to write {}: {}", path.display(), e)))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ExoError::SerializationError(format!("Failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifacts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        assert_eq!(paths.missing().len(), 4);

        match ArtifactBundle::load(&paths) {
            Err(ExoError::ArtifactMissing(path)) => assert!(path.ends_with(MODEL_FILE)),
            other => panic!("expected ArtifactMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_file_names() {
        let paths = ArtifactPaths::new("models");
        assert_eq!(paths.threshold(), PathBuf::from("models").join("exoai_threshold.json"));
        assert_eq!(paths.encoder(), PathBuf::from("models").join("exoai_label_encoder.json"));
    }
}
