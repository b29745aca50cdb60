//! Prediction service over the fitted artifact bundle

use crate::ensemble::LearnerKind;
use crate::error::{ExoError, Result};
use crate::evaluation::{evaluate, ClassificationReport, DecisionRule};
use crate::explainability::{FeatureContribution, OcclusionExplainer};
use crate::export::ArtifactBundle;
use crate::preprocessing::{extract_raw, FeaturePreparer, PreparedMatrix};
use crate::schema::{label_values, Feature, SchemaNormalizer, N_FEATURES};
use crate::training::models::argmax;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Column appended by batch prediction holding the decoded label
pub const PREDICTED_LABEL_COLUMN: &str = "predicted_label";
/// Column appended by batch prediction holding the top class probability
pub const CONFIDENCE_COLUMN: &str = "confidence";

/// Which fitted model answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSelector {
    Stacking,
    Base(LearnerKind),
}

impl ModelSelector {
    pub const STACKING_ID: &'static str = "stacking";

    /// Resolve an optional model id; absent means the stacking ensemble
    pub fn parse(model_id: Option<&str>) -> Result<Self> {
        match model_id.map(str::trim) {
            None | Some("") => Ok(ModelSelector::Stacking),
            Some(Self::STACKING_ID) => Ok(ModelSelector::Stacking),
            Some(id) => LearnerKind::from_id(id)
                .map(ModelSelector::Base)
                .ok_or_else(|| ExoError::ValidationError(format!("Unknown model id '{}'", id))),
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ModelSelector::Stacking => Self::STACKING_ID,
            ModelSelector::Base(kind) => kind.id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSelector::Stacking => "Stacking Ensemble",
            ModelSelector::Base(kind) => kind.display_name(),
        }
    }

    /// The ensemble first, then each base learner
    pub fn all() -> Vec<ModelSelector> {
        std::iter::once(ModelSelector::Stacking)
            .chain(LearnerKind::ALL.into_iter().map(ModelSelector::Base))
            .collect()
    }
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    /// Probability per class name
    pub probabilities: BTreeMap<String, f64>,
    pub attributions: Vec<FeatureContribution>,
    pub rationale: String,
}

/// Thin, immutable service around a shared artifact bundle
#[derive(Debug, Clone)]
pub struct Predictor {
    bundle: Arc<ArtifactBundle>,
}

impl Predictor {
    pub fn new(bundle: Arc<ArtifactBundle>) -> Self {
        Self { bundle }
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    pub fn class_names(&self) -> &[String] {
        self.bundle.encoder.classes()
    }

    pub fn decision_rule(&self) -> DecisionRule {
        self.bundle.decision_rule()
    }

    fn proba_scaled(&self, x: &Array2<f64>, model: ModelSelector) -> Result<Array2<f64>> {
        let classifier = &self.bundle.model.classifier;
        match model {
            ModelSelector::Stacking => classifier.predict_proba(x),
            ModelSelector::Base(kind) => classifier.base_predict_proba(kind, x),
        }
    }

    /// Class probabilities for a prepared matrix
    pub fn predict_proba(&self, x: &PreparedMatrix, model: ModelSelector) -> Result<Array2<f64>> {
        self.proba_scaled(x.as_array(), model)
    }

    /// Decoded label and top probability for every row
    pub fn label_rows(&self, x: &PreparedMatrix, model: ModelSelector) -> Result<(Vec<String>, Vec<f64>)> {
        let proba = self.predict_proba(x, model)?;
        let rule = self.decision_rule();
        let mut labels = Vec::with_capacity(proba.nrows());
        let mut confidence = Vec::with_capacity(proba.nrows());
        for row in proba.axis_iter(Axis(0)) {
            labels.push(self.bundle.encoder.decode(rule.predict_row(row))?.to_string());
            confidence.push(row[argmax(row)]);
        }
        Ok((labels, confidence))
    }

    /// Classify one candidate given by friendly feature keys
    pub fn predict_one(&self, features: &HashMap<String, f64>, model_id: Option<&str>) -> Result<Prediction> {
        let model = ModelSelector::parse(model_id)?;

        let missing: Vec<&str> = Feature::ALL
            .iter()
            .map(|f| f.friendly_key())
            .filter(|k| !features.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(ExoError::ValidationError(format!(
                "Missing required features: {}",
                missing.join(", ")
            )));
        }

        let raw_values: Vec<f64> = Feature::ALL.iter().map(|f| features[f.friendly_key()]).collect();
        let raw = Array2::from_shape_vec((1, N_FEATURES), raw_values.clone())?;
        let prepared = FeaturePreparer::new(&self.bundle.scaler).prepare_raw(raw)?;

        let proba = self.predict_proba(&prepared, model)?;
        let row = proba.row(0);
        let class_index = self.decision_rule().predict_row(row);
        let label = self.bundle.encoder.decode(class_index)?.to_string();
        let probabilities = self
            .class_names()
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();

        let names = Feature::ALL.iter().map(|f| f.display_name().to_string()).collect();
        let explainer = OcclusionExplainer::new(|x: &Array2<f64>| self.proba_scaled(x, model), names);
        let explanation = explainer.explain(prepared.view().row(0), &raw_values, class_index)?;
        let rationale = explanation.rationale(&label);

        debug!(model = model.id(), label = %label, "Single prediction");
        Ok(Prediction {
            label,
            class_index,
            probabilities,
            attributions: explanation.contributions,
            rationale,
        })
    }

    /// Classify every row of an uploaded CSV.
    ///
    /// Headers must match the canonical display names exactly; the returned
    /// frame is the input plus a label and a confidence column.
    pub fn predict_batch(&self, df: DataFrame) -> Result<DataFrame> {
        let missing: Vec<String> = Feature::ALL
            .iter()
            .map(|f| f.display_name())
            .filter(|name| df.column(name).is_err())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ExoError::MissingColumns(missing));
        }

        let display: Vec<&str> = Feature::ALL.iter().map(|f| f.display_name()).collect();
        let features = SchemaNormalizer::new().apply_friendly_names(df.select(display)?)?;
        let prepared = FeaturePreparer::new(&self.bundle.scaler).prepare_frame(&features)?;
        let (labels, confidence) = self.label_rows(&prepared, ModelSelector::Stacking)?;

        let mut out = df;
        out.with_column(Series::new(PREDICTED_LABEL_COLUMN.into(), labels))?;
        out.with_column(Series::new(CONFIDENCE_COLUMN.into(), confidence))?;
        debug!(rows = out.height(), "Batch prediction");
        Ok(out)
    }

    /// Labels for a frame that already carries canonical columns
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<String>> {
        let prepared = FeaturePreparer::new(&self.bundle.scaler).prepare_frame(df)?;
        Ok(self.label_rows(&prepared, ModelSelector::Stacking)?.0)
    }

    /// Score every model against a labelled frame.
    ///
    /// Headers go through full schema normalization. Rows whose label is
    /// missing or unknown to the encoder are skipped.
    pub fn evaluate_frame(&self, df: DataFrame) -> Result<Vec<(ModelSelector, ClassificationReport)>> {
        let normalizer = SchemaNormalizer::new();
        let df = normalizer.normalize(df)?;
        let label_column = normalizer
            .resolve_label_column(&df)
            .ok_or_else(|| ExoError::DataError("Evaluation data has no disposition column".to_string()))?;

        let encoder = &self.bundle.encoder;
        let (keep, targets): (Vec<usize>, Vec<f64>) = label_values(&df, &label_column)?
            .into_iter()
            .enumerate()
            .filter_map(|(i, label)| {
                let class = encoder.encode(label.as_deref()?).ok()?;
                Some((i, class as f64))
            })
            .unzip();
        if keep.is_empty() {
            return Err(ExoError::DataError("Evaluation data has no usable labels".to_string()));
        }

        let raw = extract_raw(&df)?.select(Axis(0), &keep);
        let prepared = FeaturePreparer::new(&self.bundle.scaler).prepare_raw(raw)?;
        let y = Array1::from_vec(targets);
        let rule = self.decision_rule();

        ModelSelector::all()
            .into_iter()
            .map(|model| {
                let proba = self.predict_proba(&prepared, model)?;
                Ok((model, evaluate(&y, &proba, rule, self.class_names())?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_selector_parse() {
        assert_eq!(ModelSelector::parse(None).unwrap(), ModelSelector::Stacking);
        assert_eq!(ModelSelector::parse(Some("stacking")).unwrap(), ModelSelector::Stacking);
        assert_eq!(
            ModelSelector::parse(Some("svm")).unwrap(),
            ModelSelector::Base(LearnerKind::Svm)
        );
        assert!(matches!(
            ModelSelector::parse(Some("xgboost")),
            Err(ExoError::ValidationError(_))
        ));
    }

    #[test]
    fn test_all_models_listed() {
        let ids: Vec<&str> = ModelSelector::all().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["stacking", "rf", "et", "gb", "svm", "nb"]);
    }
}
