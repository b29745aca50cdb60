//! Local explanations by single-feature occlusion
//!
//! Each feature's contribution is the drop in the predicted class's
//! probability when that feature alone is replaced by a baseline value. With
//! standardized inputs the default baseline of zero is the training mean.

use crate::error::{ExoError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Contributions smaller than this are not named in rationales
const NEGLIGIBLE: f64 = 1e-3;

/// Feature contribution to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature_index: usize,
    pub feature_name: String,
    /// Unscaled input value
    pub feature_value: f64,
    /// Predicted-class probability minus the occluded probability
    pub contribution: f64,
}

/// Local explanation for a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub predicted_class: usize,
    /// Probability of the predicted class
    pub probability: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl LocalExplanation {
    /// Contributions sorted by absolute value, descending
    pub fn sorted_contributions(&self) -> Vec<&FeatureContribution> {
        let mut sorted: Vec<&FeatureContribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
        sorted
    }

    pub fn top_k_contributors(&self, k: usize) -> Vec<&FeatureContribution> {
        self.sorted_contributions().into_iter().take(k).collect()
    }

    /// One-sentence summary naming the strongest supporting and opposing features
    pub fn rationale(&self, label: &str) -> String {
        let mut supporting: Vec<&FeatureContribution> =
            self.contributions.iter().filter(|c| c.contribution > NEGLIGIBLE).collect();
        supporting.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
        let opposing = self
            .contributions
            .iter()
            .filter(|c| c.contribution < -NEGLIGIBLE)
            .min_by(|a, b| a.contribution.total_cmp(&b.contribution));

        let mut text = format!("Predicted {} with {:.1}% confidence.", label, self.probability * 100.0);
        match supporting.as_slice() {
            [] => text.push_str(" No single feature moved the prediction noticeably"),
            [only] => text.push_str(&format!(" {} contributed most", only.feature_name)),
            [first, second, ..] => text.push_str(&format!(
                " {} and {} contributed most",
                first.feature_name, second.feature_name
            )),
        }
        if let Some(against) = opposing {
            text.push_str(&format!(", while {} pointed the other way", against.feature_name));
        }
        text.push('.');
        text
    }
}

/// Occlusion explainer over a probability function
pub struct OcclusionExplainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>>,
{
    predict_fn: F,
    feature_names: Vec<String>,
    baseline: Vec<f64>,
}

impl<F> OcclusionExplainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array2<f64>>,
{
    /// Explainer with a zero baseline
    pub fn new(predict_fn: F, feature_names: Vec<String>) -> Self {
        let baseline = vec![0.0; feature_names.len()];
        Self { predict_fn, feature_names, baseline }
    }

    pub fn with_baseline(mut self, baseline: Vec<f64>) -> Self {
        self.baseline = baseline;
        self
    }

    /// Explain the prediction for one model-space row.
    ///
    /// `raw_values` are the unscaled inputs reported back to callers. All
    /// occluded variants are scored in a single call to the model.
    pub fn explain(&self, row: ArrayView1<f64>, raw_values: &[f64], target_class: usize) -> Result<LocalExplanation> {
        let n_features = self.feature_names.len();
        if row.len() != n_features || raw_values.len() != n_features || self.baseline.len() != n_features {
            return Err(ExoError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", row.len()),
            });
        }

        let mut batch = Array2::zeros((n_features + 1, n_features));
        for mut r in batch.rows_mut() {
            r.assign(&row);
        }
        for j in 0..n_features {
            batch[[j + 1, j]] = self.baseline[j];
        }

        let proba = (self.predict_fn)(&batch)?;
        if target_class >= proba.ncols() {
            return Err(ExoError::InferenceError(format!("Class index {} out of range", target_class)));
        }
        let reference = proba[[0, target_class]];

        let contributions = (0..n_features)
            .map(|j| FeatureContribution {
                feature_index: j,
                feature_name: self.feature_names[j].clone(),
                feature_value: raw_values[j],
                contribution: reference - proba[[j + 1, target_class]],
            })
            .collect();

        Ok(LocalExplanation {
            predicted_class: target_class,
            probability: reference,
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Two-class model whose class-1 probability depends only on feature 0
    fn first_feature_model(x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.rows().into_iter().enumerate() {
            let p = 1.0 / (1.0 + (-row[0]).exp());
            proba[[i, 1]] = p;
            proba[[i, 0]] = 1.0 - p;
        }
        Ok(proba)
    }

    #[test]
    fn test_occlusion_isolates_relevant_feature() {
        let names = vec!["Orbital Period".to_string(), "Transit Depth".to_string()];
        let explainer = OcclusionExplainer::new(first_feature_model, names);
        let row = array![2.0, -1.0];

        let explanation = explainer.explain(row.view(), &[30.0, 500.0], 1).unwrap();
        assert!(explanation.contributions[0].contribution > 0.3);
        assert!(explanation.contributions[1].contribution.abs() < 1e-12);
        assert_eq!(explanation.top_k_contributors(1)[0].feature_index, 0);
        assert!((explanation.contributions[1].feature_value - 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_rationale_names_features() {
        let names = vec!["Orbital Period".to_string(), "Transit Depth".to_string()];
        let explainer = OcclusionExplainer::new(first_feature_model, names);
        let explanation = explainer.explain(array![2.0, 0.0].view(), &[1.0, 1.0], 1).unwrap();

        let text = explanation.rationale("CONFIRMED");
        assert!(text.starts_with("Predicted CONFIRMED with"));
        assert!(text.contains("Orbital Period contributed most"));
    }

    #[test]
    fn test_shape_mismatch() {
        let explainer = OcclusionExplainer::new(first_feature_model, vec!["a".to_string()]);
        assert!(explainer.explain(array![1.0, 2.0].view(), &[1.0, 2.0], 0).is_err());
    }
}
