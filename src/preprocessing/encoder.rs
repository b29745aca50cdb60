//! Label encoding for disposition classes

use crate::error::{ExoError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Bijection between sorted class names and dense indices `0..n_classes`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build directly from a class list (sorted and deduplicated)
    pub fn from_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut encoder = Self::new();
        encoder.fit(classes);
        encoder
    }

    /// Learn the class vocabulary. Order is lexicographic so indices are
    /// stable across runs.
    pub fn fit<I, S>(&mut self, labels: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        self.classes = classes;
        self
    }

    /// Index of a single label
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| ExoError::ValidationError(format!("Unknown label '{}'", label)))
    }

    /// Encode a slice of labels as the float targets the models consume
    pub fn transform(&self, labels: &[String]) -> Result<Array1<f64>> {
        labels
            .iter()
            .map(|l| self.encode(l).map(|i| i as f64))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }

    /// Class name for an index
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ExoError::InferenceError(format!("Class index {} out of range", index)))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2
    }
}
