//! Cross-validation and stratified splitting

use crate::error::{ExoError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold_split(n_samples, *n_splits, *shuffle),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    ExoError::ValidationError("StratifiedKFold requires target array".to_string())
                })?;
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        check_n_splits(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for (i, idx) in indices.into_iter().enumerate() {
            folds[i % n_splits].push(idx);
        }
        Ok(folds_to_splits(folds))
    }

    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        check_n_splits(y.len(), n_splits)?;

        let mut by_class = group_by_class(y);
        if shuffle {
            let mut rng = self.rng();
            for indices in by_class.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal each class round-robin, continuing where the previous class
        // stopped so fold sizes stay within one of each other
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut cursor = 0;
        for indices in by_class.values() {
            for &idx in indices {
                folds[cursor % n_splits].push(idx);
                cursor += 1;
            }
        }
        Ok(folds_to_splits(folds))
    }
}

fn check_n_splits(n_samples: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(ExoError::ValidationError("n_splits must be at least 2".to_string()));
    }
    if n_samples < n_splits {
        return Err(ExoError::ValidationError(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }
    Ok(())
}

fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| {
            let mut test_indices = folds[fold_idx].clone();
            test_indices.sort_unstable();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();
            CVSplit { train_indices, test_indices, fold_idx }
        })
        .collect()
}

/// Sample indices grouped by class, classes in ascending order
fn group_by_class(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &val) in y.iter().enumerate() {
        by_class.entry(val.round() as i64).or_default().push(idx);
    }
    by_class
}

/// Indices of a stratified train / validation / test partition
#[derive(Debug, Clone)]
pub struct TrainValTestSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified three-way split.
///
/// Each class is shuffled with `seed` and cut at the requested fractions, so
/// every partition keeps the class proportions of `y`.
pub fn stratified_train_val_test_split(
    y: &Array1<f64>,
    val_fraction: f64,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainValTestSplit> {
    if val_fraction < 0.0 || test_fraction < 0.0 || val_fraction + test_fraction >= 1.0 {
        return Err(ExoError::InvalidParameter {
            name: "split fractions".to_string(),
            value: format!("{} / {}", val_fraction, test_fraction),
            reason: "validation and test fractions must be non-negative and sum below 1".to_string(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut split = TrainValTestSplit { train: Vec::new(), validation: Vec::new(), test: Vec::new() };

    for (_, mut indices) in group_by_class(y) {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = (n as f64 * test_fraction).round() as usize;
        let n_val = ((n as f64 * val_fraction).round() as usize).min(n - n_test);
        split.test.extend_from_slice(&indices[..n_test]);
        split.validation.extend_from_slice(&indices[n_test..n_test + n_val]);
        split.train.extend_from_slice(&indices[n_test + n_val..]);
    }

    split.train.sort_unstable();
    split.validation.sort_unstable();
    split.test.sort_unstable();

    if split.train.is_empty() {
        return Err(ExoError::DataError("Training partition is empty".to_string()));
    }
    Ok(split)
}

/// Stratified subsample of at most `max_samples` indices (sorted)
pub fn stratified_subsample(y: &Array1<f64>, max_samples: usize, seed: u64) -> Vec<usize> {
    let n = y.len();
    if max_samples >= n {
        return (0..n).collect();
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ratio = max_samples as f64 / n as f64;
    let mut kept = Vec::with_capacity(max_samples);
    for (_, mut indices) in group_by_class(y) {
        indices.shuffle(&mut rng);
        let take = ((indices.len() as f64 * ratio).round() as usize).clamp(1, indices.len());
        kept.extend_from_slice(&indices[..take]);
    }
    kept.sort_unstable();
    kept.truncate(max_samples.max(1));
    kept
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds.max(1) as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds.max(1) as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(ones, 1);
        }
    }

    #[test]
    fn test_stratified_fold_sizes_balanced() {
        let y = Array1::from_vec(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true })
            .with_random_state(42);
        let splits = cv.split(7, Some(&y)).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert!(sizes.iter().max().unwrap() - sizes.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_stratified_requires_targets() {
        let cv = CrossValidator::new(CVStrategy::default());
        assert!(cv.split(10, None).is_err());
    }

    #[test]
    fn test_train_val_test_split() {
        let y: Array1<f64> = (0..100).map(|i| if i < 60 { 0.0 } else { 1.0 }).collect();
        let split = stratified_train_val_test_split(&y, 0.15, 0.15, 42).unwrap();

        assert_eq!(split.train.len() + split.validation.len() + split.test.len(), 100);
        assert_eq!(split.test.len(), 15);
        assert_eq!(split.validation.len(), 15);
        let test_pos = split.test.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(test_pos, 6);

        let again = stratified_train_val_test_split(&y, 0.15, 0.15, 42).unwrap();
        assert_eq!(split.test, again.test);
    }

    #[test]
    fn test_stratified_subsample() {
        let y: Array1<f64> = (0..100).map(|i| if i < 80 { 0.0 } else { 1.0 }).collect();
        let kept = stratified_subsample(&y, 50, 1);
        assert_eq!(kept.len(), 50);
        let pos = kept.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(pos, 10);
        assert_eq!(stratified_subsample(&y, 500, 1).len(), 100);
    }

    #[test]
    fn test_cv_results() {
        let r = CVResults::from_scores(vec![0.8, 0.9, 1.0]);
        assert!((r.mean_score - 0.9).abs() < 1e-12);
        assert_eq!(r.n_folds, 3);
    }
}
