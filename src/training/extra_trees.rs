//! Extra Trees (Extremely Randomized Trees) implementation
//!
//! Unlike Random Forest which searches for the best split among a random subset
//! of features, Extra Trees picks both the feature AND the threshold at random.
//! This further reduces variance at a small cost to bias, and is faster to train.

use super::models::{check_xy, infer_n_classes, Classifier};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// An extremely randomized tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ExtraTreeNode {
    Leaf { distribution: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: Box<ExtraTreeNode>,
        right: Box<ExtraTreeNode>,
    },
}

impl ExtraTreeNode {
    fn distribution(&self, sample: ArrayView1<f64>) -> &[f64] {
        match self {
            ExtraTreeNode::Leaf { distribution } => distribution,
            ExtraTreeNode::Split { feature, threshold, left, right, .. } => {
                if sample[*feature] <= *threshold {
                    left.distribution(sample)
                } else {
                    right.distribution(sample)
                }
            }
        }
    }
}

/// Growth limits shared by every tree in the ensemble
#[derive(Clone, Copy)]
struct GrowParams {
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    n_classes: usize,
}

/// Extra Trees classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTrees {
    trees: Vec<ExtraTreeNode>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features to consider per split
    pub max_features: Option<usize>,
    pub random_state: Option<u64>,
    n_features: usize,
    n_classes: usize,
    pub is_fitted: bool,
}

impl Default for ExtraTrees {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl ExtraTrees {
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            n_classes: 0,
            is_fitted: false,
        }
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_max_features(mut self, mf: usize) -> Self {
        self.max_features = Some(mf);
        self
    }

    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            Some(mf) => mf.min(n_features).max(1),
            // sqrt(n_features) for classification
            None => ((n_features as f64).sqrt().ceil() as usize).max(1),
        }
    }

    /// Build a single extra tree with random splits
    fn build_tree(
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        params: GrowParams,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> ExtraTreeNode {
        let n = indices.len();

        if n < params.min_samples_split
            || n <= 1
            || params.max_depth.map_or(false, |d| depth >= d)
        {
            return Self::leaf(y, indices, params.n_classes);
        }

        let first_y = y[indices[0]];
        if indices.iter().all(|&i| (y[i] - first_y).abs() < 1e-15) {
            return Self::leaf(y, indices, params.n_classes);
        }

        let n_features = x.ncols();
        let feature_indices = Self::random_features(n_features, params.max_features, rng);
        let parent_gini = Self::gini_impurity(y, indices, params.n_classes);

        let mut best: Option<(usize, f64, f64)> = None;

        for &f in &feature_indices {
            let mut fmin = f64::MAX;
            let mut fmax = f64::MIN;
            for &i in indices {
                let v = x[[i, f]];
                fmin = fmin.min(v);
                fmax = fmax.max(v);
            }

            if (fmax - fmin).abs() < 1e-15 {
                continue;
            }

            // Uniform random threshold between min and max
            let threshold = rng.gen_range(fmin..fmax);

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, f]] <= threshold);

            if left_idx.len() < params.min_samples_leaf || right_idx.len() < params.min_samples_leaf {
                continue;
            }

            let score = Self::gini_split(y, &left_idx, &right_idx, params.n_classes);
            if best.map_or(true, |b| score < b.2) {
                best = Some((f, threshold, score));
            }
        }

        let Some((feature, threshold, score)) = best else {
            return Self::leaf(y, indices, params.n_classes);
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        let left = Self::build_tree(x, y, &left_idx, params, depth + 1, rng);
        let right = Self::build_tree(x, y, &right_idx, params, depth + 1, rng);

        ExtraTreeNode::Split {
            feature,
            threshold,
            gain: n as f64 * (parent_gini - score).max(0.0),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn random_features(n_features: usize, max_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        if max_features >= n_features {
            return (0..n_features).collect();
        }
        let mut features: Vec<usize> = (0..n_features).collect();
        // Fisher-Yates partial shuffle
        for i in 0..max_features {
            let j = rng.gen_range(i..n_features);
            features.swap(i, j);
        }
        features.truncate(max_features);
        features
    }

    fn class_counts(y: &Array1<f64>, indices: &[usize], n_classes: usize) -> Vec<f64> {
        let mut counts = vec![0.0; n_classes];
        for &i in indices {
            if let Some(c) = counts.get_mut(y[i] as usize) {
                *c += 1.0;
            }
        }
        counts
    }

    fn leaf(y: &Array1<f64>, indices: &[usize], n_classes: usize) -> ExtraTreeNode {
        let mut distribution = Self::class_counts(y, indices, n_classes);
        let total = indices.len().max(1) as f64;
        distribution.iter_mut().for_each(|c| *c /= total);
        ExtraTreeNode::Leaf { distribution }
    }

    fn gini_split(y: &Array1<f64>, left: &[usize], right: &[usize], n_classes: usize) -> f64 {
        let n = (left.len() + right.len()) as f64;
        let lg = Self::gini_impurity(y, left, n_classes);
        let rg = Self::gini_impurity(y, right, n_classes);
        (left.len() as f64 * lg + right.len() as f64 * rg) / n
    }

    fn gini_impurity(y: &Array1<f64>, indices: &[usize], n_classes: usize) -> f64 {
        let n = indices.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let counts = Self::class_counts(y, indices, n_classes);
        1.0 - counts.iter().map(|&c| (c / n).powi(2)).sum::<f64>()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let n_samples = x.nrows();

        self.n_features = x.ncols();
        self.n_classes = infer_n_classes(y, self.n_classes);
        let params = GrowParams {
            max_features: self.compute_max_features(self.n_features),
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            n_classes: self.n_classes,
        };
        let all_indices: Vec<usize> = (0..n_samples).collect();
        let base_seed = self.random_state.unwrap_or(42);

        // No bootstrap: each tree sees the full dataset
        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                Self::build_tree(x, y, &all_indices, params, 0, &mut rng)
            })
            .collect();

        self.is_fitted = true;
        Ok(self)
    }

    /// Mean of the per-tree leaf class distributions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted || self.trees.is_empty() {
            return Err(ExoError::ModelNotFitted);
        }

        let n_trees = self.trees.len() as f64;
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));

        for (i, sample) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (j, &p) in tree.distribution(sample).iter().enumerate() {
                    proba[[i, j]] += p;
                }
            }
        }
        proba /= n_trees;
        Ok(proba)
    }

    /// Impurity-decrease importances summed over all trees
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if !self.is_fitted || self.n_features == 0 {
            return None;
        }
        let mut totals = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            Self::accumulate_gain(tree, &mut totals);
        }
        let total: f64 = totals.iter().sum();
        if total > 0.0 {
            for c in totals.iter_mut() {
                *c /= total;
            }
        }
        Some(Array1::from_vec(totals))
    }

    fn accumulate_gain(node: &ExtraTreeNode, totals: &mut [f64]) {
        if let ExtraTreeNode::Split { feature, gain, left, right, .. } = node {
            if let Some(t) = totals.get_mut(*feature) {
                *t += gain;
            }
            Self::accumulate_gain(left, totals);
            Self::accumulate_gain(right, totals);
        }
    }
}

impl Classifier for ExtraTrees {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        ExtraTrees::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        ExtraTrees::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        ExtraTrees::feature_importances(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_extra_trees_classifier() {
        let x = array![
            [0.0, 0.0], [0.1, 0.2], [0.2, 0.1],
            [1.0, 1.0], [1.1, 0.9], [0.9, 1.1],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut et = ExtraTrees::new_classifier(20).with_random_state(42);
        et.fit(&x, &y).unwrap();
        let preds = Classifier::predict(&et, &x).unwrap();
        assert_eq!(preds.to_vec(), y.to_vec());
    }

    #[test]
    fn test_extra_trees_predict_proba() {
        let x = array![[0.0], [0.5], [1.0], [5.0], [5.5], [6.0], [10.0], [10.5]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0];

        let mut et = ExtraTrees::new_classifier(10).with_random_state(3);
        et.fit(&x, &y).unwrap();
        let proba = et.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_importances_ignore_constant_feature() {
        let x = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut et = ExtraTrees::new_classifier(10).with_random_state(0).with_max_features(2);
        et.fit(&x, &y).unwrap();
        let imp = et.feature_importances().unwrap();
        assert_eq!(imp[1], 0.0);
        assert!((imp[0] - 1.0).abs() < 1e-10);
    }
}
