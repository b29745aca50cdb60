//! Decision tree implementation

use super::models::{check_xy, infer_n_classes};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value and, for classifiers, the class distribution
    Leaf {
        value: f64,
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn leaf(&self, sample: ArrayView1<f64>) -> &TreeNode {
        match self {
            TreeNode::Leaf { .. } => self,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    left.leaf(sample)
                } else {
                    right.leaf(sample)
                }
            }
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Number of randomly drawn features considered per split
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for feature sub-sampling
    pub random_state: Option<u64>,
    /// Number of features
    n_features: usize,
    /// Number of classes (classification)
    n_classes: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Is classification task
    is_classification: bool,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

/// Running sufficient statistics for one side of a split
#[derive(Clone)]
struct SplitStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<f64>,
}

impl SplitStats {
    fn new(n_classes: usize) -> Self {
        Self { count: 0, sum: 0.0, sq_sum: 0.0, class_counts: vec![0.0; n_classes] }
    }

    fn add(&mut self, yi: f64, sign: f64) {
        if sign > 0.0 {
            self.count += 1;
        } else {
            self.count -= 1;
        }
        self.sum += sign * yi;
        self.sq_sum += sign * yi * yi;
        if let Some(c) = self.class_counts.get_mut(yi as usize) {
            *c += sign;
        }
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            n_classes: 0,
            feature_importances: None,
            is_classification: true,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set number of features drawn per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Declare the number of classes so leaves carry full-width distributions
    pub fn with_n_classes(mut self, n_classes: usize) -> Self {
        self.n_classes = n_classes;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        self.n_features = n_features;
        if self.is_classification {
            self.n_classes = infer_n_classes(y, self.n_classes);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, &mut rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || self.is_pure(y, indices);

        if should_stop {
            return self.make_leaf(y, indices);
        }

        let features = self.draw_features(rng);
        match self.find_best_split(x, y, indices, &features) {
            Some((feature, threshold, gain)) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature]] <= threshold);
                if left_indices.is_empty() || right_indices.is_empty() {
                    return self.make_leaf(y, indices);
                }

                importances[feature] += n_samples as f64 * gain;

                let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
                let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

                TreeNode::Split {
                    feature_idx: feature,
                    threshold,
                    left,
                    right,
                    n_samples,
                    impurity: gain,
                }
            }
            None => self.make_leaf(y, indices),
        }
    }

    /// Random feature subset (partial Fisher-Yates); all features when unset
    fn draw_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let n = self.n_features;
        let k = self.max_features.unwrap_or(n).clamp(1, n.max(1));
        let mut features: Vec<usize> = (0..n).collect();
        if k < n {
            for i in 0..k {
                let j = rng.gen_range(i..n);
                features.swap(i, j);
            }
            features.truncate(k);
        }
        features
    }

    /// Best (feature, threshold, gain) over the candidate features.
    ///
    /// Each feature is scanned once in sorted order with running statistics.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let n_classes = if self.is_classification { self.n_classes } else { 0 };
        let mut parent = SplitStats::new(n_classes);
        for &i in indices {
            parent.add(y[i], 1.0);
        }
        let parent_impurity = self.impurity(&parent);
        let n = indices.len() as f64;

        let feature_results: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

                let mut left = SplitStats::new(n_classes);
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for k in 0..order.len().saturating_sub(1) {
                    let yi = y[order[k]];
                    left.add(yi, 1.0);
                    right.add(yi, -1.0);

                    let (v, v_next) = (x[[order[k], feature]], x[[order[k + 1], feature]]);
                    if v_next <= v {
                        continue;
                    }
                    if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * self.impurity(&left)
                        + right.count as f64 * self.impurity(&right))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > best.map_or(1e-12, |b| b.1) {
                        let mid = (v + v_next) / 2.0;
                        best = Some((if mid < v_next { mid } else { v }, gain));
                    }
                }

                best.map(|(threshold, gain)| (feature, threshold, gain))
            })
            .collect();

        // Ties resolve to the earliest drawn feature
        feature_results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
    }

    fn impurity(&self, stats: &SplitStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        let n = stats.count as f64;
        match self.criterion {
            Criterion::Gini => {
                1.0 - stats.class_counts.iter().map(|&c| (c / n).powi(2)).sum::<f64>()
            }
            Criterion::Entropy => -stats
                .class_counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| {
                    let p = c / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    fn is_pure(&self, y: &Array1<f64>, indices: &[usize]) -> bool {
        match indices.first() {
            None => true,
            Some(&first) => indices.iter().all(|&i| (y[i] - y[first]).abs() < 1e-10),
        }
    }

    fn make_leaf(&self, y: &Array1<f64>, indices: &[usize]) -> TreeNode {
        let n_samples = indices.len();
        if self.is_classification {
            let mut distribution = vec![0.0; self.n_classes];
            for &i in indices {
                if let Some(c) = distribution.get_mut(y[i] as usize) {
                    *c += 1.0;
                }
            }
            let total = n_samples.max(1) as f64;
            distribution.iter_mut().for_each(|c| *c /= total);
            let value = distribution
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0 as f64;
            TreeNode::Leaf { value, distribution, n_samples }
        } else {
            let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples.max(1) as f64;
            TreeNode::Leaf { value, distribution: Vec::new(), n_samples }
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ExoError::ModelNotFitted)?;

        Ok(x.rows()
            .into_iter()
            .map(|row| match root.leaf(row) {
                TreeNode::Leaf { value, .. } => *value,
                TreeNode::Split { .. } => 0.0,
            })
            .collect())
    }

    /// Leaf class distribution for each sample
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(ExoError::ModelNotFitted)?;
        if !self.is_classification {
            return Err(ExoError::ValidationError(
                "predict_proba is only available for classification".to_string(),
            ));
        }

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            if let TreeNode::Leaf { distribution, .. } = root.leaf(row) {
                for (j, &p) in distribution.iter().enumerate() {
                    proba[[i, j]] = p;
                }
            }
        }
        Ok(proba)
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }
}
