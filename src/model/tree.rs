//! Regression tree with per-node expected values
//!
//! The boosted ensemble is built from these trees. Every node, internal or
//! leaf, stores the mean target of the samples that reached it; the
//! attribution engine walks decision paths and reads those expectations to
//! decompose a prediction additively.

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CreditLensError, Result};

/// Regression tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with its prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with a split and the subtree expectation
    Split {
        feature_idx: usize,
        threshold: f64,
        value: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn value(&self) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { value, .. } => *value,
        }
    }
}

/// Regression tree fit by variance reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    n_features: usize,
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: 6,
            min_samples_leaf: 1,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(CreditLensError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(CreditLensError::Shape {
                expected: "at least 1 sample".to_string(),
                actual: "0 samples".to_string(),
            });
        }

        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_node(x, y, &indices, 0));
        Ok(self)
    }

    fn build_node(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples as f64;

        let should_stop = depth >= self.max_depth
            || n_samples < 2 * self.min_samples_leaf
            || self.is_constant(y, indices);

        if should_stop {
            return TreeNode::Leaf { value: mean, n_samples };
        }

        match self.find_best_split(x, y, indices) {
            Some((feature_idx, threshold)) => {
                let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);

                if left_indices.len() < self.min_samples_leaf
                    || right_indices.len() < self.min_samples_leaf
                {
                    return TreeNode::Leaf { value: mean, n_samples };
                }

                let left = Box::new(self.build_node(x, y, &left_indices, depth + 1));
                let right = Box::new(self.build_node(x, y, &right_indices, depth + 1));

                TreeNode::Split {
                    feature_idx,
                    threshold,
                    value: mean,
                    left,
                    right,
                    n_samples,
                }
            }
            None => TreeNode::Leaf { value: mean, n_samples },
        }
    }

    fn find_best_split(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len() as f64;
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let parent_var = {
            let mean = total_sum / n;
            indices.iter().map(|&i| (y[i] - mean).powi(2)).sum::<f64>() / n
        };

        // Each feature independently scans candidate thresholds in parallel
        let per_feature: Vec<Option<(usize, f64, f64)>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature_idx| {
                let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature_idx]]).collect();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                values.dedup();

                let mut best_gain = 0.0f64;
                let mut best_threshold = None;

                for window in values.windows(2) {
                    let threshold = (window[0] + window[1]) / 2.0;

                    let mut left_count = 0usize;
                    let mut left_sum = 0.0f64;
                    let mut left_sq_sum = 0.0f64;
                    let mut right_sq_sum = 0.0f64;

                    for &idx in indices {
                        let yi = y[idx];
                        if x[[idx, feature_idx]] <= threshold {
                            left_count += 1;
                            left_sum += yi;
                            left_sq_sum += yi * yi;
                        } else {
                            right_sq_sum += yi * yi;
                        }
                    }

                    let right_count = indices.len() - left_count;
                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }

                    let right_sum = total_sum - left_sum;
                    let left_var = Self::variance_fast(left_count, left_sum, left_sq_sum);
                    let right_var = Self::variance_fast(right_count, right_sum, right_sq_sum);

                    let weighted =
                        (left_count as f64 * left_var + right_count as f64 * right_var) / n;
                    let gain = parent_var - weighted;
                    if gain > best_gain {
                        best_gain = gain;
                        best_threshold = Some(threshold);
                    }
                }

                best_threshold.map(|t| (feature_idx, t, best_gain))
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, t, _)| (idx, t))
    }

    // Var = E[X²] - E[X]²
    fn variance_fast(count: usize, sum: f64, sq_sum: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        (sq_sum / n - (sum / n).powi(2)).max(0.0)
    }

    fn is_constant(&self, y: &Array1<f64>, indices: &[usize]) -> bool {
        let first = y[indices[0]];
        indices.iter().all(|&i| (y[i] - first).abs() < 1e-12)
    }

    /// Predict a single sample
    pub fn predict_one(&self, sample: &[f64]) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(CreditLensError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Expected value at the root (the tree's baseline)
    pub fn root_value(&self) -> Result<f64> {
        self.root
            .as_ref()
            .map(TreeNode::value)
            .ok_or(CreditLensError::ModelNotFitted)
    }

    /// Walk the decision path for `sample`, crediting each split's feature
    /// with the change in subtree expectation it caused.
    ///
    /// Accumulates into `contributions` (indexed by this tree's feature
    /// space) and returns the leaf value. The identity
    /// `leaf = root_value + sum(deltas)` holds exactly, which is what makes
    /// the ensemble decomposition additive.
    pub fn path_contributions(&self, sample: &[f64], contributions: &mut [f64]) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(CreditLensError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split { feature_idx, threshold, value, left, right, .. } => {
                    let child: &TreeNode =
                        if sample[*feature_idx] <= *threshold { left } else { right };
                    contributions[*feature_idx] += child.value() - value;
                    node = child;
                }
            }
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}
