//! Gradient boosted binary classifier
//!
//! Regression trees fit on log-loss residuals, accumulated in log-odds
//! space. The raw score (`decision_function`) is the approved-class margin;
//! the sigmoid of it is the approved-class probability. Keeping every
//! node's expectation in the trees lets the attribution engine decompose
//! that margin exactly.

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::RegressionTree;
use crate::error::{CreditLensError, Result};

/// Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio per tree
    pub subsample: f64,
    /// Column subsample ratio per tree
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

/// Gradient boosted classifier over the class set {0 rejected, 1 approved}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    config: BoostingConfig,
    trees: Vec<RegressionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    n_features: usize,
}

impl GradientBoostedClassifier {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            n_features: 0,
        }
    }

    /// Fit binary classification on labels in {0, 1}
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 {
            return Err(CreditLensError::Shape {
                expected: "at least 1 sample".to_string(),
                actual: "0 samples".to_string(),
            });
        }
        if n_samples != y.len() {
            return Err(CreditLensError::Shape {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.n_features = n_features;

        // Initial log odds from the class prior
        let p = y.mean().unwrap_or(0.5).clamp(1e-10, 1.0 - 1e-10);
        self.initial_log_odds = (p / (1.0 - p)).ln();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();
        self.col_indices_per_tree.clear();

        for _ in 0..self.config.n_estimators {
            // Gradient of log loss
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(yi, &lo)| yi - 1.0 / (1.0 + (-lo).exp()))
                .collect();

            let sample_indices = Self::sampled_indices(n_samples, self.config.subsample, &mut rng);
            let col_indices = Self::sampled_indices(n_features, self.config.colsample_bytree, &mut rng);

            let x_rows = x.select(ndarray::Axis(0), &sample_indices);
            let x_sub = x_rows.select(ndarray::Axis(1), &col_indices);
            let y_sub: Array1<f64> =
                Array1::from_vec(sample_indices.iter().map(|&i| residuals[i]).collect());

            let mut tree = RegressionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            // Update log odds on all rows
            for i in 0..n_samples {
                let row: Vec<f64> = col_indices.iter().map(|&c| x[[i, c]]).collect();
                log_odds[i] += self.config.learning_rate * tree.predict_one(&row)?;
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        Ok(())
    }

    fn sampled_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let sample_size = (((n as f64) * ratio).ceil() as usize).clamp(1, n);
        if sample_size == n {
            return (0..n).collect();
        }
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }

    /// Raw approved-class margin (log-odds) for one sample
    pub fn decision_function(&self, x: &ArrayView1<f64>) -> Result<f64> {
        self.check_fitted(x)?;
        let mut score = self.initial_log_odds;
        for (tree, col_indices) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let row: Vec<f64> = col_indices.iter().map(|&c| x[c]).collect();
            score += self.config.learning_rate * tree.predict_one(&row)?;
        }
        Ok(score)
    }

    /// Approved-class probability for one sample
    pub fn predict_proba_one(&self, x: &ArrayView1<f64>) -> Result<f64> {
        let score = self.decision_function(x)?;
        Ok(1.0 / (1.0 + (-score).exp()))
    }

    /// The expected raw score before any feature is observed: initial log
    /// odds plus each tree's learning-rate-weighted root expectation.
    pub fn baseline(&self) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(CreditLensError::ModelNotFitted);
        }
        let mut baseline = self.initial_log_odds;
        for tree in &self.trees {
            baseline += self.config.learning_rate * tree.root_value()?;
        }
        Ok(baseline)
    }

    /// Exact per-feature decomposition of the raw margin, via the trees'
    /// decision paths: `baseline() + sum(contributions) == decision_function`.
    pub fn path_contributions(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        self.check_fitted(x)?;
        let mut contributions = vec![0.0; self.n_features];
        for (tree, col_indices) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let row: Vec<f64> = col_indices.iter().map(|&c| x[c]).collect();
            let mut local = vec![0.0; col_indices.len()];
            tree.path_contributions(&row, &mut local)?;
            for (j, &c) in col_indices.iter().enumerate() {
                contributions[c] += self.config.learning_rate * local[j];
            }
        }
        Ok(Array1::from_vec(contributions))
    }

    fn check_fitted(&self, x: &ArrayView1<f64>) -> Result<()> {
        if self.trees.is_empty() {
            return Err(CreditLensError::ModelNotFitted);
        }
        if x.len() != self.n_features {
            return Err(CreditLensError::Shape {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.len()),
            });
        }
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training_data() -> (Array2<f64>, Array1<f64>) {
        // Approvals driven by the first feature, second is noise
        let x = Array2::from_shape_vec(
            (40, 2),
            (0..80).map(|i| (i % 17) as f64 * 0.5).collect(),
        )
        .unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] > 4.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    fn fitted() -> (GradientBoostedClassifier, Array2<f64>) {
        let (x, y) = training_data();
        let mut model = GradientBoostedClassifier::new(BoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        (model, x)
    }

    #[test]
    fn test_fit_separates_classes() {
        let (model, x) = fitted();
        let (_, y) = training_data();

        let correct = x
            .rows()
            .into_iter()
            .zip(y.iter())
            .filter(|(row, &yi)| {
                let p = model.predict_proba_one(&row.view()).unwrap();
                (p >= 0.5) == (yi >= 0.5)
            })
            .count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn test_proba_in_unit_interval() {
        let (model, x) = fitted();
        for row in x.rows() {
            let p = model.predict_proba_one(&row.view()).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_contributions_reconstruct_margin() {
        let (model, x) = fitted();
        let baseline = model.baseline().unwrap();
        for row in x.rows() {
            let contributions = model.path_contributions(&row.view()).unwrap();
            let reconstructed = baseline + contributions.sum();
            let margin = model.decision_function(&row.view()).unwrap();
            assert!(
                (reconstructed - margin).abs() < 1e-9,
                "reconstructed {} vs margin {}",
                reconstructed,
                margin
            );
        }
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let (x, y) = training_data();
        let config = BoostingConfig {
            n_estimators: 5,
            subsample: 0.8,
            colsample_bytree: 0.5,
            random_state: Some(7),
            ..Default::default()
        };

        let mut a = GradientBoostedClassifier::new(config.clone());
        let mut b = GradientBoostedClassifier::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let row = x.row(3);
        assert_eq!(
            a.decision_function(&row.view()).unwrap(),
            b.decision_function(&row.view()).unwrap()
        );
    }

    #[test]
    fn test_fit_empty_dataset_errors() {
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array1::<f64>::zeros(0);
        let mut model = GradientBoostedClassifier::new(BoostingConfig::default());
        assert!(matches!(
            model.fit(&x, &y).unwrap_err(),
            CreditLensError::Shape { .. }
        ));
    }

    #[test]
    fn test_unfitted_model_errors() {
        let model = GradientBoostedClassifier::new(BoostingConfig::default());
        let x = Array1::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            model.decision_function(&x.view()).unwrap_err(),
            CreditLensError::ModelNotFitted
        ));
    }

    #[test]
    fn test_feature_count_mismatch_errors() {
        let (model, _) = fitted();
        let x = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            model.decision_function(&x.view()).unwrap_err(),
            CreditLensError::Shape { .. }
        ));
    }
}
