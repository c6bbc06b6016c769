//! Local surrogate explainer (LIME-style)
//!
//! Model-agnostic cross-check for the attribution engine: perturb around a
//! single input, query the real model's approved-class probability on the
//! neighborhood, and fit a weighted linear model whose coefficients act as
//! approximate per-feature contributions.
//!
//! The method is stochastic. Repeated unseeded calls on identical input
//! yield slightly different weights; that is expected behavior, not a
//! defect. Tests pass an explicit seed for reproducibility.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{CreditLensError, Result};
use crate::model::Classifier;
use crate::schema::{FeatureDomain, FeatureSchema};

/// Ridge regularization for the local linear fit
const RIDGE_LAMBDA: f64 = 1e-3;

/// Ordered (feature description, weight) pairs from a one-off local linear
/// approximation, sorted by absolute weight descending
#[derive(Debug, Clone)]
pub struct SurrogateExplanation {
    /// Intercept of the local linear model
    pub intercept: f64,
    /// Approved-class probability of the explained input
    pub prediction: f64,
    pub weights: Vec<(String, f64)>,
}

/// Fits a lightweight interpretable model around one input point
#[derive(Clone)]
pub struct LocalSurrogate {
    classifier: Arc<dyn Classifier>,
    background: Array2<f64>,
    schema: FeatureSchema,
    scales: Vec<f64>,
    n_samples: usize,
    kernel_width: f64,
}

impl LocalSurrogate {
    /// Build a surrogate explainer.
    ///
    /// Requires a representative background sample: an empty or single-row
    /// background gives a degenerate perturbation distribution, so it is a
    /// configuration error rather than a silent fallback.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        background: Array2<f64>,
        schema: FeatureSchema,
    ) -> Result<Self> {
        if background.nrows() < 2 {
            return Err(CreditLensError::Config(format!(
                "surrogate explainer needs a background distribution with at least 2 rows, got {}",
                background.nrows()
            )));
        }
        if background.ncols() != schema.len() {
            return Err(CreditLensError::Config(format!(
                "background has {} columns, schema has {} features",
                background.ncols(),
                schema.len()
            )));
        }

        let scales = Self::feature_scales(&background);
        let kernel_width = 0.75 * (schema.len() as f64).sqrt();
        Ok(Self {
            classifier,
            background,
            schema,
            scales,
            n_samples: 500,
            kernel_width,
        })
    }

    /// Set the neighborhood sample count
    pub fn with_n_samples(mut self, n: usize) -> Self {
        self.n_samples = n.max(20);
        self
    }

    fn feature_scales(background: &Array2<f64>) -> Vec<f64> {
        let n = background.nrows() as f64;
        (0..background.ncols())
            .map(|j| {
                let col = background.column(j);
                let mean = col.sum() / n;
                let var = col.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect()
    }

    /// Explain one input point.
    ///
    /// `seed` fixes the perturbation sampling for reproducible output;
    /// production callers omit it for fresh sampling each time.
    pub fn explain(&self, x: &ArrayView1<f64>, seed: Option<u64>) -> Result<SurrogateExplanation> {
        if x.len() != self.schema.len() {
            return Err(CreditLensError::Shape {
                expected: format!("{} features", self.schema.len()),
                actual: format!("{} features", x.len()),
            });
        }

        let mut rng = match seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let n_features = x.len();
        let prediction = self.approved_probability(x)?;

        // Perturb in standardized space around the input
        let mut z = Array2::zeros((self.n_samples, n_features));
        let mut targets = Vec::with_capacity(self.n_samples);
        let mut kernel = Vec::with_capacity(self.n_samples);

        for i in 0..self.n_samples {
            let mut distance_sq = 0.0;
            let mut perturbed = Array1::zeros(n_features);
            for j in 0..n_features {
                let noise = standard_normal(&mut rng);
                z[[i, j]] = noise;
                distance_sq += noise * noise;
                perturbed[j] = x[j] + noise * self.scales[j];
            }
            targets.push(self.approved_probability(&perturbed.view())?);
            kernel.push((-distance_sq / self.kernel_width.powi(2)).exp());
        }

        let coefficients = weighted_ridge(&z, &targets, &kernel)?;
        let intercept = coefficients[0];

        let mut weights: Vec<(String, f64)> = self
            .schema
            .features()
            .iter()
            .enumerate()
            .map(|(j, spec)| (describe(spec.name, spec.domain, x[j]), coefficients[j + 1]))
            .collect();
        weights.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));

        Ok(SurrogateExplanation { intercept, prediction, weights })
    }

    fn approved_probability(&self, x: &ArrayView1<f64>) -> Result<f64> {
        let proba = self.classifier.predict_proba(x)?;
        proba.get(1).copied().ok_or_else(|| {
            CreditLensError::Config(
                "classifier does not expose an approved-class probability".to_string(),
            )
        })
    }
}

/// One feature's human-readable description at its observed value
fn describe(name: &str, domain: FeatureDomain, value: f64) -> String {
    match domain {
        FeatureDomain::Categorical(labels) => {
            let idx = value as usize;
            match labels.get(idx) {
                Some(label) if value.fract() == 0.0 => format!("{} = {}", name, label),
                _ => format!("{} = {}", name, value),
            }
        }
        FeatureDomain::Numeric => format!("{} = {}", name, value),
    }
}

/// Box-Muller standard normal sample
fn standard_normal(rng: &mut Xoshiro256PlusPlus) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Solve the weighted ridge system for [intercept, coefficients..]:
/// (AᵀWA + λI)β = AᵀWy with A = [1 | z].
fn weighted_ridge(z: &Array2<f64>, y: &[f64], w: &[f64]) -> Result<Vec<f64>> {
    let n = z.nrows();
    let p = z.ncols() + 1;

    let mut ata = vec![vec![0.0; p]; p];
    let mut aty = vec![0.0; p];

    for i in 0..n {
        let wi = w[i];
        let mut row = Vec::with_capacity(p);
        row.push(1.0);
        for j in 0..z.ncols() {
            row.push(z[[i, j]]);
        }
        for a in 0..p {
            aty[a] += wi * row[a] * y[i];
            for b in a..p {
                ata[a][b] += wi * row[a] * row[b];
            }
        }
    }
    for a in 0..p {
        for b in 0..a {
            ata[a][b] = ata[b][a];
        }
        ata[a][a] += RIDGE_LAMBDA;
    }

    solve_linear_system(ata, aty)
}

/// Gaussian elimination with partial pivoting
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(CreditLensError::Config(
                "degenerate perturbation neighborhood, cannot fit local model".to_string(),
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}
