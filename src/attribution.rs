//! Attribution engine: additive per-feature decomposition of one prediction
//!
//! Exact for the tree ensemble: contributions are read off the trees'
//! decision paths, so baseline + sum(contributions) reproduces the raw
//! approved-class margin. The engine also owns output-shape normalization:
//! the underlying computation may report a single output array or one array
//! per class, and either shape must be handled without crashing the serving
//! path. Attribution is best-effort; every failure in here is converted to
//! an error value the orchestrator can report alongside a successful
//! prediction.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};

use crate::error::{CreditLensError, Result};
use crate::model::GradientBoostedClassifier;
use crate::schema::FeatureSchema;

/// Index of the approved class in per-class attribution output
const APPROVED_OUTPUT: usize = 1;

/// Shape of the underlying attribution computation's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// One per-feature array (binary model framed as a single margin)
    Single,
    /// One per-feature array per class
    PerClass { n_classes: usize },
}

/// Raw attribution output, before class selection
#[derive(Debug, Clone)]
pub enum RawContributions {
    SingleOutput {
        baseline: f64,
        contributions: Array1<f64>,
    },
    MultiOutput {
        baselines: Vec<f64>,
        contributions: Vec<Array1<f64>>,
    },
}

/// Source of raw additive contributions for one input row.
///
/// The layout a model declares is fixed for its lifetime; the engine probes
/// it once at construction and treats any per-call deviation as an error.
pub trait ContributionModel: Send + Sync {
    fn contribution_layout(&self) -> OutputLayout;
    fn raw_contributions(&self, x: &ArrayView1<f64>) -> Result<RawContributions>;
}

impl ContributionModel for GradientBoostedClassifier {
    fn contribution_layout(&self) -> OutputLayout {
        OutputLayout::Single
    }

    fn raw_contributions(&self, x: &ArrayView1<f64>) -> Result<RawContributions> {
        Ok(RawContributions::SingleOutput {
            baseline: self.baseline()?,
            contributions: self.path_contributions(x)?,
        })
    }
}

/// Additive attribution of one prediction, keyed by feature name
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Expected raw score before any feature is observed
    pub baseline: f64,
    pub values: HashMap<String, f64>,
}

impl Attribution {
    pub fn sum(&self) -> f64 {
        self.values.values().sum()
    }

    /// Entries of an attribution map sorted by absolute contribution,
    /// descending. Associated so callers holding a bare value map (the wire
    /// payload carries no baseline) can rank it the same way.
    pub fn ranked(values: &HashMap<String, f64>) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> =
            values.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        ranked.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Computes attributions for single rows against a fixed model and schema
#[derive(Clone)]
pub struct AttributionEngine {
    model: Arc<dyn ContributionModel>,
    feature_names: Vec<String>,
    layout: OutputLayout,
}

impl AttributionEngine {
    /// Build an engine for `model`, probing its output layout once.
    pub fn new(model: Arc<dyn ContributionModel>, schema: &FeatureSchema) -> Self {
        let layout = model.contribution_layout();
        Self {
            model,
            feature_names: schema.feature_names(),
            layout,
        }
    }

    /// Attribute one prediction.
    ///
    /// Any failure, in the underlying computation or in shape detection,
    /// comes back as `Err(Attribution(..))` for the orchestrator to degrade
    /// gracefully on. This method never panics on malformed model output.
    pub fn attribute(&self, x: &ArrayView1<f64>) -> Result<Attribution> {
        let raw = self
            .model
            .raw_contributions(x)
            .map_err(|e| CreditLensError::Attribution(e.to_string()))?;

        let (baseline, contributions) = self.select_output(raw)?;

        if contributions.len() != self.feature_names.len() {
            return Err(CreditLensError::Attribution(format!(
                "expected {} contributions, got {}",
                self.feature_names.len(),
                contributions.len()
            )));
        }

        let values = self
            .feature_names
            .iter()
            .cloned()
            .zip(contributions.iter().copied())
            .collect();
        Ok(Attribution { baseline, values })
    }

    fn select_output(&self, raw: RawContributions) -> Result<(f64, Array1<f64>)> {
        match (self.layout, raw) {
            (OutputLayout::Single, RawContributions::SingleOutput { baseline, contributions }) => {
                Ok((baseline, contributions))
            }
            (
                OutputLayout::PerClass { .. },
                RawContributions::MultiOutput { baselines, mut contributions },
            ) => {
                if contributions.len() <= APPROVED_OUTPUT || baselines.len() <= APPROVED_OUTPUT {
                    return Err(CreditLensError::Attribution(format!(
                        "per-class output has {} arrays, need the approved class at index {}",
                        contributions.len(),
                        APPROVED_OUTPUT
                    )));
                }
                Ok((
                    baselines[APPROVED_OUTPUT],
                    contributions.swap_remove(APPROVED_OUTPUT),
                ))
            }
            (layout, raw) => Err(CreditLensError::Attribution(format!(
                "attribution output shape does not match declared layout {:?}: got {}",
                layout,
                match raw {
                    RawContributions::SingleOutput { .. } => "single-output",
                    RawContributions::MultiOutput { .. } => "multi-output",
                }
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoostingConfig;
    use ndarray::Array2;

    struct StubModel {
        layout: OutputLayout,
        output: std::result::Result<RawContributions, String>,
    }

    impl ContributionModel for StubModel {
        fn contribution_layout(&self) -> OutputLayout {
            self.layout
        }

        fn raw_contributions(&self, _x: &ArrayView1<f64>) -> Result<RawContributions> {
            self.output
                .clone()
                .map_err(CreditLensError::Attribution)
        }
    }

    fn engine(stub: StubModel) -> AttributionEngine {
        AttributionEngine::new(Arc::new(stub), &FeatureSchema::loan_approval())
    }

    fn vector_13() -> Array1<f64> {
        Array1::from_elem(13, 1.0)
    }

    #[test]
    fn test_single_output_used_directly() {
        let contributions = Array1::from_iter((0..13).map(|i| i as f64 * 0.1));
        let stub = StubModel {
            layout: OutputLayout::Single,
            output: Ok(RawContributions::SingleOutput {
                baseline: -0.5,
                contributions: contributions.clone(),
            }),
        };

        let attribution = engine(stub).attribute(&vector_13().view()).unwrap();
        assert_eq!(attribution.baseline, -0.5);
        assert_eq!(attribution.values.len(), 13);
        assert_eq!(attribution.values["person_gender"], 0.1);
    }

    #[test]
    fn test_multi_output_selects_approved_class() {
        let rejected = Array1::from_elem(13, -1.0);
        let approved = Array1::from_elem(13, 2.0);
        let stub = StubModel {
            layout: OutputLayout::PerClass { n_classes: 2 },
            output: Ok(RawContributions::MultiOutput {
                baselines: vec![0.3, 0.7],
                contributions: vec![rejected, approved],
            }),
        };

        let attribution = engine(stub).attribute(&vector_13().view()).unwrap();
        assert_eq!(attribution.baseline, 0.7);
        assert!(attribution.values.values().all(|&v| v == 2.0));
    }

    #[test]
    fn test_underlying_failure_becomes_attribution_error() {
        let stub = StubModel {
            layout: OutputLayout::Single,
            output: Err("unsupported model type".to_string()),
        };

        let err = engine(stub).attribute(&vector_13().view()).unwrap_err();
        assert!(matches!(err, CreditLensError::Attribution(_)));
        assert!(err.to_string().contains("unsupported model type"));
    }

    #[test]
    fn test_shape_mismatch_is_detected() {
        // Declares single-output but returns per-class arrays
        let stub = StubModel {
            layout: OutputLayout::Single,
            output: Ok(RawContributions::MultiOutput {
                baselines: vec![0.0, 0.0],
                contributions: vec![Array1::zeros(13), Array1::zeros(13)],
            }),
        };

        let err = engine(stub).attribute(&vector_13().view()).unwrap_err();
        assert!(matches!(err, CreditLensError::Attribution(_)));
    }

    #[test]
    fn test_missing_approved_class_is_detected() {
        let stub = StubModel {
            layout: OutputLayout::PerClass { n_classes: 2 },
            output: Ok(RawContributions::MultiOutput {
                baselines: vec![0.0],
                contributions: vec![Array1::zeros(13)],
            }),
        };

        let err = engine(stub).attribute(&vector_13().view()).unwrap_err();
        assert!(matches!(err, CreditLensError::Attribution(_)));
    }

    #[test]
    fn test_wrong_feature_count_is_detected() {
        let stub = StubModel {
            layout: OutputLayout::Single,
            output: Ok(RawContributions::SingleOutput {
                baseline: 0.0,
                contributions: Array1::zeros(4),
            }),
        };

        let err = engine(stub).attribute(&vector_13().view()).unwrap_err();
        assert!(err.to_string().contains("expected 13 contributions"));
    }

    #[test]
    fn test_ranked_sorts_by_absolute_magnitude() {
        let values = HashMap::from([
            ("a".to_string(), 1.0),
            ("b".to_string(), -3.0),
            ("c".to_string(), 2.0),
        ]);
        let ranked = Attribution::ranked(&values);
        assert_eq!(ranked[0].0, "b");
        assert_eq!(ranked[1].0, "c");
        assert_eq!(ranked[2].0, "a");
    }

    #[test]
    fn test_tree_ensemble_attribution_is_exact() {
        let schema = FeatureSchema::loan_approval();
        let n = schema.len();
        let x = Array2::from_shape_fn((30, n), |(i, j)| ((i * 5 + j * 3) % 13) as f64);
        let y: Array1<f64> = (0..30).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();

        let mut model = crate::model::GradientBoostedClassifier::new(BoostingConfig {
            n_estimators: 10,
            max_depth: 3,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let row = x.row(4).to_owned();
        let margin = model.decision_function(&row.view()).unwrap();

        let engine = AttributionEngine::new(Arc::new(model), &schema);
        let attribution = engine.attribute(&row.view()).unwrap();

        assert_eq!(attribution.values.len(), n);
        assert!(
            (attribution.baseline + attribution.sum() - margin).abs() < 1e-9,
            "baseline {} + sum {} vs margin {}",
            attribution.baseline,
            attribution.sum(),
            margin
        );
    }
}
