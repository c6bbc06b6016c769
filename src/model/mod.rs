//! Model adapter: the classifier boundary the service talks through
//!
//! The trained classifier is loaded once at startup, wrapped behind the
//! [`Classifier`] trait, and injected read-only into the request path. Stub
//! implementations substitute for it in tests.

mod boosting;
mod tree;

pub use boosting::{BoostingConfig, GradientBoostedClassifier};
pub use tree::{RegressionTree, TreeNode};

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CreditLensError, Result};
use crate::schema::FeatureSchema;

/// Class index for a rejected application
pub const CLASS_REJECTED: u32 = 0;
/// Class index for an approved application
pub const CLASS_APPROVED: u32 = 1;

/// A fitted classifier over {rejected, approved}, serving a fixed-order
/// feature vector. Implementations must be immutable after construction so
/// a single instance can serve all requests without locking.
pub trait Classifier: Send + Sync {
    /// Probability vector over [rejected, approved]
    fn predict_proba(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>>;
}

impl Classifier for GradientBoostedClassifier {
    fn predict_proba(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        let approved = self.predict_proba_one(x)?;
        Ok(Array1::from_vec(vec![1.0 - approved, approved]))
    }
}

/// Wraps exactly one pre-trained classifier instance; stateless beyond it.
#[derive(Clone)]
pub struct ModelAdapter {
    classifier: Arc<dyn Classifier>,
}

impl ModelAdapter {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    /// Predicted class label
    pub fn predict(&self, x: &ArrayView1<f64>) -> Result<u32> {
        Ok(self.predict_with_confidence(x)?.0)
    }

    /// Predicted class label plus confidence.
    ///
    /// Confidence is the maximum class probability, not the approved-class
    /// probability: a certain rejection reports the same confidence framing
    /// as a certain approval.
    pub fn predict_with_confidence(&self, x: &ArrayView1<f64>) -> Result<(u32, f64)> {
        let proba = self.classifier.predict_proba(x)?;
        if proba.is_empty() {
            return Err(CreditLensError::Shape {
                expected: "non-empty probability vector".to_string(),
                actual: "0 classes".to_string(),
            });
        }
        let (label, confidence) = proba
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, &p)| (idx as u32, p))
            .unwrap_or((CLASS_REJECTED, 0.0));
        Ok((label, confidence))
    }

    pub fn predict_proba(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        self.classifier.predict_proba(x)
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.classifier)
    }
}

/// The serialized startup artifact: the fitted classifier, the feature-name
/// contract it was trained against, and a representative background sample
/// for the surrogate explainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub classifier: GradientBoostedClassifier,
    pub background: Vec<Vec<f64>>,
}

impl ModelArtifact {
    pub fn new(
        classifier: GradientBoostedClassifier,
        feature_names: Vec<String>,
        background: Vec<Vec<f64>>,
    ) -> Self {
        Self { feature_names, classifier, background }
    }

    /// Load the artifact and verify its feature contract against the schema.
    ///
    /// A name or order mismatch here means positional inputs would silently
    /// feed the wrong columns to the model, so it is fatal at startup.
    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CreditLensError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| {
            CreditLensError::ModelLoad(format!("corrupt artifact {}: {}", path.display(), e))
        })?;

        if artifact.feature_names != schema.feature_names() {
            return Err(CreditLensError::ModelLoad(format!(
                "artifact feature order does not match schema: {:?} vs {:?}",
                artifact.feature_names,
                schema.feature_names()
            )));
        }
        if artifact.classifier.n_features() != schema.len() {
            return Err(CreditLensError::ModelLoad(format!(
                "classifier expects {} features, schema has {}",
                artifact.classifier.n_features(),
                schema.len()
            )));
        }
        if artifact.background.iter().any(|row| row.len() != schema.len()) {
            return Err(CreditLensError::ModelLoad(
                "background rows do not match schema width".to_string(),
            ));
        }

        info!(
            path = %path.display(),
            trees = artifact.classifier.n_trees(),
            background_rows = artifact.background.len(),
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Background sample as a matrix
    pub fn background_matrix(&self) -> Result<Array2<f64>> {
        let n_rows = self.background.len();
        let n_cols = self.feature_names.len();
        let flat: Vec<f64> = self.background.iter().flatten().copied().collect();
        Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| CreditLensError::Shape {
            expected: format!("{}x{} background", n_rows, n_cols),
            actual: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FixedProba(Vec<f64>);

    impl Classifier for FixedProba {
        fn predict_proba(&self, _x: &ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_vec(self.0.clone()))
        }
    }

    #[test]
    fn test_confidence_is_max_class_probability() {
        let adapter = ModelAdapter::new(Arc::new(FixedProba(vec![0.8, 0.2])));
        let x = array![1.0];

        let (label, confidence) = adapter.predict_with_confidence(&x.view()).unwrap();
        assert_eq!(label, CLASS_REJECTED);
        // Confidence reports the rejection certainty, not the approved probability
        assert!((confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_predict_approved() {
        let adapter = ModelAdapter::new(Arc::new(FixedProba(vec![0.3, 0.7])));
        let x = array![1.0];
        assert_eq!(adapter.predict(&x.view()).unwrap(), CLASS_APPROVED);
    }

    #[test]
    fn test_binary_confidence_at_least_half() {
        for approved in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let adapter = ModelAdapter::new(Arc::new(FixedProba(vec![1.0 - approved, approved])));
            let x = array![0.0];
            let (_, confidence) = adapter.predict_with_confidence(&x.view()).unwrap();
            assert!((0.5..=1.0).contains(&confidence), "confidence {}", confidence);
        }
    }

    fn fitted_artifact() -> ModelArtifact {
        use ndarray::{Array1, Array2};
        let schema = FeatureSchema::loan_approval();
        let n = schema.len();
        let x = Array2::from_shape_fn((20, n), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y: Array1<f64> = (0..20).map(|i| (i % 2) as f64).collect();

        let mut classifier = GradientBoostedClassifier::new(BoostingConfig {
            n_estimators: 3,
            max_depth: 2,
            ..Default::default()
        });
        classifier.fit(&x, &y).unwrap();

        let background: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        ModelArtifact::new(classifier, schema.feature_names(), background)
    }

    #[test]
    fn test_artifact_round_trip() {
        let schema = FeatureSchema::loan_approval();
        let artifact = fitted_artifact();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path, &schema).unwrap();
        assert_eq!(loaded.feature_names, schema.feature_names());
        assert_eq!(loaded.classifier.n_trees(), artifact.classifier.n_trees());
    }

    #[test]
    fn test_load_missing_artifact_is_fatal() {
        let schema = FeatureSchema::loan_approval();
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json"), &schema).unwrap_err();
        assert!(matches!(err, CreditLensError::ModelLoad(_)));
    }

    #[test]
    fn test_load_corrupt_artifact_is_fatal() {
        let schema = FeatureSchema::loan_approval();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let err = ModelArtifact::load(&path, &schema).unwrap_err();
        assert!(matches!(err, CreditLensError::ModelLoad(_)));
    }

    #[test]
    fn test_load_rejects_feature_order_mismatch() {
        let schema = FeatureSchema::loan_approval();
        let mut artifact = fitted_artifact();
        artifact.feature_names.swap(0, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        let err = ModelArtifact::load(&path, &schema).unwrap_err();
        assert!(err.to_string().contains("feature order"));
    }
}
