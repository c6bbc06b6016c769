//! Explanation service: the per-request orchestrator
//!
//! Request flow, terminal on first error: raw record → schema
//! reorder/validate → predict + confidence → attribute. Attribution is the
//! one non-terminal step: its failure degrades into an `{error}` payload
//! while the prediction is still returned. The surrogate path is a separate
//! entry point sharing only the validation step.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::attribution::AttributionEngine;
use crate::error::{CreditLensError, Result};
use crate::model::{ModelAdapter, ModelArtifact};
use crate::schema::{ApplicantRecord, FeatureSchema};
use crate::surrogate::LocalSurrogate;

/// Prediction-path response payload
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub prediction: u32,
    /// Maximum class probability, rounded to 2 decimals
    pub confidence: f64,
    pub shap_values: AttributionPayload,
}

/// Attribution result or its soft error
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AttributionPayload {
    Values(HashMap<String, f64>),
    Failed { error: String },
}

/// Surrogate-path response payload
#[derive(Debug, Clone, Serialize)]
pub struct SurrogateResponse {
    pub lime_explanation: Vec<(String, f64)>,
}

/// Summary exposed on the model info endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub feature_names: Vec<String>,
    pub n_trees: Option<usize>,
    pub surrogate_ready: bool,
}

/// Read-only per-process service; all state is fixed at startup and shared
/// across any number of concurrent requests without locking.
pub struct ExplanationService {
    schema: FeatureSchema,
    adapter: ModelAdapter,
    attribution: AttributionEngine,
    surrogate: Option<LocalSurrogate>,
    n_trees: Option<usize>,
}

impl ExplanationService {
    /// Assemble a service from explicit components (tests inject stubs here)
    pub fn new(
        schema: FeatureSchema,
        adapter: ModelAdapter,
        attribution: AttributionEngine,
        surrogate: Option<LocalSurrogate>,
    ) -> Self {
        Self { schema, adapter, attribution, surrogate, n_trees: None }
    }

    /// Build the production service from a loaded artifact.
    ///
    /// The classifier instance is shared read-only by the adapter, the
    /// attribution engine, and the surrogate explainer. A background too
    /// small for the surrogate leaves the prediction path fully functional;
    /// only the surrogate endpoint reports the configuration error.
    pub fn from_artifact(artifact: ModelArtifact, schema: FeatureSchema) -> Result<Self> {
        let n_trees = Some(artifact.classifier.n_trees());
        let background = artifact.background_matrix()?;
        let classifier = Arc::new(artifact.classifier);

        let adapter = ModelAdapter::new(classifier.clone());
        let attribution = AttributionEngine::new(classifier.clone(), &schema);

        let surrogate = match LocalSurrogate::new(classifier, background, schema.clone()) {
            Ok(surrogate) => Some(surrogate),
            Err(e) => {
                warn!(error = %e, "Surrogate explainer unavailable, serving predictions only");
                None
            }
        };

        Ok(Self { schema, adapter, attribution, surrogate, n_trees })
    }

    /// Predict + attribute one applicant record.
    ///
    /// Schema validation and prediction errors are terminal; attribution
    /// failure is folded into the response so the prediction still reaches
    /// the caller.
    pub fn predict(&self, record: &ApplicantRecord) -> Result<PredictionResponse> {
        let vector = self.schema.reorder(record)?;
        let (prediction, confidence) = self.adapter.predict_with_confidence(&vector.view())?;

        let shap_values = match self.attribution.attribute(&vector.view()) {
            Ok(attribution) => AttributionPayload::Values(attribution.values),
            Err(e) => {
                warn!(error = %e, "Attribution failed, returning prediction without it");
                AttributionPayload::Failed { error: e.to_string() }
            }
        };

        debug!(prediction, confidence, "Prediction served");
        Ok(PredictionResponse {
            prediction,
            confidence: round2(confidence),
            shap_values,
        })
    }

    /// Independent local surrogate explanation for one record.
    ///
    /// Stochastic unless `seed` is supplied. Errors here never affect the
    /// prediction path.
    pub fn explain_locally(
        &self,
        record: &ApplicantRecord,
        seed: Option<u64>,
    ) -> Result<SurrogateResponse> {
        let vector = self.schema.reorder(record)?;
        let surrogate = self.surrogate.as_ref().ok_or_else(|| {
            CreditLensError::Config(
                "surrogate explainer is not configured: no background distribution".to_string(),
            )
        })?;

        let explanation = surrogate.explain(&vector.view(), seed)?;
        debug!(prediction = explanation.prediction, "Surrogate explanation served");
        Ok(SurrogateResponse { lime_explanation: explanation.weights })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            feature_names: self.schema.feature_names(),
            n_trees: self.n_trees,
            surrogate_ready: self.surrogate.is_some(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{ContributionModel, OutputLayout, RawContributions};
    use crate::model::Classifier;
    use ndarray::{array, Array1, ArrayView1};

    struct ApproveStub;

    impl Classifier for ApproveStub {
        fn predict_proba(&self, _x: &ArrayView1<f64>) -> Result<Array1<f64>> {
            Ok(array![0.25, 0.75])
        }
    }

    struct FailingAttribution;

    impl ContributionModel for FailingAttribution {
        fn contribution_layout(&self) -> OutputLayout {
            OutputLayout::Single
        }

        fn raw_contributions(&self, _x: &ArrayView1<f64>) -> Result<RawContributions> {
            Err(CreditLensError::Attribution("tree walker exploded".to_string()))
        }
    }

    struct ConstantAttribution;

    impl ContributionModel for ConstantAttribution {
        fn contribution_layout(&self) -> OutputLayout {
            OutputLayout::Single
        }

        fn raw_contributions(&self, x: &ArrayView1<f64>) -> Result<RawContributions> {
            Ok(RawContributions::SingleOutput {
                baseline: 0.1,
                contributions: Array1::from_elem(x.len(), 0.05),
            })
        }
    }

    fn sample_record() -> ApplicantRecord {
        let schema = FeatureSchema::loan_approval();
        let values = [30.0, 1.0, 1.0, 50000.0, 5.0, 0.0, 10000.0, 0.0, 10.5, 0.2, 5.0, 650.0, 0.0];
        schema.feature_names().into_iter().zip(values).collect()
    }

    fn stub_service(attribution_model: Arc<dyn ContributionModel>) -> ExplanationService {
        let schema = FeatureSchema::loan_approval();
        ExplanationService::new(
            schema.clone(),
            ModelAdapter::new(Arc::new(ApproveStub)),
            AttributionEngine::new(attribution_model, &schema),
            None,
        )
    }

    #[test]
    fn test_predict_happy_path() {
        let service = stub_service(Arc::new(ConstantAttribution));
        let response = service.predict(&sample_record()).unwrap();

        assert_eq!(response.prediction, 1);
        assert_eq!(response.confidence, 0.75);
        match response.shap_values {
            AttributionPayload::Values(values) => {
                assert_eq!(values.len(), 13);
                assert!(values.contains_key("credit_score"));
            }
            AttributionPayload::Failed { .. } => panic!("attribution should succeed"),
        }
    }

    #[test]
    fn test_attribution_failure_is_soft() {
        let service = stub_service(Arc::new(FailingAttribution));
        let response = service.predict(&sample_record()).unwrap();

        // Prediction and confidence survive the attribution failure
        assert_eq!(response.prediction, 1);
        assert_eq!(response.confidence, 0.75);
        match response.shap_values {
            AttributionPayload::Failed { error } => {
                assert!(error.contains("tree walker exploded"));
            }
            AttributionPayload::Values(_) => panic!("attribution should fail"),
        }
    }

    #[test]
    fn test_schema_error_is_terminal() {
        let service = stub_service(Arc::new(ConstantAttribution));
        let mut record = sample_record();
        record.remove("loan_amnt");

        let err = service.predict(&record).unwrap_err();
        assert!(matches!(err, CreditLensError::Schema(_)));
    }

    #[test]
    fn test_surrogate_without_background_is_config_error() {
        let service = stub_service(Arc::new(ConstantAttribution));
        let err = service.explain_locally(&sample_record(), Some(1)).unwrap_err();
        assert!(matches!(err, CreditLensError::Config(_)));
    }

    #[test]
    fn test_confidence_rounded_to_two_decimals() {
        struct OddProba;
        impl Classifier for OddProba {
            fn predict_proba(&self, _x: &ArrayView1<f64>) -> Result<Array1<f64>> {
                Ok(array![0.123_456, 0.876_544])
            }
        }

        let schema = FeatureSchema::loan_approval();
        let service = ExplanationService::new(
            schema.clone(),
            ModelAdapter::new(Arc::new(OddProba)),
            AttributionEngine::new(Arc::new(ConstantAttribution), &schema),
            None,
        );

        let response = service.predict(&sample_record()).unwrap();
        assert_eq!(response.confidence, 0.88);
    }

    #[test]
    fn test_serialized_shapes_match_wire_contract() {
        let service = stub_service(Arc::new(ConstantAttribution));
        let response = service.predict(&sample_record()).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["prediction"], 1);
        assert!(json["shap_values"].is_object());
        assert_eq!(json["shap_values"].as_object().unwrap().len(), 13);

        let service = stub_service(Arc::new(FailingAttribution));
        let response = service.predict(&sample_record()).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["shap_values"]["error"].is_string());
    }
}
