//! CreditLens - Explainable loan approval service
//!
//! Serves binary loan-approval decisions together with per-feature
//! attribution explanations, so a reviewer sees not just the decision but
//! why the model made it.
//!
//! # Modules
//!
//! - [`schema`] - The frozen feature schema: ordering and categorical
//!   encodings fixed at training time
//! - [`model`] - Model adapter around the gradient boosted classifier,
//!   plus the startup artifact
//! - [`attribution`] - Exact additive per-feature attribution via the
//!   trees' decision paths, with output-shape normalization
//! - [`surrogate`] - Independent LIME-style local surrogate explainer
//! - [`service`] - Per-request orchestrator assembling the response
//! - [`server`] - axum HTTP surface
//! - [`cli`] - Command-line interface

pub mod error;

pub mod attribution;
pub mod model;
pub mod schema;
pub mod service;
pub mod surrogate;

pub mod cli;
pub mod server;

pub use error::{CreditLensError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{CreditLensError, Result};

    pub use crate::schema::{ApplicantRecord, FeatureDomain, FeatureSchema};

    pub use crate::model::{
        BoostingConfig, Classifier, GradientBoostedClassifier, ModelAdapter, ModelArtifact,
        CLASS_APPROVED, CLASS_REJECTED,
    };

    pub use crate::attribution::{
        Attribution, AttributionEngine, ContributionModel, OutputLayout, RawContributions,
    };

    pub use crate::surrogate::{LocalSurrogate, SurrogateExplanation};

    pub use crate::service::{
        AttributionPayload, ExplanationService, PredictionResponse, SurrogateResponse,
    };

    pub use crate::server::{create_router, AppState, ServerConfig};
}
