//! HTTP request handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::error::{Result, ServerError};
use super::state::AppState;

/// Predict + attribute one applicant record.
///
/// Body: feature name → numeric/coded value (categorical string labels are
/// also accepted and encoded); order-independent on the wire.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<HashMap<String, Value>>,
) -> Result<Json<crate::service::PredictionResponse>> {
    let record = state.service.schema().encode(&raw)?;
    let response = state.service.predict(&record)?;
    info!(prediction = response.prediction, confidence = response.confidence, "Prediction request served");
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct LimeQuery {
    /// Optional sampling seed for reproducible explanations
    seed: Option<u64>,
}

/// Local surrogate explanation for one applicant record.
///
/// The neighborhood sampling is CPU-bound, so it runs on the blocking pool;
/// a request dropped by the client simply abandons the unit of work.
pub async fn explain_lime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimeQuery>,
    Json(raw): Json<HashMap<String, Value>>,
) -> Result<Json<crate::service::SurrogateResponse>> {
    let record = state.service.schema().encode(&raw)?;

    let service = Arc::clone(&state.service);
    let seed = query.seed;
    let response = tokio::task::spawn_blocking(move || service.explain_locally(&record, seed))
        .await
        .map_err(|e| ServerError::Internal(format!("surrogate task failed: {}", e)))??;

    info!(weights = response.lime_explanation.len(), "Surrogate explanation served");
    Ok(Json(response))
}

/// Model metadata: feature contract and explainer readiness
pub async fn model_info(
    State(state): State<Arc<AppState>>,
) -> Json<crate::service::ServiceInfo> {
    Json(state.service.info())
}

pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
