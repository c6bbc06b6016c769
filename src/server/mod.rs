//! CreditLens Server Module
//!
//! HTTP surface for the explanation service: prediction with attributions,
//! local surrogate explanations, and model metadata.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::model::ModelArtifact;
use crate::schema::FeatureSchema;
use crate::service::ExplanationService;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("model.json")),
        }
    }
}

/// Start the server with the given configuration.
///
/// Loading the classifier artifact is a one-time startup step; if it fails
/// the process must not serve traffic, so the error propagates out of here.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();

    let schema = FeatureSchema::loan_approval();
    let artifact = ModelArtifact::load(&config.model_path, &schema)?;
    let service = ExplanationService::from_artifact(artifact, schema)?;

    let state = Arc::new(AppState::new(config.clone(), service));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        host = %config.host,
        port = config.port,
        model = %config.model_path.display(),
        started_at = %start_time.to_rfc3339(),
        "CreditLens server starting"
    );
    info!(url = %format!("http://{}/api/predict", addr), "Prediction endpoint available");
    info!(url = %format!("http://{}/api/lime", addr), "Surrogate explanation endpoint available");
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let stop_time = chrono::Utc::now();
            let uptime = stop_time.signed_duration_since(start_time);
            info!(
                stopped_at = %stop_time.to_rfc3339(),
                uptime_secs = uptime.num_seconds(),
                "Shutdown signal received, stopping server gracefully"
            );
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
