//! Application state management

use std::sync::Arc;

use crate::service::ExplanationService;

use super::ServerConfig;

/// State shared across handlers: the read-only explanation service plus the
/// server configuration. Nothing here is mutated after startup, so requests
/// run fully lock-free.
pub struct AppState {
    pub config: ServerConfig,
    pub service: Arc<ExplanationService>,
}

impl AppState {
    pub fn new(config: ServerConfig, service: ExplanationService) -> Self {
        Self { config, service: Arc::new(service) }
    }
}
