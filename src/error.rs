//! Error types for the CreditLens service

use thiserror::Error;

/// Result type alias for CreditLens operations
pub type Result<T> = std::result::Result<T, CreditLensError>;

/// Main error type for the CreditLens service
#[derive(Error, Debug)]
pub enum CreditLensError {
    /// A required feature is missing or a category value is unrecognized.
    /// Terminal for the request; surfaced to the caller as a client error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The classifier artifact is missing or corrupt. Fatal at startup.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// The attribution computation failed or returned an unexpected shape.
    /// Recovered locally into a soft error payload; the prediction survives.
    #[error("Attribution error: {0}")]
    Attribution(String),

    /// The surrogate explainer was built or invoked without a valid
    /// background distribution. Terminal for that call only.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CreditLensError {
    fn from(err: serde_json::Error) -> Self {
        CreditLensError::Serialization(err.to_string())
    }
}
