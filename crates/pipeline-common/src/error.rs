//! Error types shared across the granule pipeline services.

use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Primary error type for granule-pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    // === Catalog / upstream errors ===
    #[error("catalog API request failed: {0}")]
    CatalogRequest(String),

    #[error("catalog API returned client error {status}: {body}")]
    CatalogClientError { status: u16, body: String },

    #[error("upstream product is no longer retrievable (expired/404/410)")]
    ProductExpired,

    // === Storage errors ===
    #[error("database error: {0}")]
    Database(String),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // === Validation / config errors ===
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    // === Infrastructure ===
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status this error should surface as on the fetcher's push endpoint.
    pub fn http_status_code(&self) -> u16 {
        match self {
            PipelineError::Unauthorized => 401,
            PipelineError::Validation(_) | PipelineError::Config(_) => 400,
            PipelineError::CatalogClientError { status, .. } => *status,
            PipelineError::ProductExpired => 410,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal(format!("JSON error: {err}"))
    }
}
