//! Port for the language-model extraction service.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("extraction service rate limited")]
    RateLimited,
    #[error("extraction service error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("extraction service returned no content")]
    EmptyResponse,
    #[error("malformed extraction output: {0}")]
    Malformed(String),
}

/// Prompt in, one JSON object out.
///
/// Output is not guaranteed to be deterministic or even well-formed;
/// callers validate it.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn complete_json(&self, prompt: &str) -> Result<String, OracleError>;
}
