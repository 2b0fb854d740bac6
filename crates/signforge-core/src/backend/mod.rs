//! Generation backends - text-to-image service integrations.

mod http;

pub use http::HttpGenerationBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{FailureKind, StageFailure};
use crate::model::ResolvedRequest;

/// Raw output of one generation call.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Encoded raster bytes (PNG or JPEG) as served by the backend.
    pub bytes: Vec<u8>,
    /// Model identifier the backend reports.
    pub model: String,
    /// Prompt rewrite applied upstream, when the backend reports one.
    pub revised_prompt: Option<String>,
}

/// Classified backend failure.
///
/// Messages summarize the upstream error in plain text; the request payload
/// and the credential never appear in them.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected the request: {0}")]
    InvalidRequest(String),
    #[error("backend rejected the credential")]
    Auth,
    #[error("backend rate limit hit: {0}")]
    RateLimited(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::InvalidRequest(_) => FailureKind::InvalidInput,
            BackendError::Auth => FailureKind::AuthFailure,
            BackendError::RateLimited(_) => FailureKind::RateLimited,
            BackendError::Unavailable(_) => FailureKind::ServiceUnavailable,
        }
    }
}

impl From<BackendError> for StageFailure {
    fn from(err: BackendError) -> Self {
        StageFailure::new(err.kind(), err.to_string())
    }
}

/// Trait for text-to-image backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit one resolved request and return the raster bytes.
    async fn generate(&self, request: &ResolvedRequest) -> Result<GeneratedImage, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_map_to_failure_kinds() {
        assert_eq!(
            BackendError::InvalidRequest("bad size".into()).kind(),
            FailureKind::InvalidInput
        );
        assert_eq!(BackendError::Auth.kind(), FailureKind::AuthFailure);
        assert_eq!(
            BackendError::RateLimited("slow down".into()).kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            BackendError::Unavailable("502".into()).kind(),
            FailureKind::ServiceUnavailable
        );
    }

    #[test]
    fn stage_failure_carries_kind_and_summary() {
        let failure: StageFailure = BackendError::RateLimited("retry later".into()).into();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.reason, "backend rate limit hit: retry later");
    }
}
