//! Failure taxonomy shared by every stage and the orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable classification of a stage failure.
///
/// The retry policy keys off [`FailureKind::is_retriable`]; everything else
/// (reason strings, audit records) treats the kind as opaque data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Caller error: malformed prompt, bad parameters, unusable artifact.
    InvalidInput,
    /// Credential rejected by the generation backend.
    AuthFailure,
    /// Backend throttled the request.
    RateLimited,
    /// Backend or engine unavailable, timed out, or crashed.
    ServiceUnavailable,
    /// A quality checkpoint failed its gate.
    QualityRejected,
    /// Mesh failed watertight/manifold/volume checks; routes to repair.
    MeshIntegrityFailure,
    /// Bounded repair attempts ran out without a printable mesh.
    RepairExhausted,
    /// Artifact persistence failed.
    StorageFailure,
    /// The run was cancelled between stages.
    Cancelled,
}

impl FailureKind {
    /// Whether the retry policy may schedule another attempt for this kind.
    ///
    /// Transient/service/quality failures retry; caller errors, credential
    /// errors, storage errors, and terminal outcomes never do.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FailureKind::RateLimited
                | FailureKind::ServiceUnavailable
                | FailureKind::QualityRejected
                | FailureKind::MeshIntegrityFailure
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::AuthFailure => "auth_failure",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServiceUnavailable => "service_unavailable",
            FailureKind::QualityRejected => "quality_rejected",
            FailureKind::MeshIntegrityFailure => "mesh_integrity_failure",
            FailureKind::RepairExhausted => "repair_exhausted",
            FailureKind::StorageFailure => "storage_failure",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified stage failure with a human-readable reason.
///
/// The reason never contains credentials or raw backend payloads; adapters
/// summarize upstream errors into plain text before constructing one.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {reason}")]
pub struct StageFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, reason)
    }

    pub fn quality_rejected(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::QualityRejected, reason)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "run cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds_match_the_taxonomy() {
        assert!(FailureKind::RateLimited.is_retriable());
        assert!(FailureKind::ServiceUnavailable.is_retriable());
        assert!(FailureKind::QualityRejected.is_retriable());
        assert!(FailureKind::MeshIntegrityFailure.is_retriable());

        assert!(!FailureKind::InvalidInput.is_retriable());
        assert!(!FailureKind::AuthFailure.is_retriable());
        assert!(!FailureKind::StorageFailure.is_retriable());
        assert!(!FailureKind::RepairExhausted.is_retriable());
        assert!(!FailureKind::Cancelled.is_retriable());
    }

    #[test]
    fn failure_displays_kind_and_reason() {
        let failure = StageFailure::new(FailureKind::RateLimited, "backend throttled");
        assert_eq!(failure.to_string(), "rate_limited: backend throttled");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"service_unavailable\"");
    }
}
