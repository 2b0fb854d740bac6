//! Conversion engines - vectorize, extrude, repair.
//!
//! The built-in engines are small deterministic implementations of the trait
//! boundary; external tooling can replace any of them without touching the
//! orchestrator.

mod extrude;
mod repair;
mod trace;

pub use extrude::LatticeExtruder;
pub use repair::WeldRepairer;
pub use trace::PaletteTracer;

use async_trait::async_trait;
use thiserror::Error;

use signforge_critics::{Mesh, RasterImage, VectorImage};

use crate::config::{BuildVolume, ExtrudeConfig};
use crate::error::{FailureKind, StageFailure};

/// Classified engine failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input artifact cannot be processed: empty foreground, zero canvas,
    /// complexity over the cap. Deterministic for a given input.
    #[error("unusable input: {0}")]
    InvalidInput(String),
    /// The engine ran but could not produce an artifact within its limits.
    #[error("engine failed: {0}")]
    Failed(String),
    /// The repair engine found nothing left to fix and gave up.
    #[error("repair gave up: {0}")]
    Exhausted(String),
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::InvalidInput(_) => FailureKind::InvalidInput,
            EngineError::Failed(_) => FailureKind::ServiceUnavailable,
            EngineError::Exhausted(_) => FailureKind::RepairExhausted,
        }
    }
}

impl From<EngineError> for StageFailure {
    fn from(err: EngineError) -> Self {
        StageFailure::new(err.kind(), err.to_string())
    }
}

/// Trait for raster-to-vector tracers.
#[async_trait]
pub trait VectorizationEngine: Send + Sync {
    /// Quantize to at most `palette_size` colors and trace filled regions.
    async fn vectorize(
        &self,
        image: &RasterImage,
        palette_size: usize,
    ) -> Result<VectorImage, EngineError>;
}

/// Trait for vector-to-mesh extruders.
#[async_trait]
pub trait ExtrusionEngine: Send + Sync {
    /// Extrude the vector foreground into a candidate solid.
    async fn extrude(
        &self,
        vector: &VectorImage,
        params: &ExtrudeConfig,
        build_volume: &BuildVolume,
    ) -> Result<Mesh, EngineError>;
}

/// Trait for mesh repairers. Output is a candidate only; the mesh checkpoint
/// always re-validates it.
#[async_trait]
pub trait RepairEngine: Send + Sync {
    async fn repair(&self, mesh: &Mesh) -> Result<Mesh, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_failure_kinds() {
        assert_eq!(
            EngineError::InvalidInput("empty".into()).kind(),
            FailureKind::InvalidInput
        );
        assert_eq!(
            EngineError::Failed("budget".into()).kind(),
            FailureKind::ServiceUnavailable
        );
        assert_eq!(
            EngineError::Exhausted("clean".into()).kind(),
            FailureKind::RepairExhausted
        );
    }
}
