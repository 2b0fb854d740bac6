//! signforge-core - Quality-gated pipeline turning a text prompt into a
//! printable sign mesh.
//!
//! The pipeline runs Generate → Vectorize → Extrude → MeshValidate with a
//! quality checkpoint behind each producing stage and a bounded repair loop
//! behind the mesh checkpoint:
//! - **Model**: validated [`Prompt`] text and [`GenerationRequest`]
//!   resolution against configured defaults
//! - **Backend**: the [`GenerationBackend`] trait plus the HTTP adapter for
//!   an OpenAI-style images endpoint; credentials live in an opaque
//!   [`ApiKey`] that never serializes or prints
//! - **Engines**: [`VectorizationEngine`] / [`ExtrusionEngine`] /
//!   [`RepairEngine`] traits with reference implementations (palette tracer,
//!   lattice extruder, weld repairer)
//! - **Orchestrator**: the [`Pipeline`] state machine, one shared
//!   [`RetryPolicy`] for the generate and repair loops, an append-only
//!   [`AuditTrail`], and artifact persistence for accepted runs
//!
//! Scoring and gate logic live in `signforge-critics`; this crate decides
//! what to do with the verdicts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signforge_core::{
//!     ApiKey, GenerationRequest, HttpGenerationBackend, LatticeExtruder, PaletteTracer,
//!     Pipeline, PipelineConfig, Prompt, StageSet, WeldRepairer,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let backend = HttpGenerationBackend::new(&config.backend, ApiKey::new("sk-..."))?;
//! let stages = StageSet::new(
//!     Arc::new(backend),
//!     Arc::new(PaletteTracer::default()),
//!     Arc::new(LatticeExtruder),
//!     Arc::new(WeldRepairer),
//! );
//! let pipeline = Pipeline::new(config, stages)?;
//!
//! let request = GenerationRequest::new(Prompt::new("SARAH")?);
//! let result = pipeline.run(&request).await;
//! println!("accepted: {}", result.is_accepted());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod engines;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod storage;

// Re-export commonly used types
pub use audit::{AttemptOutcome, AttemptRecord, AuditTrail, StageKind};
pub use backend::{BackendError, GeneratedImage, GenerationBackend, HttpGenerationBackend};
pub use config::{
    BackendConfig, BuildVolume, ConfigError, ExtrudeConfig, GatesConfig, PipelineConfig,
    RetryConfig, StorageConfig, VectorizeConfig,
};
pub use credentials::ApiKey;
pub use engines::{
    EngineError, ExtrusionEngine, LatticeExtruder, PaletteTracer, RepairEngine,
    VectorizationEngine, WeldRepairer,
};
pub use error::{FailureKind, StageFailure};
pub use model::{
    GenerationRequest, ImageSize, Prompt, PromptError, QualityTier, RequestDefaults,
    ResolvedRequest, Style,
};
pub use orchestrator::{
    AcceptedRun, ArtifactNames, CancellationHandle, CancelledRun, Pipeline, PipelineResult,
    RejectedRun, RunMetadata,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use stages::StageSet;
pub use storage::{ArtifactStore, StoredArtifacts};
