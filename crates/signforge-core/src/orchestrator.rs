//! Pipeline orchestrator: the checkpoint-gated state machine.
//!
//! One run walks Generate → image checkpoint → Vectorize → vector checkpoint
//! → Extrude → MeshValidate, with a bounded repair loop behind the mesh
//! checkpoint. The orchestrator is the only place retry decisions are made;
//! stage executors and gates never loop on their own.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use signforge_critics::{
    GateConfig, GateError, Mesh, QualityGate, QualityScore, RasterImage, VectorImage,
};

use crate::audit::{AttemptOutcome, AttemptRecord, AuditTrail, StageKind};
use crate::backend::GeneratedImage;
use crate::config::{ConfigError, PipelineConfig};
use crate::error::{FailureKind, StageFailure};
use crate::model::{GenerationRequest, ResolvedRequest};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::stages::{self, StageSet, StageTiming};
use crate::storage::{ArtifactStore, StoredArtifacts};

const IMAGE_CHECKPOINT: &str = "image";
const VECTOR_CHECKPOINT: &str = "vector";
const MESH_CHECKPOINT: &str = "mesh";

/// Cooperative cancellation flag, shared with whoever may need to stop the
/// run. Checked at every state transition, never mid external call.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// File names the metadata record advertises, relative to the storage root.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactNames {
    pub mesh: String,
    pub image: String,
    pub metadata: String,
}

/// The JSON record written next to an accepted run's artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub prompt: String,
    pub request: ResolvedRequest,
    pub model: String,
    pub revised_prompt: Option<String>,
    pub checkpoints: BTreeMap<String, QualityScore>,
    pub total_elapsed_ms: u64,
    pub artifacts: ArtifactNames,
    pub attempts: AuditTrail,
}

/// Terminal success: the printable mesh plus everything written to disk.
#[derive(Debug)]
pub struct AcceptedRun {
    pub run_id: Uuid,
    pub mesh: Mesh,
    pub artifacts: StoredArtifacts,
    pub metadata: RunMetadata,
    pub trail: AuditTrail,
}

/// Terminal failure with the classification and a human-readable reason.
#[derive(Debug)]
pub struct RejectedRun {
    pub run_id: Uuid,
    pub kind: FailureKind,
    pub reason: String,
    pub trail: AuditTrail,
}

/// External cancellation; the trail covers whatever had run by then.
#[derive(Debug)]
pub struct CancelledRun {
    pub run_id: Uuid,
    pub trail: AuditTrail,
}

/// How a run ended. Every variant carries the full audit trail.
#[derive(Debug)]
pub enum PipelineResult {
    Accepted(AcceptedRun),
    Rejected(RejectedRun),
    Cancelled(CancelledRun),
}

impl PipelineResult {
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineResult::Accepted(run) => run.run_id,
            PipelineResult::Rejected(run) => run.run_id,
            PipelineResult::Cancelled(run) => run.run_id,
        }
    }

    pub fn trail(&self) -> &AuditTrail {
        match self {
            PipelineResult::Accepted(run) => &run.trail,
            PipelineResult::Rejected(run) => &run.trail,
            PipelineResult::Cancelled(run) => &run.trail,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PipelineResult::Accepted(_))
    }
}

/// Non-success exits bubbled up through the stage drivers.
enum Halt {
    Rejected { kind: FailureKind, reason: String },
    Cancelled,
}

impl Halt {
    fn rejected(failure: &StageFailure) -> Self {
        Halt::Rejected {
            kind: failure.kind,
            reason: failure.reason.clone(),
        }
    }
}

/// Mutable per-run bookkeeping: the trail and the latest checkpoint scores.
struct RunState {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    trail: AuditTrail,
    checkpoints: BTreeMap<String, QualityScore>,
}

impl RunState {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            trail: AuditTrail::new(),
            checkpoints: BTreeMap::new(),
        }
    }

    fn success(
        &mut self,
        stage: StageKind,
        attempt: u32,
        timing: StageTiming,
        score: Option<QualityScore>,
    ) {
        self.append(stage, attempt, timing, AttemptOutcome::Succeeded, score);
    }

    fn failure(
        &mut self,
        stage: StageKind,
        attempt: u32,
        timing: StageTiming,
        failure: StageFailure,
        score: Option<QualityScore>,
    ) {
        self.append(
            stage,
            attempt,
            timing,
            AttemptOutcome::Failed { failure },
            score,
        );
    }

    fn append(
        &mut self,
        stage: StageKind,
        attempt: u32,
        timing: StageTiming,
        outcome: AttemptOutcome,
        score: Option<QualityScore>,
    ) {
        self.trail.append(AttemptRecord {
            stage,
            attempt,
            started_at: timing.started_at,
            finished_at: timing.finished_at,
            elapsed_ms: timing.elapsed_ms(),
            outcome,
            score,
        });
    }
}

fn ensure_live(cancel: &CancellationHandle) -> Result<(), Halt> {
    if cancel.is_cancelled() {
        Err(Halt::Cancelled)
    } else {
        Ok(())
    }
}

/// Checkpoint evaluation happens after the executor returns; stretch the
/// record's bracket so the folded checkpoint's cost is accounted to the
/// stage it belongs to.
fn extend_to_now(timing: StageTiming) -> StageTiming {
    StageTiming {
        started_at: timing.started_at,
        finished_at: Utc::now(),
    }
}

fn checkpoint_failure(checkpoint: &str, score: &QualityScore) -> String {
    format!("{checkpoint} checkpoint failed: {}", score.fail_codes.join(", "))
}

/// The pipeline: configuration, collaborators, gates, retry policy, and
/// storage, assembled once and reused across runs.
///
/// `run` borrows `&self` only, so one `Pipeline` can drive any number of
/// concurrent runs; each run owns its artifacts and trail exclusively.
pub struct Pipeline {
    config: PipelineConfig,
    stages: StageSet,
    image_gate: QualityGate,
    vector_gate: QualityGate,
    mesh_gate: QualityGate,
    policy: RetryPolicy,
    store: ArtifactStore,
}

impl Pipeline {
    /// Assemble a pipeline, rejecting inconsistent configuration up front.
    pub fn new(config: PipelineConfig, stages: StageSet) -> Result<Self, ConfigError> {
        config.validate()?;
        let image_gate =
            checked_gate(&config.gates.image, IMAGE_CHECKPOINT, stages::IMAGE_METRICS)?;
        let vector_gate =
            checked_gate(&config.gates.vector, VECTOR_CHECKPOINT, stages::VECTOR_METRICS)?;
        let mesh_gate = checked_gate(&config.gates.mesh, MESH_CHECKPOINT, stages::MESH_METRICS)?;
        let policy = RetryPolicy::new(config.retry);
        let store = ArtifactStore::new(&config.storage);
        Ok(Self {
            config,
            stages,
            image_gate,
            vector_gate,
            mesh_gate,
            policy,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run to completion without external cancellation.
    pub async fn run(&self, request: &GenerationRequest) -> PipelineResult {
        self.run_with_cancellation(request, &CancellationHandle::new())
            .await
    }

    /// Run to a terminal result, checking `cancel` at every state
    /// transition.
    pub async fn run_with_cancellation(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationHandle,
    ) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let resolved = request.resolve(&self.config.defaults);
        let mut state = RunState::new(run_id);
        tracing::info!(
            run_id = %run_id,
            prompt = %resolved.prompt,
            size = resolved.size.as_str(),
            quality = resolved.quality.as_str(),
            "run started"
        );

        match self.drive(&mut state, &resolved, cancel).await {
            Ok(accepted) => PipelineResult::Accepted(accepted),
            Err(Halt::Cancelled) => {
                tracing::info!(run_id = %run_id, records = state.trail.len(), "run cancelled");
                PipelineResult::Cancelled(CancelledRun {
                    run_id,
                    trail: state.trail,
                })
            }
            Err(Halt::Rejected { kind, reason }) => {
                tracing::warn!(run_id = %run_id, kind = %kind, reason = %reason, "run rejected");
                PipelineResult::Rejected(RejectedRun {
                    run_id,
                    kind,
                    reason,
                    trail: state.trail,
                })
            }
        }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        resolved: &ResolvedRequest,
        cancel: &CancellationHandle,
    ) -> Result<AcceptedRun, Halt> {
        let (raster, generated) = self.generate_stage(state, resolved, cancel).await?;
        let vector = self.vectorize_stage(state, &raster, cancel).await?;
        let mesh = self.extrude_stage(state, &vector, cancel).await?;
        let mesh = self.mesh_stage(state, mesh, cancel).await?;
        self.accept(state, resolved, &generated, &raster, mesh, cancel)
    }

    /// Generate ↔ image-checkpoint loop. Transient backend failures and
    /// image-quality rejections share one attempt counter.
    async fn generate_stage(
        &self,
        state: &mut RunState,
        resolved: &ResolvedRequest,
        cancel: &CancellationHandle,
    ) -> Result<(RasterImage, GeneratedImage), Halt> {
        let mut attempt: u32 = 0;
        loop {
            ensure_live(cancel)?;
            let (timing, outcome) = self.stages.generate(resolved).await;
            let failure = match outcome {
                Ok(image) => {
                    let (subscores, decoded) = stages::image_subscores(&image.bytes);
                    let score = self.verdict(
                        state,
                        StageKind::Generate,
                        attempt,
                        timing,
                        IMAGE_CHECKPOINT,
                        subscores,
                    )?;
                    let timing = extend_to_now(timing);
                    state
                        .checkpoints
                        .insert(IMAGE_CHECKPOINT.to_string(), score.clone());
                    match decoded {
                        Some(raster) if score.passed => {
                            state.success(StageKind::Generate, attempt, timing, Some(score));
                            tracing::info!(
                                run_id = %state.run_id,
                                attempt,
                                "image passed checkpoint"
                            );
                            return Ok((raster, image));
                        }
                        _ => {
                            let failure = StageFailure::quality_rejected(checkpoint_failure(
                                IMAGE_CHECKPOINT,
                                &score,
                            ));
                            state.failure(
                                StageKind::Generate,
                                attempt,
                                timing,
                                failure.clone(),
                                Some(score),
                            );
                            failure
                        }
                    }
                }
                Err(failure) => {
                    state.failure(StageKind::Generate, attempt, timing, failure.clone(), None);
                    failure
                }
            };

            match self.policy.decide(attempt, failure.kind) {
                RetryDecision::Retry { after } => {
                    tracing::warn!(
                        run_id = %state.run_id,
                        attempt,
                        kind = %failure.kind,
                        delay_ms = after.as_millis() as u64,
                        "generate attempt failed, backing off"
                    );
                    tokio::time::sleep(after).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp { reason } => {
                    return Err(Halt::Rejected {
                        kind: failure.kind,
                        reason: format!("{reason}: {}", failure.reason),
                    });
                }
            }
        }
    }

    /// Vectorize plus the vector-quality checkpoint. A quality failure here
    /// is terminal: the trace is deterministic, so the same raster can only
    /// produce the same vector again.
    async fn vectorize_stage(
        &self,
        state: &mut RunState,
        raster: &RasterImage,
        cancel: &CancellationHandle,
    ) -> Result<VectorImage, Halt> {
        ensure_live(cancel)?;
        let palette_size = self.config.vectorize.palette_size;
        let (timing, outcome) = self.stages.vectorize(raster, palette_size).await;
        let vector = match outcome {
            Ok(vector) => vector,
            Err(failure) => {
                state.failure(StageKind::Vectorize, 0, timing, failure.clone(), None);
                return Err(Halt::rejected(&failure));
            }
        };

        let subscores = match stages::vector_subscores(raster, &vector, palette_size) {
            Ok(subscores) => subscores,
            Err(failure) => {
                state.failure(
                    StageKind::Vectorize,
                    0,
                    extend_to_now(timing),
                    failure.clone(),
                    None,
                );
                return Err(Halt::rejected(&failure));
            }
        };
        let score = self.verdict(
            state,
            StageKind::Vectorize,
            0,
            timing,
            VECTOR_CHECKPOINT,
            subscores,
        )?;
        let timing = extend_to_now(timing);
        state
            .checkpoints
            .insert(VECTOR_CHECKPOINT.to_string(), score.clone());

        if score.passed {
            tracing::info!(
                run_id = %state.run_id,
                regions = vector.region_count(),
                overall = score.overall,
                "vector passed checkpoint"
            );
            state.success(StageKind::Vectorize, 0, timing, Some(score));
            Ok(vector)
        } else {
            let failure =
                StageFailure::quality_rejected(checkpoint_failure(VECTOR_CHECKPOINT, &score));
            state.failure(StageKind::Vectorize, 0, timing, failure.clone(), Some(score));
            Err(Halt::rejected(&failure))
        }
    }

    async fn extrude_stage(
        &self,
        state: &mut RunState,
        vector: &VectorImage,
        cancel: &CancellationHandle,
    ) -> Result<Mesh, Halt> {
        ensure_live(cancel)?;
        let (timing, outcome) = self
            .stages
            .extrude(vector, &self.config.extrude, &self.config.build_volume)
            .await;
        match outcome {
            Ok(mesh) => {
                state.success(StageKind::Extrude, 0, timing, None);
                Ok(mesh)
            }
            Err(failure) => {
                state.failure(StageKind::Extrude, 0, timing, failure.clone(), None);
                Err(Halt::rejected(&failure))
            }
        }
    }

    /// MeshValidate ↔ Repair loop. The first integrity failure goes straight
    /// to repair; after that the retry policy is consulted with the 0-based
    /// index of the repair whose re-validation just failed.
    async fn mesh_stage(
        &self,
        state: &mut RunState,
        mut mesh: Mesh,
        cancel: &CancellationHandle,
    ) -> Result<Mesh, Halt> {
        let mut validations: u32 = 0;
        let mut repairs: u32 = 0;
        loop {
            ensure_live(cancel)?;
            let (timing, report) = self.stages.validate_mesh(&mesh, &self.config.build_volume);
            let subscores = stages::mesh_subscores(&report);
            let score = self.verdict(
                state,
                StageKind::MeshValidate,
                validations,
                timing,
                MESH_CHECKPOINT,
                subscores,
            )?;
            let timing = extend_to_now(timing);
            state
                .checkpoints
                .insert(MESH_CHECKPOINT.to_string(), score.clone());

            if score.passed {
                tracing::info!(
                    run_id = %state.run_id,
                    faces = report.face_count,
                    repairs,
                    "mesh passed checkpoint"
                );
                state.success(StageKind::MeshValidate, validations, timing, Some(score));
                return Ok(mesh);
            }

            let failure = StageFailure::new(
                FailureKind::MeshIntegrityFailure,
                checkpoint_failure(MESH_CHECKPOINT, &score),
            );
            state.failure(
                StageKind::MeshValidate,
                validations,
                timing,
                failure.clone(),
                Some(score),
            );
            validations += 1;

            // The first failure is pre-repair; the policy only bounds
            // repair -> re-validation cycles.
            if repairs > 0 {
                match self.policy.decide(repairs - 1, FailureKind::MeshIntegrityFailure) {
                    RetryDecision::Retry { after } => {
                        tracing::warn!(
                            run_id = %state.run_id,
                            repairs,
                            delay_ms = after.as_millis() as u64,
                            "repaired mesh still fails integrity, backing off"
                        );
                        tokio::time::sleep(after).await;
                    }
                    RetryDecision::GiveUp { .. } => {
                        return Err(Halt::Rejected {
                            kind: FailureKind::RepairExhausted,
                            reason: format!(
                                "mesh still fails integrity after {repairs} repair attempts: {}",
                                failure.reason
                            ),
                        });
                    }
                }
            }

            ensure_live(cancel)?;
            let (timing, outcome) = self.stages.repair(&mesh).await;
            match outcome {
                Ok(candidate) => {
                    state.success(StageKind::Repair, repairs, timing, None);
                    mesh = candidate;
                    repairs += 1;
                }
                Err(failure) => {
                    state.failure(StageKind::Repair, repairs, timing, failure.clone(), None);
                    return Err(Halt::rejected(&failure));
                }
            }
        }
    }

    /// Persist artifacts and assemble the accepted result.
    fn accept(
        &self,
        state: &mut RunState,
        resolved: &ResolvedRequest,
        generated: &GeneratedImage,
        raster: &RasterImage,
        mesh: Mesh,
        cancel: &CancellationHandle,
    ) -> Result<AcceptedRun, Halt> {
        ensure_live(cancel)?;
        let total_elapsed_ms = (Utc::now() - state.started_at).num_milliseconds().max(0) as u64;
        let planned = self.store.plan(state.run_id, &resolved.prompt, Utc::now());
        let metadata = RunMetadata {
            run_id: state.run_id,
            prompt: resolved.prompt.to_string(),
            request: resolved.clone(),
            model: generated.model.clone(),
            revised_prompt: generated.revised_prompt.clone(),
            checkpoints: state.checkpoints.clone(),
            total_elapsed_ms,
            artifacts: ArtifactNames {
                mesh: planned.mesh_file_name(),
                image: planned.image_file_name(),
                metadata: planned.metadata_file_name(),
            },
            attempts: state.trail.clone(),
        };

        if let Err(failure) = self.store.persist(&planned, &mesh, raster, &metadata) {
            return Err(Halt::rejected(&failure));
        }

        tracing::info!(
            run_id = %state.run_id,
            stem = %planned.stem,
            total_elapsed_ms,
            "run accepted"
        );
        Ok(AcceptedRun {
            run_id: state.run_id,
            mesh,
            artifacts: planned,
            metadata,
            trail: std::mem::take(&mut state.trail),
        })
    }

    /// Gate evaluation; an error here means the gate asked for a sub-score
    /// the checkpoint builder cannot produce, which construction already
    /// rules out.
    fn verdict(
        &self,
        state: &mut RunState,
        stage: StageKind,
        attempt: u32,
        timing: StageTiming,
        checkpoint: &str,
        subscores: BTreeMap<String, f32>,
    ) -> Result<QualityScore, Halt> {
        let gate = match checkpoint {
            IMAGE_CHECKPOINT => &self.image_gate,
            VECTOR_CHECKPOINT => &self.vector_gate,
            _ => &self.mesh_gate,
        };
        gate.evaluate(checkpoint, subscores).map_err(|err| {
            let failure =
                StageFailure::invalid_input(format!("{checkpoint} gate evaluation: {err}"));
            state.failure(stage, attempt, extend_to_now(timing), failure.clone(), None);
            Halt::rejected(&failure)
        })
    }
}

/// Build one gate, additionally rejecting weight tables or hard-gate sets
/// that name metrics the matching checkpoint builder never emits.
fn checked_gate(
    config: &GateConfig,
    checkpoint: &'static str,
    known: &[&str],
) -> Result<QualityGate, ConfigError> {
    for name in config.weights.keys().chain(config.hard_gates.iter()) {
        if !known.contains(&name.as_str()) {
            return Err(ConfigError::Gate {
                checkpoint,
                source: GateError::MissingMetric(name.clone()),
            });
        }
    }
    QualityGate::new(config.clone()).map_err(|source| ConfigError::Gate { checkpoint, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_handle_is_sticky_and_shared() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn unknown_gate_metric_is_a_construction_error() {
        let mut config = PipelineConfig::default();
        config
            .gates
            .image
            .weights
            .insert("sharpness".to_string(), 0.0);
        let err = checked_gate(&config.gates.image, "image", stages::IMAGE_METRICS).unwrap_err();
        assert!(matches!(err, ConfigError::Gate { checkpoint: "image", .. }));
    }

    #[test]
    fn default_gates_pass_the_known_metric_check() {
        let config = PipelineConfig::default();
        assert!(checked_gate(&config.gates.image, "image", stages::IMAGE_METRICS).is_ok());
        assert!(checked_gate(&config.gates.vector, "vector", stages::VECTOR_METRICS).is_ok());
        assert!(checked_gate(&config.gates.mesh, "mesh", stages::MESH_METRICS).is_ok());
    }
}
