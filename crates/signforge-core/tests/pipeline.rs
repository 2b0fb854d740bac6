//! End-to-end pipeline scenarios against scripted collaborators.
//!
//! Every fake pops its next response from a fixed script; running out of
//! script means the orchestrator called a stage more often than the scenario
//! allows, which fails the test by panic.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use signforge_core::{
    AcceptedRun, BackendError, BuildVolume, CancellationHandle, EngineError, ExtrudeConfig,
    ExtrusionEngine, FailureKind, GeneratedImage, GenerationBackend, GenerationRequest, Pipeline,
    PipelineConfig, PipelineResult, Prompt, RejectedRun, RepairEngine, ResolvedRequest, StageKind,
    StageSet, VectorizationEngine,
};
use signforge_critics::{Mesh, RasterImage, VectorImage};

struct ScriptedBackend {
    script: Mutex<VecDeque<Result<GeneratedImage, BackendError>>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Result<GeneratedImage, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, _request: &ResolvedRequest) -> Result<GeneratedImage, BackendError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("backend called more often than scripted")
    }
}

struct ScriptedVectorizer {
    script: Mutex<VecDeque<Result<VectorImage, EngineError>>>,
}

impl ScriptedVectorizer {
    fn new(script: Vec<Result<VectorImage, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl VectorizationEngine for ScriptedVectorizer {
    async fn vectorize(
        &self,
        _image: &RasterImage,
        _palette_size: usize,
    ) -> Result<VectorImage, EngineError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("vectorizer called more often than scripted")
    }
}

struct ScriptedExtruder {
    script: Mutex<VecDeque<Result<Mesh, EngineError>>>,
}

impl ScriptedExtruder {
    fn new(script: Vec<Result<Mesh, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl ExtrusionEngine for ScriptedExtruder {
    async fn extrude(
        &self,
        _vector: &VectorImage,
        _params: &ExtrudeConfig,
        _build_volume: &BuildVolume,
    ) -> Result<Mesh, EngineError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("extruder called more often than scripted")
    }
}

struct ScriptedRepairer {
    script: Mutex<VecDeque<Result<Mesh, EngineError>>>,
}

impl ScriptedRepairer {
    fn new(script: Vec<Result<Mesh, EngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl RepairEngine for ScriptedRepairer {
    async fn repair(&self, _mesh: &Mesh) -> Result<Mesh, EngineError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("repairer called more often than scripted")
    }
}

fn generated(bytes: Vec<u8>) -> GeneratedImage {
    GeneratedImage {
        bytes,
        model: "dall-e-3".to_string(),
        revised_prompt: Some("a white sign".to_string()),
    }
}

/// Solid white at full generation resolution; passes the image checkpoint.
fn white_png() -> Vec<u8> {
    RasterImage::from_rgba(1024, 1024, vec![255; 1024 * 1024 * 4])
        .unwrap()
        .to_png_bytes()
        .unwrap()
}

/// Decodable but far below the minimum resolution.
fn small_png() -> Vec<u8> {
    RasterImage::from_rgba(64, 64, vec![255; 64 * 64 * 4])
        .unwrap()
        .to_png_bytes()
        .unwrap()
}

/// Rasterizes back to exactly the white source image: every vector metric
/// scores 1.0.
fn matching_vector() -> VectorImage {
    VectorImage {
        width: 1024,
        height: 1024,
        palette: vec![[255, 255, 255]],
        background: [255, 255, 255],
        regions: vec![],
    }
}

/// Rasterizes to solid black: structurally and chromatically unlike the
/// white source, so the vector checkpoint fails.
fn mismatched_vector() -> VectorImage {
    VectorImage {
        width: 1024,
        height: 1024,
        palette: vec![[0, 0, 0]],
        background: [0, 0, 0],
        regions: vec![],
    }
}

/// Closed unit cube: watertight, manifold, well within the build volume.
fn printable_cube() -> Mesh {
    Mesh::new(cube_vertices(), cube_faces())
}

/// The same cube with one face missing: boundary edges fail the watertight
/// hard gate.
fn leaky_cube() -> Mesh {
    let mut faces = cube_faces();
    faces.pop();
    Mesh::new(cube_vertices(), faces)
}

fn cube_vertices() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ]
}

fn cube_faces() -> Vec<[u32; 3]> {
    vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 6, 5],
        [1, 2, 6],
    ]
}

fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.root = root.to_path_buf();
    config
}

fn build_pipeline(
    root: &Path,
    backend: ScriptedBackend,
    vectorizer: ScriptedVectorizer,
    extruder: ScriptedExtruder,
    repairer: ScriptedRepairer,
) -> Pipeline {
    let stages = StageSet::new(
        Arc::new(backend),
        Arc::new(vectorizer),
        Arc::new(extruder),
        Arc::new(repairer),
    );
    Pipeline::new(test_config(root), stages).unwrap()
}

fn request() -> GenerationRequest {
    GenerationRequest::new(Prompt::new("SARAH").unwrap())
}

fn stage_sequence(result: &PipelineResult) -> Vec<StageKind> {
    result.trail().records().iter().map(|r| r.stage).collect()
}

fn expect_rejected(result: PipelineResult) -> RejectedRun {
    match result {
        PipelineResult::Rejected(run) => run,
        other => panic!("expected rejection, got {other:?}"),
    }
}

fn expect_accepted(result: PipelineResult) -> AcceptedRun {
    match result {
        PipelineResult::Accepted(run) => run,
        other => panic!("expected acceptance, got {other:?}"),
    }
}

#[tokio::test]
async fn clean_run_accepts_with_one_record_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(printable_cube())]),
        ScriptedRepairer::new(vec![]),
    );

    let result = pipeline.run(&request()).await;
    assert_eq!(
        stage_sequence(&result),
        vec![
            StageKind::Generate,
            StageKind::Vectorize,
            StageKind::Extrude,
            StageKind::MeshValidate,
        ]
    );
    assert!(result.trail().is_chronological());

    let accepted = expect_accepted(result);
    let records = accepted.trail.records();
    assert!(records.iter().all(|r| r.outcome.is_success()));

    // Checkpoints fold into their stage records; Extrude has none.
    assert_eq!(records[0].score.as_ref().unwrap().checkpoint, "image");
    assert_eq!(records[1].score.as_ref().unwrap().checkpoint, "vector");
    assert!(records[2].score.is_none());
    assert_eq!(records[3].score.as_ref().unwrap().checkpoint, "mesh");
    assert!(records.iter().flat_map(|r| r.score.as_ref()).all(|s| s.passed));

    // All three artifacts land on disk and the metadata is the full record.
    assert!(accepted.artifacts.mesh_path.exists());
    assert!(accepted.artifacts.image_path.exists());
    assert!(accepted.artifacts.metadata_path.exists());
    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&accepted.artifacts.metadata_path).unwrap())
            .unwrap();
    assert_eq!(metadata["prompt"], "SARAH");
    assert_eq!(metadata["model"], "dall-e-3");
    assert_eq!(metadata["attempts"]["records"].as_array().unwrap().len(), 4);
    assert!(metadata["checkpoints"]["vector"]["passed"].as_bool().unwrap());
}

#[tokio::test(start_paused = true)]
async fn transient_backend_failures_retry_with_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![
            Err(BackendError::Unavailable("503 from upstream".to_string())),
            Err(BackendError::RateLimited("slow down".to_string())),
            Ok(generated(white_png())),
        ]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(printable_cube())]),
        ScriptedRepairer::new(vec![]),
    );

    let started = tokio::time::Instant::now();
    let result = pipeline.run(&request()).await;
    let waited = started.elapsed();

    // 2s after the first failure, 4s after the second.
    assert!(waited >= Duration::from_secs(6), "waited {waited:?}");
    assert!(waited < Duration::from_secs(7), "waited {waited:?}");

    let accepted = expect_accepted(result);
    let generate_records: Vec<_> = accepted
        .trail
        .records()
        .iter()
        .filter(|r| r.stage == StageKind::Generate)
        .collect();
    assert_eq!(generate_records.len(), 3);
    assert_eq!(
        generate_records[0].outcome.failure().unwrap().kind,
        FailureKind::ServiceUnavailable
    );
    assert_eq!(
        generate_records[1].outcome.failure().unwrap().kind,
        FailureKind::RateLimited
    );
    assert!(generate_records[2].outcome.is_success());
    let attempts: Vec<u32> = generate_records.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_generate_budget_rejects_with_last_kind() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![
            Err(BackendError::Unavailable("down".to_string())),
            Err(BackendError::Unavailable("down".to_string())),
            Err(BackendError::Unavailable("down".to_string())),
        ]),
        ScriptedVectorizer::new(vec![]),
        ScriptedExtruder::new(vec![]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::ServiceUnavailable);
    assert!(rejected.reason.contains("gave up after 3 of 3 attempts"));
    assert_eq!(rejected.trail.count_for(StageKind::Generate), 3);
    assert_eq!(rejected.trail.len(), 3);
}

#[tokio::test]
async fn auth_failure_rejects_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Err(BackendError::Auth)]),
        ScriptedVectorizer::new(vec![]),
        ScriptedExtruder::new(vec![]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::AuthFailure);
    assert!(rejected.reason.contains("not retriable"));
    assert_eq!(rejected.trail.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bad_images_consume_the_generate_budget() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![
            Ok(generated(b"definitely not an image".to_vec())),
            Ok(generated(small_png())),
            Ok(generated(small_png())),
        ]),
        ScriptedVectorizer::new(vec![]),
        ScriptedExtruder::new(vec![]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::QualityRejected);
    assert_eq!(rejected.trail.count_for(StageKind::Generate), 3);

    // Each failed attempt still carries its checkpoint verdict.
    let records = rejected.trail.records();
    let undecodable = records[0].score.as_ref().unwrap();
    assert_eq!(undecodable.subscores["format"], 0.0);
    let too_small = records[1].score.as_ref().unwrap();
    assert_eq!(too_small.subscores["format"], 1.0);
    assert_eq!(too_small.subscores["resolution"], 0.0);
    assert!(!too_small.passed);
}

#[tokio::test]
async fn vector_quality_failure_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(mismatched_vector())]),
        ScriptedExtruder::new(vec![]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::QualityRejected);
    assert!(rejected.reason.contains("vector checkpoint failed"));

    // No second generation: the trace is deterministic, looping back would
    // only repeat the same outcome.
    assert_eq!(rejected.trail.count_for(StageKind::Generate), 1);
    assert_eq!(rejected.trail.count_for(StageKind::Vectorize), 1);
    let vector_record = rejected.trail.last().unwrap();
    let score = vector_record.score.as_ref().unwrap();
    assert!(score.overall < 0.85);
}

#[tokio::test]
async fn extrusion_failure_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Err(EngineError::Failed(
            "face budget exceeded: 2000000 > 500000".to_string(),
        ))]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::ServiceUnavailable);
    assert!(rejected.reason.contains("face budget"));
    assert_eq!(rejected.trail.count_for(StageKind::Extrude), 1);
    assert_eq!(rejected.trail.len(), 3);
}

#[tokio::test]
async fn failed_mesh_is_repaired_and_revalidated() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(leaky_cube())]),
        ScriptedRepairer::new(vec![Ok(printable_cube())]),
    );

    let result = pipeline.run(&request()).await;
    assert_eq!(
        stage_sequence(&result),
        vec![
            StageKind::Generate,
            StageKind::Vectorize,
            StageKind::Extrude,
            StageKind::MeshValidate,
            StageKind::Repair,
            StageKind::MeshValidate,
        ]
    );

    let accepted = expect_accepted(result);
    let records = accepted.trail.records();

    let first_validate = &records[3];
    let failure = first_validate.outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::MeshIntegrityFailure);
    let score = first_validate.score.as_ref().unwrap();
    assert_eq!(score.subscores["watertight"], 0.0);

    assert!(records[4].outcome.is_success());
    assert!(records[5].outcome.is_success());
    assert_eq!(records[5].attempt, 1);
}

#[tokio::test(start_paused = true)]
async fn unrepairable_mesh_exhausts_the_repair_budget() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(leaky_cube())]),
        // Every "repair" hands back a mesh with the same defect.
        ScriptedRepairer::new(vec![
            Ok(leaky_cube()),
            Ok(leaky_cube()),
            Ok(leaky_cube()),
        ]),
    );

    let started = tokio::time::Instant::now();
    let rejected = expect_rejected(pipeline.run(&request()).await);
    let waited = started.elapsed();

    assert_eq!(rejected.kind, FailureKind::RepairExhausted);
    assert!(rejected.reason.contains("3 repair attempts"));
    // Repair attempts are bounded by max_attempts, like generate attempts.
    assert_eq!(rejected.trail.count_for(StageKind::Repair), 3);
    assert_eq!(rejected.trail.count_for(StageKind::MeshValidate), 4);
    assert!(waited >= Duration::from_secs(6), "waited {waited:?}");
}

#[tokio::test]
async fn repair_engine_giving_up_rejects_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(leaky_cube())]),
        ScriptedRepairer::new(vec![Err(EngineError::Exhausted(
            "no repairable defects found".to_string(),
        ))]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::RepairExhausted);
    assert_eq!(rejected.trail.count_for(StageKind::MeshValidate), 1);
    assert_eq!(rejected.trail.count_for(StageKind::Repair), 1);
    assert!(!rejected.trail.last().unwrap().outcome.is_success());
}

#[tokio::test]
async fn storage_failure_rejects_an_otherwise_clean_run() {
    let dir = tempfile::tempdir().unwrap();
    // A plain file where the storage root should be.
    let blocked = dir.path().join("occupied");
    std::fs::write(&blocked, b"in the way").unwrap();

    let pipeline = build_pipeline(
        &blocked,
        ScriptedBackend::new(vec![Ok(generated(white_png()))]),
        ScriptedVectorizer::new(vec![Ok(matching_vector())]),
        ScriptedExtruder::new(vec![Ok(printable_cube())]),
        ScriptedRepairer::new(vec![]),
    );

    let rejected = expect_rejected(pipeline.run(&request()).await);
    assert_eq!(rejected.kind, FailureKind::StorageFailure);
    // The run itself completed every stage before persistence failed.
    assert_eq!(rejected.trail.len(), 4);
}

#[tokio::test]
async fn cancellation_mid_run_keeps_the_partial_trail() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationHandle::new();

    // Backend cancels the run as a side effect; the next transition stops.
    struct CancellingBackend {
        cancel: CancellationHandle,
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl GenerationBackend for CancellingBackend {
        async fn generate(
            &self,
            _request: &ResolvedRequest,
        ) -> Result<GeneratedImage, BackendError> {
            self.cancel.cancel();
            Ok(generated(self.bytes.clone()))
        }
    }

    let stages = StageSet::new(
        Arc::new(CancellingBackend {
            cancel: cancel.clone(),
            bytes: white_png(),
        }),
        Arc::new(ScriptedVectorizer::new(vec![])),
        Arc::new(ScriptedExtruder::new(vec![])),
        Arc::new(ScriptedRepairer::new(vec![])),
    );
    let pipeline = Pipeline::new(test_config(dir.path()), stages).unwrap();

    let result = pipeline.run_with_cancellation(&request(), &cancel).await;
    let cancelled = match result {
        PipelineResult::Cancelled(run) => run,
        other => panic!("expected cancellation, got {other:?}"),
    };
    // The in-flight generate ran to completion and was recorded; nothing
    // after it started.
    assert_eq!(cancelled.trail.len(), 1);
    assert_eq!(cancelled.trail.records()[0].stage, StageKind::Generate);
    assert!(cancelled.trail.records()[0].outcome.is_success());
}

#[tokio::test]
async fn cancellation_before_start_produces_an_empty_trail() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = build_pipeline(
        dir.path(),
        ScriptedBackend::new(vec![]),
        ScriptedVectorizer::new(vec![]),
        ScriptedExtruder::new(vec![]),
        ScriptedRepairer::new(vec![]),
    );

    let cancel = CancellationHandle::new();
    cancel.cancel();
    let result = pipeline.run_with_cancellation(&request(), &cancel).await;
    assert!(matches!(result, PipelineResult::Cancelled(_)));
    assert!(result.trail().is_empty());
}
