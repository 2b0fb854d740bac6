//! Stage executors: one collaborator call each, normalized outcomes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use signforge_critics::{
    color_fidelity, edge_overlap, ssim, Mesh, MeshReport, MetricError, RasterImage, VectorImage,
};

use crate::backend::{GeneratedImage, GenerationBackend};
use crate::config::{BuildVolume, ExtrudeConfig};
use crate::engines::{ExtrusionEngine, RepairEngine, VectorizationEngine};
use crate::error::{FailureKind, StageFailure};
use crate::model::ResolvedRequest;

/// Smallest acceptable generated-image dimension; every supported request
/// size is at least this on both axes.
pub const MIN_IMAGE_DIMENSION: u32 = 1024;

/// Sub-score names each checkpoint builder can produce. Gate weight tables
/// may only reference these.
pub const IMAGE_METRICS: &[&str] = &["format", "resolution"];
pub const VECTOR_METRICS: &[&str] = &["ssim", "edge_iou", "color"];
pub const MESH_METRICS: &[&str] = &["watertight", "manifold", "fits_volume"];

/// Wall-clock bracket around one executor invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageTiming {
    pub fn elapsed_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

fn bracket(started_at: DateTime<Utc>) -> StageTiming {
    StageTiming {
        started_at,
        finished_at: Utc::now(),
    }
}

/// The collaborators behind the stage executors.
///
/// Executors never retry internally and never swallow failures: every
/// outcome is classified into a [`StageFailure`] and returned together with
/// its timing so the orchestrator can append an attempt record either way.
pub struct StageSet {
    backend: Arc<dyn GenerationBackend>,
    vectorizer: Arc<dyn VectorizationEngine>,
    extruder: Arc<dyn ExtrusionEngine>,
    repairer: Arc<dyn RepairEngine>,
}

impl StageSet {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        vectorizer: Arc<dyn VectorizationEngine>,
        extruder: Arc<dyn ExtrusionEngine>,
        repairer: Arc<dyn RepairEngine>,
    ) -> Self {
        Self {
            backend,
            vectorizer,
            extruder,
            repairer,
        }
    }

    pub async fn generate(
        &self,
        request: &ResolvedRequest,
    ) -> (StageTiming, Result<GeneratedImage, StageFailure>) {
        let started_at = Utc::now();
        let result = self
            .backend
            .generate(request)
            .await
            .map_err(StageFailure::from);
        (bracket(started_at), result)
    }

    pub async fn vectorize(
        &self,
        image: &RasterImage,
        palette_size: usize,
    ) -> (StageTiming, Result<VectorImage, StageFailure>) {
        let started_at = Utc::now();
        let result = self
            .vectorizer
            .vectorize(image, palette_size)
            .await
            .map_err(StageFailure::from);
        (bracket(started_at), result)
    }

    pub async fn extrude(
        &self,
        vector: &VectorImage,
        params: &ExtrudeConfig,
        build_volume: &BuildVolume,
    ) -> (StageTiming, Result<Mesh, StageFailure>) {
        let started_at = Utc::now();
        let result = self
            .extruder
            .extrude(vector, params, build_volume)
            .await
            .map_err(StageFailure::from);
        (bracket(started_at), result)
    }

    /// Mesh validation is local computation; it is timed like any other
    /// stage but cannot fail.
    pub fn validate_mesh(
        &self,
        mesh: &Mesh,
        build_volume: &BuildVolume,
    ) -> (StageTiming, MeshReport) {
        let started_at = Utc::now();
        let report = mesh.inspect(build_volume.as_mm());
        (bracket(started_at), report)
    }

    pub async fn repair(&self, mesh: &Mesh) -> (StageTiming, Result<Mesh, StageFailure>) {
        let started_at = Utc::now();
        let result = self.repairer.repair(mesh).await.map_err(StageFailure::from);
        (bracket(started_at), result)
    }
}

/// A metric error inside a checkpoint is the calling stage's `InvalidInput`.
fn metric_failure(err: MetricError) -> StageFailure {
    StageFailure::new(FailureKind::InvalidInput, err.to_string())
}

/// Image checkpoint sub-scores: format and resolution, both binary.
///
/// Undecodable bytes score zero on both rather than failing the stage, so
/// the verdict is a regular quality rejection and the retry budget applies.
pub fn image_subscores(bytes: &[u8]) -> (BTreeMap<String, f32>, Option<RasterImage>) {
    let mut scores = BTreeMap::new();
    match RasterImage::from_bytes(bytes) {
        Ok(image) => {
            let resolution_ok =
                image.width() >= MIN_IMAGE_DIMENSION && image.height() >= MIN_IMAGE_DIMENSION;
            scores.insert("format".to_string(), 1.0);
            scores.insert(
                "resolution".to_string(),
                if resolution_ok { 1.0 } else { 0.0 },
            );
            (scores, Some(image))
        }
        Err(err) => {
            tracing::debug!(error = %err, "generated bytes failed to decode");
            scores.insert("format".to_string(), 0.0);
            scores.insert("resolution".to_string(), 0.0);
            (scores, None)
        }
    }
}

/// Vector checkpoint sub-scores: the vector output rasterized back and
/// compared against the originating raster.
pub fn vector_subscores(
    original: &RasterImage,
    vector: &VectorImage,
    palette_size: usize,
) -> Result<BTreeMap<String, f32>, StageFailure> {
    let rendered = vector.rasterize();
    let mut scores = BTreeMap::new();
    scores.insert(
        "ssim".to_string(),
        ssim(original, &rendered).map_err(metric_failure)?,
    );
    scores.insert(
        "edge_iou".to_string(),
        edge_overlap(original, &rendered).map_err(metric_failure)?,
    );
    scores.insert(
        "color".to_string(),
        color_fidelity(original, &rendered, palette_size).map_err(metric_failure)?,
    );
    Ok(scores)
}

/// Mesh checkpoint sub-scores: binary integrity gates from the report.
pub fn mesh_subscores(report: &MeshReport) -> BTreeMap<String, f32> {
    let mut scores = BTreeMap::new();
    scores.insert("watertight".to_string(), f32::from(report.watertight));
    scores.insert("manifold".to_string(), f32::from(report.manifold));
    scores.insert("fits_volume".to_string(), f32::from(report.fits_volume));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use signforge_critics::{Region, Span};

    fn solid_png(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[250, 250, 250, 255]);
        }
        RasterImage::from_rgba(width, height, data)
            .unwrap()
            .to_png_bytes()
            .unwrap()
    }

    #[test]
    fn image_subscores_pass_for_a_large_png() {
        let (scores, image) = image_subscores(&solid_png(1024, 1024));
        assert_eq!(scores["format"], 1.0);
        assert_eq!(scores["resolution"], 1.0);
        assert!(image.is_some());
    }

    #[test]
    fn image_subscores_fail_resolution_for_small_images() {
        let (scores, image) = image_subscores(&solid_png(64, 64));
        assert_eq!(scores["format"], 1.0);
        assert_eq!(scores["resolution"], 0.0);
        assert!(image.is_some());
    }

    #[test]
    fn image_subscores_zero_for_undecodable_bytes() {
        let (scores, image) = image_subscores(b"not an image at all");
        assert_eq!(scores["format"], 0.0);
        assert_eq!(scores["resolution"], 0.0);
        assert!(image.is_none());
    }

    #[test]
    fn vector_subscores_are_perfect_for_an_exact_trace() {
        // A vector whose rasterization reproduces the original exactly.
        let vector = VectorImage {
            width: 32,
            height: 32,
            palette: vec![[0, 0, 0], [255, 255, 255]],
            background: [255, 255, 255],
            regions: vec![Region {
                color: [0, 0, 0],
                spans: (8..24).map(|y| Span { y, x0: 8, x1: 24 }).collect(),
            }],
        };
        let original = vector.rasterize();
        let scores = vector_subscores(&original, &vector, 8).unwrap();
        assert!((scores["ssim"] - 1.0).abs() < 1e-6);
        assert!((scores["edge_iou"] - 1.0).abs() < 1e-6);
        assert!((scores["color"] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mesh_subscores_mirror_the_report_flags() {
        let report = MeshReport {
            watertight: true,
            manifold: false,
            fits_volume: true,
            dimensions: [10.0, 10.0, 5.0],
            vertex_count: 8,
            face_count: 12,
            boundary_edges: 0,
            nonmanifold_edges: 2,
            degenerate_faces: 0,
            surface_area: 400.0,
            volume: 500.0,
        };
        let scores = mesh_subscores(&report);
        assert_eq!(scores["watertight"], 1.0);
        assert_eq!(scores["manifold"], 0.0);
        assert_eq!(scores["fits_volume"], 1.0);
    }
}
