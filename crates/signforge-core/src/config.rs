//! Pipeline configuration loading and validation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use signforge_critics::{GateConfig, GateError};

use crate::model::RequestDefaults;

/// Full pipeline configuration, loaded from signforge.yaml.
///
/// Constructed once and passed into the pipeline; nothing reads ambient
/// state after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generation backend endpoint
    #[serde(default)]
    pub backend: BackendConfig,

    /// Defaults applied to unresolved requests
    #[serde(default)]
    pub defaults: RequestDefaults,

    /// Per-checkpoint quality gates
    #[serde(default)]
    pub gates: GatesConfig,

    /// Retry policy parameters
    #[serde(default)]
    pub retry: RetryConfig,

    /// Vectorization parameters
    #[serde(default)]
    pub vectorize: VectorizeConfig,

    /// Extrusion parameters
    #[serde(default)]
    pub extrude: ExtrudeConfig,

    /// Printer build volume
    #[serde(default)]
    pub build_volume: BuildVolume,

    /// Artifact storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Generation backend endpoint configuration. The API key is deliberately
/// not part of this struct so it can never end up in a config file dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout for the generation call and the image download
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "dall-e-3".to_string()
}
fn default_timeout_seconds() -> f64 {
    120.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// One gate per validation checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "GateConfig::image_default")]
    pub image: GateConfig,

    #[serde(default = "GateConfig::vector_default")]
    pub vector: GateConfig,

    #[serde(default = "GateConfig::mesh_default")]
    pub mesh: GateConfig,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            image: GateConfig::image_default(),
            vector: GateConfig::vector_default(),
            mesh: GateConfig::mesh_default(),
        }
    }
}

/// Retry policy parameters shared by the generate and repair loops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_seconds")]
    pub base_delay_seconds: f64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_seconds() -> f64 {
    2.0
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay_seconds(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Vectorization engine parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VectorizeConfig {
    /// Palette size for color quantization
    #[serde(default = "default_palette_size")]
    pub palette_size: usize,

    /// Complexity cap: reject traces with more connected shapes than this
    #[serde(default = "default_max_regions")]
    pub max_regions: usize,
}

fn default_palette_size() -> usize {
    8
}
fn default_max_regions() -> usize {
    1000
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            palette_size: default_palette_size(),
            max_regions: default_max_regions(),
        }
    }
}

/// Extrusion engine parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtrudeConfig {
    /// Extrusion depth in millimeters, clamped to [2, 10] at the engine
    #[serde(default = "default_depth_mm")]
    pub depth_mm: f32,

    /// Target footprint width of the printed sign
    #[serde(default = "default_target_width_mm")]
    pub target_width_mm: f32,

    /// Occupancy lattice resolution the silhouette is sampled onto
    #[serde(default = "default_lattice_resolution")]
    pub lattice_resolution: u32,

    /// Log a warning above this face count
    #[serde(default = "default_warn_faces")]
    pub warn_faces: usize,

    /// Reject meshes above this face count
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
}

fn default_depth_mm() -> f32 {
    5.0
}
fn default_target_width_mm() -> f32 {
    100.0
}
fn default_lattice_resolution() -> u32 {
    192
}
fn default_warn_faces() -> usize {
    50_000
}
fn default_max_faces() -> usize {
    100_000
}

impl Default for ExtrudeConfig {
    fn default() -> Self {
        Self {
            depth_mm: default_depth_mm(),
            target_width_mm: default_target_width_mm(),
            lattice_resolution: default_lattice_resolution(),
            warn_faces: default_warn_faces(),
            max_faces: default_max_faces(),
        }
    }
}

/// Printer build volume in millimeters per axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildVolume {
    #[serde(default = "default_build_axis_mm")]
    pub x_mm: f32,
    #[serde(default = "default_build_axis_mm")]
    pub y_mm: f32,
    #[serde(default = "default_build_axis_mm")]
    pub z_mm: f32,
}

fn default_build_axis_mm() -> f32 {
    256.0
}

impl BuildVolume {
    pub fn as_mm(&self) -> [f32; 3] {
        [self.x_mm, self.y_mm, self.z_mm]
    }
}

impl Default for BuildVolume {
    fn default() -> Self {
        Self {
            x_mm: default_build_axis_mm(),
            y_mm: default_build_axis_mm(),
            z_mm: default_build_axis_mm(),
        }
    }
}

/// Artifact storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// Configuration consistency errors, surfaced before any run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("gate '{checkpoint}': {source}")]
    Gate {
        checkpoint: &'static str,
        source: GateError,
    },
    #[error("retry.max_attempts must be between 1 and 10, got {0}")]
    MaxAttempts(u32),
    #[error("retry.base_delay_seconds must be non-negative, got {0}")]
    BaseDelay(f64),
    #[error("retry.backoff_multiplier must be at least 1.0, got {0}")]
    BackoffMultiplier(f64),
    #[error("vectorize.palette_size must be between 2 and 256, got {0}")]
    PaletteSize(usize),
    #[error("extrude.{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("extrude.lattice_resolution must be at least 8, got {0}")]
    LatticeResolution(u32),
    #[error("extrude.warn_faces ({warn}) must not exceed extrude.max_faces ({max})")]
    FaceBudget { warn: usize, max: usize },
    #[error("build volume axes must be positive, got {0}x{1}x{2}")]
    BuildVolume(f32, f32, f32),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            defaults: RequestDefaults::default(),
            gates: GatesConfig::default(),
            retry: RetryConfig::default(),
            vectorize: VectorizeConfig::default(),
            extrude: ExtrudeConfig::default(),
            build_volume: BuildVolume::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Load from a path if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the storage root relative to a base directory.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.storage.root.is_relative() {
            self.storage.root = base.join(&self.storage.root);
        }
    }

    /// Reject inconsistent configuration before a pipeline is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (checkpoint, gate) in [
            ("image", &self.gates.image),
            ("vector", &self.gates.vector),
            ("mesh", &self.gates.mesh),
        ] {
            gate.validate()
                .map_err(|source| ConfigError::Gate { checkpoint, source })?;
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(ConfigError::MaxAttempts(self.retry.max_attempts));
        }
        if self.retry.base_delay_seconds < 0.0 {
            return Err(ConfigError::BaseDelay(self.retry.base_delay_seconds));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::BackoffMultiplier(self.retry.backoff_multiplier));
        }

        if self.vectorize.palette_size < 2 || self.vectorize.palette_size > 256 {
            return Err(ConfigError::PaletteSize(self.vectorize.palette_size));
        }

        for (field, value) in [
            ("depth_mm", self.extrude.depth_mm),
            ("target_width_mm", self.extrude.target_width_mm),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.extrude.lattice_resolution < 8 {
            return Err(ConfigError::LatticeResolution(self.extrude.lattice_resolution));
        }
        if self.extrude.warn_faces > self.extrude.max_faces {
            return Err(ConfigError::FaceBudget {
                warn: self.extrude.warn_faces,
                max: self.extrude.max_faces,
            });
        }

        let v = self.build_volume;
        if v.x_mm <= 0.0 || v.y_mm <= 0.0 || v.z_mm <= 0.0 {
            return Err(ConfigError::BuildVolume(v.x_mm, v.y_mm, v.z_mm));
        }

        Ok(())
    }

    /// Serialize as YAML (used by `signforge init`).
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: PipelineConfig = serde_yaml::from_str(
            "retry:\n  max_attempts: 5\nextrude:\n  depth_mm: 8.0\n",
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_seconds, 2.0);
        assert_eq!(config.extrude.depth_mm, 8.0);
        assert_eq!(config.extrude.target_width_mm, 100.0);
        assert_eq!(config.vectorize.palette_size, 8);
        assert_eq!(config.build_volume.as_mm(), [256.0, 256.0, 256.0]);
    }

    #[test]
    fn gate_weights_are_configurable_and_checked() {
        let yaml = concat!(
            "gates:\n",
            "  vector:\n",
            "    weights:\n",
            "      ssim: 0.7\n",
            "      edge_iou: 0.2\n",
            "    overall_threshold: 0.8\n",
        );
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        // 0.7 + 0.2 != 1.0
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Gate {
                checkpoint: "vector",
                ..
            })
        ));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = PipelineConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::MaxAttempts(0))));
    }

    #[test]
    fn yaml_round_trip() {
        let config = PipelineConfig::default();
        let yaml = config.to_yaml().unwrap();
        let back: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.backend.model, "dall-e-3");
        assert_eq!(back.gates.vector.overall_threshold, 0.85);
    }

    #[test]
    fn relative_storage_root_resolves_against_base() {
        let mut config = PipelineConfig::default();
        config.resolve_paths(Path::new("/tmp/project"));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/project/output"));
    }
}
