//! On-disk persistence for accepted runs.
//!
//! Every run gets a unique artifact stem, so concurrent runs sharing one
//! storage root never collide and a finished run's files are never touched
//! again.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use signforge_critics::{stl, Mesh, RasterImage};

use crate::config::StorageConfig;
use crate::error::{FailureKind, StageFailure};
use crate::model::Prompt;

const SLUG_MAX: usize = 20;

fn storage_failure(context: &str, err: impl std::fmt::Display) -> StageFailure {
    StageFailure::new(FailureKind::StorageFailure, format!("{context}: {err}"))
}

/// Create-only write; an existing file at `path` is an error, never
/// overwritten.
fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)
}

/// The three files an accepted run leaves behind.
#[derive(Debug, Clone)]
pub struct StoredArtifacts {
    pub stem: String,
    pub mesh_path: PathBuf,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl StoredArtifacts {
    pub fn mesh_file_name(&self) -> String {
        format!("{}.stl", self.stem)
    }

    pub fn image_file_name(&self) -> String {
        format!("{}.png", self.stem)
    }

    pub fn metadata_file_name(&self) -> String {
        format!("{}.json", self.stem)
    }
}

/// Writes accepted-run artifacts under a configured root directory.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Computes the per-run stem and target paths without touching disk.
    ///
    /// Split from [`persist`](Self::persist) because the metadata record
    /// itself lists the artifact file names.
    pub fn plan(&self, run_id: Uuid, prompt: &Prompt, at: DateTime<Utc>) -> StoredArtifacts {
        let run_tag = run_id.simple().to_string();
        let mut slug = prompt.slug(SLUG_MAX);
        if slug.is_empty() {
            slug.push_str("run");
        }
        let stem = format!(
            "{}_{}_{}",
            at.format("%Y%m%d_%H%M%S"),
            &run_tag[..8],
            slug
        );
        StoredArtifacts {
            mesh_path: self.root.join(format!("{stem}.stl")),
            image_path: self.root.join(format!("{stem}.png")),
            metadata_path: self.root.join(format!("{stem}.json")),
            stem,
        }
    }

    /// Writes the STL, the source PNG, and the metadata JSON as new files,
    /// creating the root directory on demand.
    pub fn persist<M: Serialize>(
        &self,
        artifacts: &StoredArtifacts,
        mesh: &Mesh,
        image: &RasterImage,
        metadata: &M,
    ) -> Result<(), StageFailure> {
        fs::create_dir_all(&self.root)
            .map_err(|err| storage_failure("creating storage root", err))?;

        let png = image
            .to_png_bytes()
            .map_err(|err| storage_failure("encoding source raster", err))?;
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|err| storage_failure("encoding run metadata", err))?;

        write_new(&artifacts.mesh_path, &stl::to_stl_bytes(mesh))
            .map_err(|err| storage_failure("writing mesh artifact", err))?;
        write_new(&artifacts.image_path, &png)
            .map_err(|err| storage_failure("writing raster artifact", err))?;
        write_new(&artifacts.metadata_path, &json)
            .map_err(|err| storage_failure("writing run metadata", err))?;

        tracing::info!(
            stem = %artifacts.stem,
            root = %self.root.display(),
            "persisted run artifacts"
        );
        Ok(())
    }
}
