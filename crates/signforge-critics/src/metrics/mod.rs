//! Deterministic image-quality metric evaluators.

pub mod color;
pub mod edge;
pub mod ssim;

pub use color::color_fidelity;
pub use edge::edge_overlap;
pub use ssim::ssim;

use thiserror::Error;

use crate::raster::RasterImage;

/// Errors from malformed metric inputs. The calling stage classifies these
/// as invalid input; evaluators themselves never retry or log.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("image dimensions mismatch: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),
    #[error("empty image")]
    EmptyImage,
}

pub(crate) fn ensure_same_dimensions(a: &RasterImage, b: &RasterImage) -> Result<(), MetricError> {
    if a.width() == 0 || a.height() == 0 || b.width() == 0 || b.height() == 0 {
        return Err(MetricError::EmptyImage);
    }
    if a.width() != b.width() || a.height() != b.height() {
        return Err(MetricError::DimensionMismatch(
            a.width(),
            a.height(),
            b.width(),
            b.height(),
        ));
    }
    Ok(())
}
