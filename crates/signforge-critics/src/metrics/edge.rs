//! Edge-preservation overlap (IoU of Sobel edge maps).

use super::{ensure_same_dimensions, MetricError};
use crate::raster::RasterImage;

/// Gradient magnitude (on unit-range luminance) above which a pixel counts
/// as an edge. A full black/white step produces magnitude 4.0.
const EDGE_THRESHOLD: f32 = 0.5;

/// Intersection-over-union of the detected edge pixel sets of two
/// equally-sized images.
///
/// Both sets empty scores 1.0 (nothing to preserve, nothing lost); exactly
/// one empty scores 0.0.
pub fn edge_overlap(a: &RasterImage, b: &RasterImage) -> Result<f32, MetricError> {
    ensure_same_dimensions(a, b)?;

    let width = a.width() as usize;
    let height = a.height() as usize;
    let ea = edge_map(&a.luminance(), width, height);
    let eb = edge_map(&b.luminance(), width, height);

    let mut intersection = 0u64;
    let mut union = 0u64;
    for (pa, pb) in ea.iter().zip(eb.iter()) {
        if *pa && *pb {
            intersection += 1;
        }
        if *pa || *pb {
            union += 1;
        }
    }

    if union == 0 {
        return Ok(1.0);
    }
    Ok(intersection as f32 / union as f32)
}

/// Binary edge map from 3x3 Sobel gradients, borders clamped.
fn edge_map(lum: &[f32], width: usize, height: usize) -> Vec<bool> {
    let mut edges = vec![false; width * height];
    let at = |x: usize, y: usize| lum[y * width + x];

    for y in 0..height {
        let ym = y.saturating_sub(1);
        let yp = (y + 1).min(height - 1);
        for x in 0..width {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(width - 1);

            let gx = (at(xp, ym) + 2.0 * at(xp, y) + at(xp, yp))
                - (at(xm, ym) + 2.0 * at(xm, y) + at(xm, yp));
            let gy = (at(xm, yp) + 2.0 * at(x, yp) + at(xp, yp))
                - (at(xm, ym) + 2.0 * at(x, ym) + at(xp, ym));

            edges[y * width + x] = (gx * gx + gy * gy).sqrt() > EDGE_THRESHOLD;
        }
    }

    edges
}
