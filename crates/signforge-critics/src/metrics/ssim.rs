//! Structural similarity (SSIM) over luminance planes.

use super::{ensure_same_dimensions, MetricError};
use crate::raster::RasterImage;

/// Sliding-window size; windows shrink to the image when it is smaller.
const WINDOW: usize = 7;

// Stability constants on unit dynamic range
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const C1: f64 = K1 * K1;
const C2: f64 = K2 * K2;

/// Mean windowed SSIM between the luminance planes of two equally-sized
/// images, in [0, 1]. Identical inputs score exactly 1.0.
///
/// Fails with [`MetricError::DimensionMismatch`] when the images differ in
/// size; callers resize/align first.
pub fn ssim(a: &RasterImage, b: &RasterImage) -> Result<f32, MetricError> {
    ensure_same_dimensions(a, b)?;

    let width = a.width() as usize;
    let height = a.height() as usize;
    let la = a.luminance();
    let lb = b.luminance();

    let win = WINDOW.min(width).min(height);
    let n = (win * win) as f64;

    // Integral tables make each window's sums O(1), so the full pass stays
    // linear in pixel count.
    let ia = integral(&la, width, height, |v| v);
    let ib = integral(&lb, width, height, |v| v);
    let iaa = integral(&la, width, height, |v| v * v);
    let ibb = integral(&lb, width, height, |v| v * v);
    let iab = integral_pair(&la, &lb, width, height);

    let mut total = 0.0f64;
    let mut windows = 0u64;

    for y0 in 0..=(height - win) {
        for x0 in 0..=(width - win) {
            let x1 = x0 + win;
            let y1 = y0 + win;
            let sa = window_sum(&ia, width, x0, y0, x1, y1);
            let sb = window_sum(&ib, width, x0, y0, x1, y1);
            let saa = window_sum(&iaa, width, x0, y0, x1, y1);
            let sbb = window_sum(&ibb, width, x0, y0, x1, y1);
            let sab = window_sum(&iab, width, x0, y0, x1, y1);

            let mu_a = sa / n;
            let mu_b = sb / n;
            let var_a = (saa / n - mu_a * mu_a).max(0.0);
            let var_b = (sbb / n - mu_b * mu_b).max(0.0);
            let cov = sab / n - mu_a * mu_b;

            let numerator = (2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2);
            let denominator = (mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2);
            total += numerator / denominator;
            windows += 1;
        }
    }

    let mean = total / windows as f64;
    Ok(mean.clamp(0.0, 1.0) as f32)
}

fn integral(plane: &[f32], width: usize, height: usize, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let stride = width + 1;
    let mut table = vec![0.0f64; stride * (height + 1)];
    for y in 0..height {
        for x in 0..width {
            let v = f(plane[y * width + x] as f64);
            table[(y + 1) * stride + x + 1] =
                v + table[y * stride + x + 1] + table[(y + 1) * stride + x] - table[y * stride + x];
        }
    }
    table
}

fn integral_pair(a: &[f32], b: &[f32], width: usize, height: usize) -> Vec<f64> {
    let stride = width + 1;
    let mut table = vec![0.0f64; stride * (height + 1)];
    for y in 0..height {
        for x in 0..width {
            let v = a[y * width + x] as f64 * b[y * width + x] as f64;
            table[(y + 1) * stride + x + 1] =
                v + table[y * stride + x + 1] + table[(y + 1) * stride + x] - table[y * stride + x];
        }
    }
    table
}

fn window_sum(table: &[f64], width: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
    let stride = width + 1;
    table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
        + table[y0 * stride + x0]
}
