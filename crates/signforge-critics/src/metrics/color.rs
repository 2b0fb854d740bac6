//! Color-fidelity correlation between quantized histograms.

use super::MetricError;
use crate::raster::RasterImage;

/// Mean per-channel Pearson correlation between the color histograms of two
/// images, quantized to `bins` levels per channel (the vectorization palette
/// size). Negative correlation clamps to 0.
///
/// Histograms are normalized, so the images need not share dimensions.
pub fn color_fidelity(a: &RasterImage, b: &RasterImage, bins: usize) -> Result<f32, MetricError> {
    if a.width() == 0 || a.height() == 0 || b.width() == 0 || b.height() == 0 {
        return Err(MetricError::EmptyImage);
    }
    let bins = bins.clamp(2, 256);

    let mut total = 0.0f64;
    for channel in 0..3 {
        let ha = histogram(a, channel, bins);
        let hb = histogram(b, channel, bins);
        total += correlation(&ha, &hb).clamp(0.0, 1.0);
    }

    Ok((total / 3.0) as f32)
}

/// Normalized histogram of one RGB channel.
fn histogram(img: &RasterImage, channel: usize, bins: usize) -> Vec<f64> {
    let mut hist = vec![0.0f64; bins];
    for p in img.pixels().pixels() {
        let v = p.0[channel] as usize;
        hist[v * bins / 256] += 1.0;
    }
    let total: f64 = hist.iter().sum();
    if total > 0.0 {
        for h in hist.iter_mut() {
            *h /= total;
        }
    }
    hist
}

/// Pearson correlation; identical zero-variance inputs correlate at 1.
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().sum::<f64>() / n;
    let mean_b: f64 = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a) * (x - mean_a);
        var_b += (y - mean_b) * (y - mean_b);
    }

    if var_a == 0.0 && var_b == 0.0 {
        return if a == b { 1.0 } else { 0.0 };
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
