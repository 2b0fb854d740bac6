//! Vectorized image artifact: quantized palette + per-color filled regions.

use image::{Rgba, RgbaImage};

use crate::raster::{RasterFormat, RasterImage};

/// A maximal horizontal run of same-color pixels: row `y`, columns `x0..x1`
/// (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub y: u32,
    pub x0: u32,
    pub x1: u32,
}

impl Span {
    pub fn len(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0
    }
}

/// All pixels of one palette color, as row spans on the source canvas.
#[derive(Debug, Clone)]
pub struct Region {
    pub color: [u8; 3],
    pub spans: Vec<Span>,
}

impl Region {
    /// Total pixel count covered by this region.
    pub fn area(&self) -> u64 {
        self.spans.iter().map(|s| s.len() as u64).sum()
    }
}

/// The vectorization result: a palette, a detected background color, and one
/// filled region per non-background palette color.
///
/// Regions are exact on the source canvas, so rasterizing a `VectorImage`
/// reproduces the quantized image and the quality metrics measure
/// quantization loss rather than rendering loss.
#[derive(Debug, Clone)]
pub struct VectorImage {
    pub width: u32,
    pub height: u32,
    pub palette: Vec<[u8; 3]>,
    pub background: [u8; 3],
    pub regions: Vec<Region>,
}

impl VectorImage {
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn span_count(&self) -> usize {
        self.regions.iter().map(|r| r.spans.len()).sum()
    }

    /// Fraction of the canvas covered by non-background regions.
    pub fn coverage(&self) -> f32 {
        let total = self.width as u64 * self.height as u64;
        if total == 0 {
            return 0.0;
        }
        let fg: u64 = self.regions.iter().map(|r| r.area()).sum();
        fg as f32 / total as f32
    }

    /// Render back to an RGBA raster: background fill, then region spans.
    pub fn rasterize(&self) -> RasterImage {
        let [br, bg, bb] = self.background;
        let mut pixels = RgbaImage::from_pixel(self.width, self.height, Rgba([br, bg, bb, 255]));

        for region in &self.regions {
            let [r, g, b] = region.color;
            for span in &region.spans {
                if span.y >= self.height {
                    continue;
                }
                let x1 = span.x1.min(self.width);
                for x in span.x0..x1 {
                    pixels.put_pixel(x, span.y, Rgba([r, g, b, 255]));
                }
            }
        }

        RasterImage::from_pixels(RasterFormat::Png, pixels)
    }
}
