//! Decoded raster image artifact.

use image::{imageops::FilterType, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Source encoding of a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpeg",
        }
    }
}

/// Errors from decoding or encoding raster bytes.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to decode image bytes: {0}")]
    Decode(String),
    #[error("unsupported image format {0}, expected png or jpeg")]
    UnsupportedFormat(String),
    #[error("pixel buffer length {got} does not match {width}x{height} rgba")]
    BufferSize { width: u32, height: u32, got: usize },
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// An immutable decoded image: RGBA pixels plus the declared source format.
///
/// Produced by the Generate stage, consumed by vectorization and by the
/// image-quality metrics. Transformations return new instances; the pixel
/// data behind an existing `RasterImage` never changes.
#[derive(Debug, Clone)]
pub struct RasterImage {
    format: RasterFormat,
    pixels: RgbaImage,
}

impl RasterImage {
    /// Decode PNG or JPEG bytes as delivered by the generation backend.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RasterError> {
        let guessed = image::guess_format(bytes)
            .map_err(|e| RasterError::Decode(e.to_string()))?;
        let format = match guessed {
            ImageFormat::Png => RasterFormat::Png,
            ImageFormat::Jpeg => RasterFormat::Jpeg,
            other => return Err(RasterError::UnsupportedFormat(format!("{other:?}"))),
        };

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| RasterError::Decode(e.to_string()))?;

        Ok(Self {
            format,
            pixels: decoded.to_rgba8(),
        })
    }

    /// Build an image from raw RGBA pixels (row-major, 4 bytes per pixel).
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RasterError::BufferSize {
                width,
                height,
                got: data.len(),
            });
        }
        // from_raw only fails on a length mismatch, which is checked above
        let pixels = RgbaImage::from_raw(width, height, data).ok_or(RasterError::BufferSize {
            width,
            height,
            got: expected,
        })?;
        Ok(Self {
            format: RasterFormat::Png,
            pixels,
        })
    }

    pub(crate) fn from_pixels(format: RasterFormat, pixels: RgbaImage) -> Self {
        Self { format, pixels }
    }

    pub fn format(&self) -> RasterFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the underlying RGBA pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Luminance plane in [0, 1], row-major, Rec. 601 weights.
    pub fn luminance(&self) -> Vec<f32> {
        self.pixels
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
            })
            .collect()
    }

    /// Return a resized copy (triangle filter). The original is untouched.
    pub fn resized(&self, width: u32, height: u32) -> RasterImage {
        let pixels = image::imageops::resize(&self.pixels, width, height, FilterType::Triangle);
        Self {
            format: self.format,
            pixels,
        }
    }

    /// Encode the pixel data as PNG regardless of the source format.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, RasterError> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(self.pixels.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| RasterError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }
}
