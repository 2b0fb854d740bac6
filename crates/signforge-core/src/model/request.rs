//! Generation request parameters and default resolution.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::Prompt;

/// Visual style for the generated sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Modern,
    Classic,
    Playful,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Modern => "modern",
            Style::Classic => "classic",
            Style::Playful => "playful",
        }
    }

    /// Keywords injected into the engineered prompt.
    pub fn keywords(&self) -> &'static str {
        match self {
            Style::Modern => "modern, clean, minimalist, sans-serif style",
            Style::Classic => "classic, elegant, serif, traditional style",
            Style::Playful => "playful, fun, rounded, colorful style",
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "modern" => Ok(Style::Modern),
            "classic" => Ok(Style::Classic),
            "playful" => Ok(Style::Playful),
            other => Err(format!("unknown style '{other}'")),
        }
    }
}

/// Output resolutions the generation backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square1024,
    #[serde(rename = "1792x1024")]
    Wide1792,
    #[serde(rename = "1024x1792")]
    Tall1792,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square1024 => "1024x1024",
            ImageSize::Wide1792 => "1792x1024",
            ImageSize::Tall1792 => "1024x1792",
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            ImageSize::Square1024 => 1024,
            ImageSize::Wide1792 => 1792,
            ImageSize::Tall1792 => 1024,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            ImageSize::Square1024 => 1024,
            ImageSize::Wide1792 => 1024,
            ImageSize::Tall1792 => 1792,
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1024x1024" => Ok(ImageSize::Square1024),
            "1792x1024" => Ok(ImageSize::Wide1792),
            "1024x1792" => Ok(ImageSize::Tall1792),
            other => Err(format!(
                "unsupported size '{other}', expected 1024x1024, 1792x1024 or 1024x1792"
            )),
        }
    }
}

/// Backend quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Standard,
    Hd,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Standard => "standard",
            QualityTier::Hd => "hd",
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(QualityTier::Standard),
            "hd" => Ok(QualityTier::Hd),
            other => Err(format!("unknown quality tier '{other}'")),
        }
    }
}

/// Defaults applied when a request leaves size or quality unset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestDefaults {
    pub size: ImageSize,
    pub quality: QualityTier,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            size: ImageSize::Square1024,
            quality: QualityTier::Standard,
        }
    }
}

/// A caller's request before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: Prompt,
    pub style: Option<Style>,
    pub size: Option<ImageSize>,
    pub quality: Option<QualityTier>,
}

impl GenerationRequest {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            style: None,
            size: None,
            quality: None,
        }
    }

    /// Apply defaults. Pure: identical inputs always resolve identically.
    pub fn resolve(&self, defaults: &RequestDefaults) -> ResolvedRequest {
        ResolvedRequest {
            prompt: self.prompt.clone(),
            style: self.style,
            size: self.size.unwrap_or(defaults.size),
            quality: self.quality.unwrap_or(defaults.quality),
        }
    }
}

/// A fully-resolved request, immutable for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRequest {
    pub prompt: Prompt,
    pub style: Option<Style>,
    pub size: ImageSize,
    pub quality: QualityTier,
}

impl ResolvedRequest {
    /// The prompt actually submitted to the backend, wrapping the sign text
    /// with style keywords and print guidance.
    pub fn engineered_prompt(&self) -> String {
        let keywords = self
            .style
            .map(|s| s.keywords())
            .unwrap_or("clean, simple");
        format!(
            "A {keywords} name sign displaying '{}' suitable for 3D printing \
             with clear, readable typography",
            self.prompt
        )
    }
}
