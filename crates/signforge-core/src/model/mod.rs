//! Request model: validated prompts and generation parameters.

mod prompt;
mod request;

pub use prompt::{Prompt, PromptError};
pub use request::{
    GenerationRequest, ImageSize, QualityTier, RequestDefaults, ResolvedRequest, Style,
};
