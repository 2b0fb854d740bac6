//! Validated sign text.

use serde::Serialize;
use thiserror::Error;

/// Longest accepted prompt, in characters after trimming.
pub const MAX_PROMPT_CHARS: usize = 50;

/// Validation errors for sign text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt is empty")]
    Empty,
    #[error("prompt is {0} characters, maximum is {MAX_PROMPT_CHARS}")]
    TooLong(usize),
    #[error("prompt contains unsupported character {0:?}")]
    UnsupportedCharacter(char),
}

/// The text to render on the sign: 1–50 characters of letters, digits,
/// whitespace, and basic punctuation (`- ' " , ! .`). Immutable once
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: &str) -> Result<Self, PromptError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(PromptError::Empty);
        }
        let count = trimmed.chars().count();
        if count > MAX_PROMPT_CHARS {
            return Err(PromptError::TooLong(count));
        }
        if let Some(bad) = trimmed.chars().find(|c| !is_allowed(*c)) {
            return Err(PromptError::UnsupportedCharacter(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form: lowercase, runs of other characters collapsed
    /// to one underscore, truncated to `max_len`, never ending mid-separator.
    pub fn slug(&self, max_len: usize) -> String {
        let mut slug = String::new();
        let mut last_was_sep = true;
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_was_sep = false;
            } else if !last_was_sep {
                slug.push('_');
                last_was_sep = true;
            }
        }
        slug.truncate(max_len);
        while slug.ends_with('_') {
            slug.pop();
        }
        slug
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || matches!(c, '-' | '\'' | '"' | ',' | '!' | '.')
}
