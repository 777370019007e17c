//! Incoming generation requests.

use crate::error::{LumenError, Result};
use serde::{Deserialize, Serialize};

/// Generation quality mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Primary path only; a failed primary attempt degrades straight to mock.
    Fast,
    /// Primary path with the fallback attempt enabled.
    #[default]
    Standard,
}

/// Request to generate a labeled point cloud for a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Noun or short phrase to generate.
    pub text: String,
    #[serde(default)]
    pub quality: Quality,
}

impl GenerateRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quality: Quality::default(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Validate and trim the request text.
    ///
    /// Runs before any cache or model work.
    pub fn validated(self, max_len: usize) -> Result<Self> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(LumenError::validation("text", "must not be empty"));
        }
        let len = text.chars().count();
        if len > max_len {
            return Err(LumenError::validation(
                "text",
                format!("must be at most {} characters, got {}", max_len, len),
            ));
        }
        if !text.chars().any(char::is_alphabetic) {
            return Err(LumenError::validation(
                "text",
                "must contain at least one alphabetic character",
            ));
        }
        Ok(Self {
            text: text.to_string(),
            quality: self.quality,
        })
    }
}
