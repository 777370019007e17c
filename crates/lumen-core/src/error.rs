//! Error types for Lumen.
//!
//! Generation errors are classified so callers can pick a retry strategy:
//! a rate-limited or timed-out request is "try later", an out-of-memory
//! request is "try again shortly", everything else is a real failure.
//! Cache and blob-store errors never reach callers of `generate`; the cache
//! absorbs and logs them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Lumen.
#[derive(Debug, Error)]
pub enum LumenError {
    // Admission and generation errors
    #[error("Generation rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Generation timed out for '{concept}' after {timeout:?}")]
    Timeout { concept: String, timeout: Duration },

    #[error("GPU memory exhausted. Retry after a few seconds.")]
    OutOfMemory,

    #[error("Generation failed for '{concept}': {reason}")]
    GenerationFailed { concept: String, reason: String },

    #[error("Generation cancelled")]
    Cancelled,

    // Request validation
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid request body: {message}")]
    InvalidRequest { message: String },

    // Durable tier
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    // Geometry errors
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    // Model registry errors
    #[error("Model '{name}' is not loaded")]
    ModelNotLoaded { name: String },

    #[error("Model '{name}' does not provide {capability}")]
    WrongCapability { name: String, capability: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type alias for Lumen operations.
pub type Result<T> = std::result::Result<T, LumenError>;

/// Failure reported by a model collaborator.
///
/// The out-of-memory distinction is made by the model wrapper, where the
/// accelerator API reports it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("out of accelerator memory: {0}")]
    OutOfMemory(String),

    #[error("{0}")]
    Failed(String),
}

impl ModelError {
    pub fn failed(message: impl Into<String>) -> Self {
        ModelError::Failed(message.into())
    }

    pub fn is_oom(&self) -> bool {
        matches!(self, ModelError::OutOfMemory(_))
    }
}

// Conversion implementations for common error types

impl From<std::io::Error> for LumenError {
    fn from(err: std::io::Error) -> Self {
        LumenError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LumenError {
    fn from(err: serde_json::Error) -> Self {
        LumenError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for LumenError {
    fn from(err: rusqlite::Error) -> Self {
        LumenError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<base64::DecodeError> for LumenError {
    fn from(err: base64::DecodeError) -> Self {
        LumenError::Encoding(err.to_string())
    }
}

impl From<crate::cancel::CancelledError> for LumenError {
    fn from(_: crate::cancel::CancelledError) -> Self {
        LumenError::Cancelled
    }
}

impl From<ModelError> for LumenError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::OutOfMemory(_) => LumenError::OutOfMemory,
            ModelError::Failed(reason) => LumenError::GenerationFailed {
                concept: String::new(),
                reason,
            },
        }
    }
}

impl LumenError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LumenError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LumenError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        LumenError::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Convert to an HTTP status code.
    ///
    /// - 429: admission gate tripped
    /// - 504: generation deadline exceeded
    /// - 503: accelerator memory exhausted, model missing, cache unreachable
    /// - 422: malformed request
    /// - 500: everything else
    pub fn http_status(&self) -> u16 {
        match self {
            LumenError::RateLimited { .. } => 429,
            LumenError::Timeout { .. } => 504,
            LumenError::OutOfMemory
            | LumenError::ModelNotLoaded { .. }
            | LumenError::CacheUnavailable { .. } => 503,
            LumenError::Validation { .. } | LumenError::InvalidRequest { .. } => 422,
            _ => 500,
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LumenError::RateLimited { .. } => "RateLimited",
            LumenError::Timeout { .. } => "Timeout",
            LumenError::OutOfMemory => "OutOfMemory",
            LumenError::GenerationFailed { .. } => "GenerationFailed",
            LumenError::Cancelled => "Cancelled",
            LumenError::Validation { .. } => "ValidationFailed",
            LumenError::InvalidRequest { .. } => "InvalidRequest",
            LumenError::CacheUnavailable { .. } => "CacheUnavailable",
            LumenError::InvalidGeometry { .. } => "InvalidGeometry",
            LumenError::ModelNotLoaded { .. } | LumenError::WrongCapability { .. } => {
                "ModelNotLoaded"
            }
            LumenError::Database { .. }
            | LumenError::Io { .. }
            | LumenError::Json { .. }
            | LumenError::Encoding(_) => "Internal",
        }
    }

    /// Check if the caller should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LumenError::RateLimited { .. } | LumenError::Timeout { .. } | LumenError::OutOfMemory
        )
    }
}
