//! ABOUTME: Error types and handling for ragengine
//! ABOUTME: Provides the RagError enum and the crate-wide Result alias

use thiserror::Error;

/// Comprehensive error enum for all ragengine operations.
///
/// Variants correspond 1:1 to the error kinds named in the pipeline's error
/// handling design: `InvalidInput`, `BackendUnavailable`, `Timeout`,
/// `ModelError`, `ParseError`, `Cancelled`, `Internal`.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("operation timed out: {message}")]
    Timeout { message: String },

    #[error("model error: {message}")]
    ModelError { message: String },

    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("cancelled: {message}")]
    Cancelled { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn model_error(message: impl Into<String>) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a call that failed with this error is worth retrying under
    /// the retry envelope (C13). Validation errors are never retryable;
    /// transport/timeout/backend failures are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput { .. } | Self::Cancelled { .. })
    }
}

/// Convenience Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RagError>;
