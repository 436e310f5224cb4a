//! Error types for Verdict

use crate::types::ServingState;
use std::path::PathBuf;

/// Result type alias using Verdict's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Verdict operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model package could not be loaded
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Caller input is malformed
    #[error("validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// The serving gate rejected the request
    #[error("model is not ready (state: {0})")]
    NotReady(ServingState),

    /// Model invocation failed for structural or numeric reasons
    #[error("inference error: {0}")]
    Inference(String),

    /// Serving lifecycle transition that the state machine does not allow
    #[error("invalid serving state transition from {from} to {to}")]
    InvalidTransition { from: ServingState, to: ServingState },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error for a request field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable kind, used in error payloads and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_error",
            Self::Validation { .. } => "validation_error",
            Self::NotReady(_) => "not_ready",
            Self::Inference(_) => "inference_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Config(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Reasons a model package fails to load.
///
/// Loading is all-or-nothing: any of these leaves the serving gate in
/// `Failed` and no partially initialised package is ever exposed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Package directory, manifest, or weights file does not exist
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// A file exists but cannot be decoded
    #[error("corrupt format in {}: {reason}", .path.display())]
    CorruptFormat { path: PathBuf, reason: String },

    /// The package decodes but its contents are structurally inconsistent
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Compute device or remote package source unavailable
    #[error("backend unavailable: {0}")]
    Backend(String),
}

impl LoadError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::CorruptFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
