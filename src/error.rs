//! Error types
//!
//! Patch failures are all recoverable by downloading the complete repodata
//! document again; storage and configuration failures belong to the caller.

use thiserror::Error;

/// Failures while turning a patch stream into an overlay.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Unsupported patch operator: {0}")]
    UnsupportedPatchOperator(String),

    #[error("Overlay too large: {size} bytes exceeds limit of {limit} bytes")]
    OverlayTooLarge { size: usize, limit: usize },

    #[error("Malformed pointer {pointer:?}: {reason}")]
    MalformedPointer { pointer: String, reason: String },

    #[error("Patch stream discontinuity: expected cursor {expected}, stream starts at {found}")]
    PatchStreamDiscontinuity { expected: String, found: String },

    #[error("Integrity mismatch: expected {expected}, computed {computed}")]
    IntegrityMismatch { expected: String, computed: String },

    #[error("No patch from local revision {0}")]
    PatchNotFound(String),

    #[error("Malformed patch stream: {0}")]
    MalformedStream(String),
}

impl PatchError {
    pub(crate) fn pointer(pointer: &str, reason: impl Into<String>) -> Self {
        PatchError::MalformedPointer {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }

    /// Short stable name, used in logs and the cache state.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::UnsupportedPatchOperator(_) => "unsupported_patch_operator",
            PatchError::OverlayTooLarge { .. } => "overlay_too_large",
            PatchError::MalformedPointer { .. } => "malformed_pointer",
            PatchError::PatchStreamDiscontinuity { .. } => "patch_stream_discontinuity",
            PatchError::IntegrityMismatch { .. } => "integrity_mismatch",
            PatchError::PatchNotFound(_) => "patch_not_found",
            PatchError::MalformedStream(_) => "malformed_stream",
        }
    }
}

/// Failures reading or writing cache files.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Baseline document not found: {0}")]
    BaselineMissing(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Top-level error surfaced by the cache handle and the CLI.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Patch failed ({0}); download the complete repodata.json and run import")]
    Patch(#[from] PatchError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
