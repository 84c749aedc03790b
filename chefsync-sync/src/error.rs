//! Error types for chefsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use chefsync_core::{ServerError, VcsError};
use chefsync_detector::DetectError;

/// All errors that can arise from sync, snapshot and propagation runs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Change detection failed.
    #[error("change detection failed: {0}")]
    Detect(#[from] DetectError),

    /// A VCS operation failed.
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),

    /// A configuration-server operation failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A setting the operation needs is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] chefsync_core::ConfigError),

    /// A stored data bag item does not have the expected shape.
    #[error("malformed record {bag}/{item}: {source}")]
    MalformedRecord {
        bag: String,
        item: String,
        #[source]
        source: serde_json::Error,
    },

    /// The named environment does not exist on the server.
    #[error("environment '{name}' not found on the server")]
    EnvironmentNotFound { name: String },

    /// One or more validators reported failure.
    #[error("validation failed: {}", failed.join(", "))]
    Validation { failed: Vec<String> },

    /// A validator could not be run at all.
    #[error("validator error: {0}")]
    Validator(#[from] chefsync_core::ValidatorError),

    #[error("invalid snapshot tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// The stored generation counter does not read as `<major>_<minor>`.
    #[error("malformed generation counter '{value}'")]
    MalformedGeneration { value: String },

    /// The minor component cannot be incremented further.
    #[error("generation counter '{tag}' cannot be incremented")]
    GenerationOverflow { tag: String },

    /// A checkpoint would point at a revision missing from history.
    #[error("revision '{revision}' does not exist in history")]
    UnknownRevision { revision: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Json`].
pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> SyncError {
    SyncError::Json {
        path: path.into(),
        source,
    }
}
