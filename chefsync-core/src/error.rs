//! Error types for chefsync-core and the collaborator ports.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating or parsing the configuration file.
///
/// Any of these is fatal before sync logic runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A remote config could not be downloaded: transport failure or a
    /// non-success HTTP status.
    #[error("failed to fetch config from {url}: {detail}")]
    Fetch { url: String, detail: String },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// The file parsed, but a value is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Failures from the version-control collaborator.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The VCS program could not be spawned.
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The VCS program ran and exited non-zero.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The VCS program succeeded but printed something unparsable.
    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },
}

/// Failures from the configuration-server collaborator.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("server JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures running a validator (not a failed check; that is an outcome).
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("failed to run validator `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
