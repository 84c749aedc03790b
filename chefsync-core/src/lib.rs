//! chefsync core library: domain types, configuration, collaborator ports, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and domain structs
//! - [`config`]: YAML configuration load / resolve
//! - [`ports`]: `Vcs`, `ConfigServer` and `Validator` capability traits
//! - [`error`]: [`ConfigError`], [`VcsError`], [`ServerError`], [`ValidatorError`]

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use config::{ConfigOverrides, MissingSnapshotPolicy, SyncConfig};
pub use error::{ConfigError, ServerError, ValidatorError, VcsError};
pub use types::{
    ArtifactChange, ArtifactKind, ArtifactRef, CategoryChanges, ChangeKind, ChangeSet,
    Checkpoint, CookbookVersion, Environment, GenerationTag, Revision, Snapshot, VersionMap,
    WatchedRoots,
};
