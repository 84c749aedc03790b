//! Narrow capability interfaces for every external side effect.
//!
//! The sync pipeline only talks to the outside world through these traits:
//! [`Vcs`] for the repository, [`ConfigServer`] for the Chef server and
//! [`Validator`] for pluggable cookbook checks. Concrete adapters live in
//! `chefsync-shell`; tests use in-memory fakes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ValidatorError, VcsError};
use crate::types::{Environment, Revision};

// ---------------------------------------------------------------------------
// VCS
// ---------------------------------------------------------------------------

/// Status of one file between two revisions, as reported by the VCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

/// One touched file. `path` is relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOptions {
    /// Stage every tracked and untracked change before committing.
    pub add_all: bool,
    /// Record a commit even when nothing is staged.
    pub allow_empty: bool,
}

impl CommitOptions {
    pub fn add_all() -> Self {
        Self {
            add_all: true,
            allow_empty: false,
        }
    }

    pub fn allow_empty() -> Self {
        Self {
            add_all: false,
            allow_empty: true,
        }
    }
}

/// A commit either happened or there was nothing to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { revision: Revision },
    NothingToCommit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCheckout {
    Created,
    Existing,
}

/// Registering a remote is idempotent; an existing remote is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Added,
    AlreadyExists { url: String },
}

/// Version-control capabilities the pipeline relies on.
pub trait Vcs {
    /// Root of the working copy.
    fn workdir(&self) -> &Path;

    /// Files touched between `from` and `to`, tagged with their status.
    fn changed_files(&self, from: &Revision, to: &Revision) -> Result<Vec<FileChange>, VcsError>;

    /// Whether `path` (repo-relative) exists in the tree at `revision`.
    fn exists_at(&self, revision: &Revision, path: &Path) -> Result<bool, VcsError>;

    /// The fully resolved revision of `HEAD`.
    fn current_revision(&self) -> Result<Revision, VcsError>;

    /// Whether `revision` resolves to a commit in history.
    fn revision_exists(&self, revision: &Revision) -> Result<bool, VcsError>;

    /// Stage specific paths.
    fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError>;

    fn commit(&self, message: &str, options: CommitOptions) -> Result<CommitOutcome, VcsError>;

    /// Check out `name`, creating it from the current `HEAD` if absent.
    fn checkout_branch(&self, name: &str) -> Result<BranchCheckout, VcsError>;

    fn add_remote(&self, name: &str, url: &str) -> Result<RemoteStatus, VcsError>;

    fn push(&self, remote: &str, refspec: &str) -> Result<(), VcsError>;
}

// ---------------------------------------------------------------------------
// Configuration server
// ---------------------------------------------------------------------------

/// Outcome of ensuring a keyed-record collection (data bag) exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// Chef server capabilities, one method per side effect.
pub trait ConfigServer {
    /// Every published version of `cookbook`, or `None` if the server has
    /// never seen it.
    fn cookbook_versions(&self, cookbook: &str) -> Result<Option<BTreeSet<String>>, ServerError>;

    fn upload_cookbooks(
        &self,
        names: &[String],
        environment: &str,
        freeze: bool,
    ) -> Result<(), ServerError>;

    /// Create or update roles from their definition files.
    fn create_or_update_role(&self, paths: &[PathBuf]) -> Result<(), ServerError>;

    fn ensure_data_bag(&self, bag: &str) -> Result<Provisioned, ServerError>;

    fn create_or_update_data_bag_item(
        &self,
        bag: &str,
        item: &str,
        data: &serde_json::Value,
    ) -> Result<(), ServerError>;

    fn load_data_bag_item(
        &self,
        bag: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, ServerError>;

    fn load_environment(&self, name: &str) -> Result<Option<Environment>, ServerError>;

    fn save_environment(&self, environment: &Environment) -> Result<(), ServerError>;
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Options forwarded to linters. Validators ignore what they do not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintOptions {
    pub fail_tags: Vec<String>,
    pub tags: Vec<String>,
    pub include_rules: Vec<PathBuf>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            fail_tags: vec!["correctness".to_string()],
            tags: Vec::new(),
            include_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// Human-readable report (tool output).
    pub summary: String,
}

/// A pluggable cookbook check, selected by name from configuration.
pub trait Validator {
    fn name(&self) -> &str;

    fn check(
        &self,
        cookbooks: &[String],
        search_path: &[PathBuf],
        options: &LintOptions,
    ) -> Result<ValidationOutcome, ValidatorError>;
}
