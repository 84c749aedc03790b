//! # chefsync-sync
//!
//! The sync pipeline and the operations built from its parts.
//!
//! - [`Orchestrator::run`]: one incremental sync of a Chef repository
//! - [`SnapshotManager`]: `save`, `load` and `prop` of environment version maps
//! - [`bump`]: the automatic patch-level policy
//! - [`CheckpointStore`]: the last-processed-revision marker

pub mod bump;
pub mod checkpoint;
pub mod environment_file;
pub mod error;
pub mod orchestrator;
pub mod publish;
pub mod snapshot;
mod writer;

pub use bump::{BumpPlan, BumpResult, SkipReason, UnchangedReason};
pub use checkpoint::{CheckpointStore, MARKER_FILE};
pub use environment_file::{EnvironmentFile, Regenerated};
pub use error::SyncError;
pub use orchestrator::{integration_branch_name, Orchestrator, Stage, SyncOutcome, SyncReport};
pub use publish::Upstream;
pub use snapshot::{LoadOutcome, PropOutcome, SnapshotManager, GENERATION_ITEM};
pub use writer::WriteResult;
