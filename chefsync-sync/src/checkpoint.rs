//! The last-processed-revision marker.
//!
//! The marker is a plain text file at the repository root holding one
//! revision id. It is committed like any other file, so the next clone of the
//! integration branch sees where the previous run stopped.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use chefsync_core::{
    ports::{CommitOptions, CommitOutcome, Vcs},
    Checkpoint, Revision,
};

use crate::error::{io_err, SyncError};
use crate::writer::atomic_write;

/// File name of the marker, relative to the repository root.
pub const MARKER_FILE: &str = ".chefsync_last_commit";

pub(crate) const MARKER_COMMIT_MESSAGE: &str =
    "Updating the last auto-commit marker for chefsync";

pub struct CheckpointStore<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    pub fn marker_path(&self) -> PathBuf {
        self.vcs.workdir().join(MARKER_FILE)
    }

    /// The recorded revision, or `None` when the marker is missing or empty.
    pub fn read(&self) -> Result<Option<Revision>, SyncError> {
        let path = self.marker_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    tracing::debug!("checkpoint marker {} is empty", path.display());
                    Ok(None)
                } else {
                    Ok(Some(Revision::from(trimmed)))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Like [`read`](Self::read), with the marker's modification time.
    pub fn read_checkpoint(&self) -> Result<Option<Checkpoint>, SyncError> {
        let Some(revision) = self.read()? else {
            return Ok(None);
        };
        let path = self.marker_path();
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&path, e))?;
        Ok(Some(Checkpoint {
            revision,
            written_at: DateTime::<Utc>::from(modified),
        }))
    }

    /// Record `revision` and commit the marker.
    ///
    /// Fails with [`SyncError::UnknownRevision`] before touching the file if
    /// `revision` is not part of history.
    pub fn write(&self, revision: &Revision) -> Result<Checkpoint, SyncError> {
        if !self.vcs.revision_exists(revision)? {
            return Err(SyncError::UnknownRevision {
                revision: revision.to_string(),
            });
        }

        let path = self.marker_path();
        atomic_write(&path, revision.as_str())?;
        self.vcs.add(&[path])?;
        match self
            .vcs
            .commit(MARKER_COMMIT_MESSAGE, CommitOptions::default())?
        {
            CommitOutcome::Committed { revision: commit } => {
                tracing::info!("Checkpoint {revision} recorded in {commit}");
            }
            CommitOutcome::NothingToCommit => {
                tracing::info!("Checkpoint already at {revision}");
            }
        }

        Ok(Checkpoint {
            revision: revision.clone(),
            written_at: Utc::now(),
        })
    }
}

/// Compact age of `written_at`, e.g. `42s`, `5m`, `3h`, `2d`.
pub fn format_age(written_at: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(written_at)
        .num_seconds()
        .max(0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
