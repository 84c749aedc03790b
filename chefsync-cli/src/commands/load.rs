//! `chefsync load`: restore an environment from a snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use thiserror::Error;

use chefsync_core::MissingSnapshotPolicy;
use chefsync_sync::{LoadOutcome, SnapshotManager};

use super::{GlobalArgs, Session};

/// Raised when the requested tag does not exist and the policy is `fail`.
#[derive(Debug, Error)]
#[error("no snapshot tagged '{tag}'")]
pub struct SnapshotMissing {
    pub tag: String,
}

/// Arguments for `chefsync load`.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Environment to restore into.
    #[arg(short = 'e', long = "env")]
    pub environment: String,

    /// Tag of the snapshot to restore.
    #[arg(short = 'b', long = "tag")]
    pub tag: String,
}

impl LoadArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let session = Session::open(global, Default::default())?;
        let outcome = SnapshotManager::new(&session.config, &session.vcs, &session.server)
            .load(&self.environment, &self.tag)
            .with_context(|| format!("restoring {} from {} failed", self.environment, self.tag))?;

        match outcome {
            LoadOutcome::Restored(snapshot) => {
                println!(
                    "{} restored {} from {} ({} cookbooks)",
                    "✓".green(),
                    self.environment.bold(),
                    snapshot.tag,
                    snapshot.cookbook_versions.len()
                );
                Ok(())
            }
            LoadOutcome::NotFound { tag } => match session.config.on_missing_snapshot {
                MissingSnapshotPolicy::Succeed => {
                    println!("{} no snapshot tagged '{tag}'; nothing restored", "!".yellow());
                    Ok(())
                }
                MissingSnapshotPolicy::Fail => Err(SnapshotMissing { tag }.into()),
            },
        }
    }
}
