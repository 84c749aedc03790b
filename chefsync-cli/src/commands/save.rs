//! `chefsync save`: snapshot an environment's cookbook versions.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use chefsync_sync::SnapshotManager;

use super::{GlobalArgs, Session};

/// Arguments for `chefsync save`.
#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Environment to snapshot.
    #[arg(short = 'e', long = "env")]
    pub environment: String,

    /// Tag to store the snapshot under (default: next generation tag).
    #[arg(short = 'b', long = "tag")]
    pub tag: Option<String>,
}

impl SaveArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let session = Session::open(global, Default::default())?;
        let snapshot = SnapshotManager::new(&session.config, &session.vcs, &session.server)
            .save(&self.environment, self.tag.as_deref())
            .with_context(|| format!("saving {} failed", self.environment))?;

        println!(
            "{} saved {} as {} ({} cookbooks)",
            "✓".green(),
            snapshot.environment,
            snapshot.tag.bold(),
            snapshot.cookbook_versions.len()
        );
        Ok(())
    }
}
