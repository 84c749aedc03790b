//! `chefsync prop`: copy cookbook versions between environments.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use chefsync_core::{ConfigError, ConfigOverrides};
use chefsync_sync::{PropOutcome, SnapshotManager};

use super::{GlobalArgs, Session};

/// Arguments for `chefsync prop`.
#[derive(Args, Debug)]
pub struct PropArgs {
    /// Environment whose versions are copied.
    #[arg(short = 'f', long = "from")]
    pub from: Option<String>,

    /// Environment that receives them.
    #[arg(short = 't', long = "to")]
    pub to: Option<String>,
}

impl PropArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let session = Session::open(
            global,
            ConfigOverrides {
                env_from: self.from,
                env_to: self.to,
                ..ConfigOverrides::default()
            },
        )?;
        let config = &session.config;
        let from = config
            .env_from
            .as_deref()
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "no source environment; pass -f/--from or set `env_from`".to_string(),
                )
            })?;
        let to = config.env_to.as_str();

        let outcome = SnapshotManager::new(config, &session.vcs, &session.server)
            .prop(from, to)
            .with_context(|| format!("propagating {from} to {to} failed"))?;

        match outcome {
            PropOutcome::Synced => println!("{} {from} -> {}", "✓".green(), to.bold()),
            PropOutcome::AlreadyInSync => {
                println!("{} {from} and {to} are already in sync", "✓".green())
            }
        }
        Ok(())
    }
}
