//! `chefsync sync`: one incremental sync of the repository.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use chefsync_core::ConfigOverrides;
use chefsync_shell::validators_by_name;
use chefsync_sync::{BumpResult, Orchestrator, SyncOutcome, SyncReport};

use super::{GlobalArgs, Session};

/// Arguments for `chefsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Environment to upload cookbooks into.
    #[arg(short = 'e', long = "env")]
    pub env_to: Option<String>,

    /// Build identifier naming the integration branch.
    #[arg(long, env = "BUILD_TAG")]
    pub build_tag: Option<String>,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let session = Session::open(
            global,
            ConfigOverrides {
                env_to: self.env_to,
                ..ConfigOverrides::default()
            },
        )?;
        let validators = validators_by_name(&session.config.tests, &session.knife)?;

        let report = Orchestrator::new(&session.config, &session.vcs, &session.server)
            .with_validators(validators)
            .run(self.build_tag.as_deref())
            .with_context(|| format!("sync of {} failed", session.config.repo_dir.display()))?;

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &SyncReport) {
    match &report.outcome {
        SyncOutcome::NothingToDo => {
            println!("{} nothing changed since the last checkpoint", "✓".green());
        }
        SyncOutcome::Synced { checkpoint } => {
            println!(
                "{} synced on {} (checkpoint {})",
                "✓".green(),
                report.branch.bold(),
                checkpoint.revision
            );
            print_names("cookbooks", &report.changes.cookbooks.changed_names());
            print_names("roles", &report.changes.roles.changed_names());
            let items: Vec<String> = report
                .changes
                .data_bags
                .changed()
                .map(|a| a.key())
                .collect();
            print_names("data bag items", &items);
            for (name, result) in &report.bumps {
                if let BumpResult::Bumped { old, new } = result {
                    println!("  {name}: {old} -> {}", new.to_string().cyan());
                }
            }
        }
    }
}

fn print_names(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("  {label}: {}", names.join(", "));
    }
}
