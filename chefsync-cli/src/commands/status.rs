//! `chefsync status`: checkpoint age and pending changes, read-only.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use chefsync_core::{
    ports::ConfigServer, ArtifactChange, ChangeKind, ChangeSet, Checkpoint, Revision,
};
use chefsync_detector::ChangeDetector;
use chefsync_sync::{
    bump,
    checkpoint::{format_age, CheckpointStore},
    BumpResult,
};

use super::{GlobalArgs, Session};

/// Arguments for `chefsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also show the metadata edits the next sync would make.
    #[arg(long)]
    pub diff: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    checkpoint: Option<CheckpointJson<'a>>,
    changes: &'a ChangeSet,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bumps: Vec<PendingBump>,
}

#[derive(Serialize)]
struct CheckpointJson<'a> {
    #[serde(flatten)]
    checkpoint: &'a Checkpoint,
    age: String,
}

#[derive(Serialize)]
struct PendingBump {
    cookbook: String,
    from: String,
    to: String,
    diff: String,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "change")]
    change: String,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let session = Session::open(global, Default::default())?;
        let config = &session.config;

        let checkpoint = CheckpointStore::new(&session.vcs)
            .read_checkpoint()
            .context("failed to read the checkpoint")?;
        let detector = ChangeDetector::new(&session.vcs, config.watched_roots());
        let changes = match &checkpoint {
            Some(cp) => detector.detect_all(&cp.revision, &Revision::head()),
            None => detector.scan_everything(),
        }
        .context("change detection failed")?;

        let bumps = if self.diff {
            pending_bumps(&session, &changes)?
        } else {
            Vec::new()
        };

        if self.json {
            let payload = StatusJson {
                checkpoint: checkpoint.as_ref().map(|cp| CheckpointJson {
                    checkpoint: cp,
                    age: format_age(cp.written_at),
                }),
                changes: &changes,
                bumps,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_summary(checkpoint.as_ref(), &changes);
        for pending in &bumps {
            println!();
            println!(
                "{} {} -> {}",
                pending.cookbook.bold(),
                pending.from,
                pending.to.cyan()
            );
            print_diff(&pending.diff);
        }
        Ok(())
    }
}

/// Plan, without writing, the bump of every changed cookbook.
fn pending_bumps(session: &Session, changes: &ChangeSet) -> Result<Vec<PendingBump>> {
    let config = &session.config;
    let mut pending = Vec::new();
    for name in changes.cookbooks.changed_names() {
        for root in &config.cookbook_paths {
            let metadata = root.join(&name).join("metadata.rb");
            if !metadata.is_file() {
                continue;
            }
            let plan = bump::plan(&metadata, &name, |n| session.server.cookbook_versions(n))
                .with_context(|| format!("failed to plan the bump of {name}"))?;
            let BumpResult::Bumped { old, new } = &plan.result else {
                continue;
            };
            let display = display_path(&metadata, &config.repo_dir);
            pending.push(PendingBump {
                cookbook: name.clone(),
                from: old.to_string(),
                to: new.to_string(),
                diff: plan.unified_diff(&display).unwrap_or_default(),
            });
        }
    }
    Ok(pending)
}

fn display_path(path: &Path, repo_dir: &Path) -> String {
    path.strip_prefix(repo_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn print_summary(checkpoint: Option<&Checkpoint>, changes: &ChangeSet) {
    match checkpoint {
        Some(cp) => println!(
            "Checkpoint {} ({} ago)",
            cp.revision.to_string().bold(),
            format_age(cp.written_at)
        ),
        None => println!(
            "{} no checkpoint; the next sync uploads everything",
            "!".yellow()
        ),
    }

    if changes.is_empty() {
        println!("{} nothing to sync", "✓".green());
        return;
    }

    let rows: Vec<ChangeRow> = [&changes.cookbooks, &changes.roles, &changes.data_bags]
        .into_iter()
        .flat_map(|category| category.iter())
        .map(change_row)
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn change_row(change: &ArtifactChange) -> ChangeRow {
    let label = change.kind.to_string();
    let change_label = match change.kind {
        ChangeKind::Added => label.green().to_string(),
        ChangeKind::Changed => label.yellow().to_string(),
        ChangeKind::Deleted => label.red().to_string(),
    };
    ChangeRow {
        kind: change.artifact.kind.to_string(),
        artifact: change.artifact.key(),
        change: change_label,
    }
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{line}");
        }
    }
}
