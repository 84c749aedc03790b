//! The sync run: detect, test, bump, upload, checkpoint, push.
//!
//! Stages run in a fixed order. Only stages that have work are entered, and
//! every entered stage is recorded in [`SyncReport::stages`]. Whatever
//! happens in between, the run ends by checking out the base branch again:
//!
//! ```text
//! Start → EnsureRemote → EnterIntegrationBranch → DetectChanges
//!   → NoOpExit
//!   → HasChanges → OptionalTest → BumpVersions → CommitBumps
//!       → UploadDataBags → UploadRoles → UploadCookbooks
//!       → WriteCheckpoint → PushUpstream
//! → ReturnToBaseBranch
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::Utc;

use chefsync_core::{
    ports::{CommitOptions, CommitOutcome, ConfigServer, ValidationOutcome, Validator, Vcs},
    ArtifactRef, ChangeSet, Checkpoint, SyncConfig,
};
use chefsync_detector::ChangeDetector;

use crate::bump::{bump, BumpResult};
use crate::checkpoint::CheckpointStore;
use crate::environment_file::EnvironmentFile;
use crate::error::{io_err, json_err, SyncError};
use crate::publish::Upstream;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    EnsureRemote,
    EnterIntegrationBranch,
    DetectChanges,
    NoOpExit,
    HasChanges,
    OptionalTest,
    BumpVersions,
    CommitBumps,
    UploadDataBags,
    UploadRoles,
    UploadCookbooks,
    WriteCheckpoint,
    PushUpstream,
    ReturnToBaseBranch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::EnsureRemote => "ensure-remote",
            Stage::EnterIntegrationBranch => "enter-integration-branch",
            Stage::DetectChanges => "detect-changes",
            Stage::NoOpExit => "no-op-exit",
            Stage::HasChanges => "has-changes",
            Stage::OptionalTest => "optional-test",
            Stage::BumpVersions => "bump-versions",
            Stage::CommitBumps => "commit-bumps",
            Stage::UploadDataBags => "upload-data-bags",
            Stage::UploadRoles => "upload-roles",
            Stage::UploadCookbooks => "upload-cookbooks",
            Stage::WriteCheckpoint => "write-checkpoint",
            Stage::PushUpstream => "push-upstream",
            Stage::ReturnToBaseBranch => "return-to-base-branch",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No watched artifact changed since the checkpoint.
    NothingToDo,
    Synced { checkpoint: Checkpoint },
}

/// Everything a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub branch: String,
    pub stages: Vec<Stage>,
    pub changes: ChangeSet,
    pub bumps: Vec<(String, BumpResult)>,
    pub validations: Vec<(String, ValidationOutcome)>,
    pub outcome: SyncOutcome,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    config: &'a SyncConfig,
    vcs: &'a dyn Vcs,
    server: &'a dyn ConfigServer,
    validators: Vec<Box<dyn Validator + 'a>>,
}

/// Mutable state threaded through the stages of one run.
struct Run {
    branch: String,
    stages: Vec<Stage>,
    changes: ChangeSet,
    bumps: Vec<(String, BumpResult)>,
    validations: Vec<(String, ValidationOutcome)>,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        tracing::debug!("stage: {stage}");
        self.stages.push(stage);
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a SyncConfig, vcs: &'a dyn Vcs, server: &'a dyn ConfigServer) -> Self {
        Self {
            config,
            vcs,
            server,
            validators: Vec::new(),
        }
    }

    /// Validators run against changed cookbooks. An empty list skips testing.
    pub fn with_validators(mut self, validators: Vec<Box<dyn Validator + 'a>>) -> Self {
        self.validators = validators;
        self
    }

    /// Run one sync on the integration branch named by `build_id`.
    ///
    /// The base branch is checked out again before returning, on success and
    /// on failure. A stage error takes precedence over a failed checkout.
    pub fn run(&self, build_id: Option<&str>) -> Result<SyncReport, SyncError> {
        let mut run = Run {
            branch: integration_branch_name(build_id),
            stages: Vec::new(),
            changes: ChangeSet::default(),
            bumps: Vec::new(),
            validations: Vec::new(),
        };

        let result = self.run_stages(&mut run);

        run.enter(Stage::ReturnToBaseBranch);
        let cleanup = self.vcs.checkout_branch(&self.config.branch);

        let outcome = match (result, cleanup) {
            (Ok(outcome), Ok(_)) => outcome,
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(cleanup_err)) => {
                tracing::error!(
                    "Could not return to {} after a failed run: {cleanup_err}",
                    self.config.branch
                );
                return Err(e);
            }
        };

        Ok(SyncReport {
            branch: run.branch,
            stages: run.stages,
            changes: run.changes,
            bumps: run.bumps,
            validations: run.validations,
            outcome,
        })
    }

    fn run_stages(&self, run: &mut Run) -> Result<SyncOutcome, SyncError> {
        run.enter(Stage::Start);
        let upstream = Upstream::from_config(self.config)?;

        run.enter(Stage::EnsureRemote);
        upstream.ensure(self.vcs)?;

        run.enter(Stage::EnterIntegrationBranch);
        let checkout = self.vcs.checkout_branch(&run.branch)?;
        tracing::info!("On integration branch {} ({checkout:?})", run.branch);

        run.enter(Stage::DetectChanges);
        run.changes = self.detect()?;
        log_changes(&run.changes);

        if run.changes.is_empty() {
            run.enter(Stage::NoOpExit);
            tracing::info!("Nothing to do");
            return Ok(SyncOutcome::NothingToDo);
        }
        run.enter(Stage::HasChanges);

        let cookbooks = run.changes.cookbooks.changed_names();
        if !cookbooks.is_empty() {
            if !self.validators.is_empty() {
                run.enter(Stage::OptionalTest);
                self.test(&cookbooks, run)?;
            }

            run.enter(Stage::BumpVersions);
            self.bump_versions(&cookbooks, run)?;

            run.enter(Stage::CommitBumps);
            self.commit_bumps(&run.bumps)?;
        }

        let data_bags: Vec<ArtifactRef> = run.changes.data_bags.changed().cloned().collect();
        if !data_bags.is_empty() {
            run.enter(Stage::UploadDataBags);
            self.upload_data_bags(&data_bags)?;
        }

        let roles: Vec<PathBuf> = run
            .changes
            .roles
            .changed()
            .map(|r| r.path.clone())
            .collect();
        if !roles.is_empty() {
            run.enter(Stage::UploadRoles);
            self.server.create_or_update_role(&roles)?;
            tracing::info!("Uploaded {} role(s)", roles.len());
        }

        if !cookbooks.is_empty() {
            run.enter(Stage::UploadCookbooks);
            self.server.upload_cookbooks(
                &cookbooks,
                &self.config.env_to,
                self.config.cookbook_freeze,
            )?;
            tracing::info!(
                "Uploaded {} cookbook(s) to {}",
                cookbooks.len(),
                self.config.env_to
            );
            EnvironmentFile::new(self.vcs, self.server, self.config.environment_dir.clone())
                .regenerate(&self.config.env_to)?;
        }

        run.enter(Stage::WriteCheckpoint);
        let head = self.vcs.current_revision()?;
        let checkpoint = CheckpointStore::new(self.vcs).write(&head)?;

        run.enter(Stage::PushUpstream);
        upstream.push(self.vcs)?;

        Ok(SyncOutcome::Synced { checkpoint })
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn detect(&self) -> Result<ChangeSet, SyncError> {
        let detector = ChangeDetector::new(self.vcs, self.config.watched_roots());
        let changes = match CheckpointStore::new(self.vcs).read()? {
            Some(last) => {
                tracing::info!("Detecting changes since {last}");
                detector.detect_all(&last, &chefsync_core::Revision::head())?
            }
            None => {
                tracing::info!("No checkpoint found; scanning every artifact");
                detector.scan_everything()?
            }
        };
        Ok(changes)
    }

    fn test(&self, cookbooks: &[String], run: &mut Run) -> Result<(), SyncError> {
        let mut failed = Vec::new();
        for validator in &self.validators {
            let outcome = validator.check(
                cookbooks,
                &self.config.cookbook_paths,
                &self.config.foodcritic,
            )?;
            if outcome.passed {
                tracing::info!("{} passed: {}", validator.name(), outcome.summary);
            } else {
                tracing::error!("{} failed: {}", validator.name(), outcome.summary);
                failed.push(validator.name().to_string());
            }
            run.validations.push((validator.name().to_string(), outcome));
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation { failed })
        }
    }

    fn bump_versions(&self, cookbooks: &[String], run: &mut Run) -> Result<(), SyncError> {
        for name in cookbooks {
            for root in &self.config.cookbook_paths {
                let metadata = root.join(name).join("metadata.rb");
                if !metadata.is_file() {
                    continue;
                }
                let result = bump(&metadata, name, |n| self.server.cookbook_versions(n))?;
                run.bumps.push((name.clone(), result));
            }
        }
        Ok(())
    }

    /// Commit the rewritten metadata files. Only cookbooks whose version
    /// actually moved are named in the message.
    fn commit_bumps(&self, bumps: &[(String, BumpResult)]) -> Result<(), SyncError> {
        let bumped: Vec<&str> = bumps
            .iter()
            .filter(|(_, result)| matches!(result, BumpResult::Bumped { .. }))
            .map(|(name, _)| name.as_str())
            .collect();
        if bumped.is_empty() {
            tracing::debug!("No cookbook versions moved; nothing to commit");
            return Ok(());
        }
        let message = format!(
            "{} cookbooks patch levels updated by chefsync\n\n{}",
            bumped.len(),
            bumped.join("\n")
        );
        match self.vcs.commit(&message, CommitOptions::add_all())? {
            CommitOutcome::Committed { revision } => {
                tracing::info!("Cookbook versions updated in {revision}");
            }
            CommitOutcome::NothingToCommit => tracing::debug!("Nothing to commit"),
        }
        Ok(())
    }

    fn upload_data_bags(&self, items: &[ArtifactRef]) -> Result<(), SyncError> {
        let mut by_bag: BTreeMap<&str, Vec<&ArtifactRef>> = BTreeMap::new();
        for item in items {
            by_bag.entry(item.name.as_str()).or_default().push(item);
        }
        for (bag, items) in by_bag {
            let provisioned = self.server.ensure_data_bag(bag)?;
            tracing::debug!("data bag {bag}: {provisioned:?}");
            for item in items {
                let raw = std::fs::read_to_string(&item.path).map_err(|e| io_err(&item.path, e))?;
                let data: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| json_err(&item.path, e))?;
                let id = data
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| item.item.clone())
                    .unwrap_or_default();
                self.server.create_or_update_data_bag_item(bag, &id, &data)?;
                tracing::info!("Uploaded data bag item {bag}/{id}");
            }
        }
        Ok(())
    }
}

/// `build_id` when given, else `manual-<unix-ts>`.
pub fn integration_branch_name(build_id: Option<&str>) -> String {
    match build_id.map(str::trim).filter(|b| !b.is_empty()) {
        Some(id) => id.to_string(),
        None => format!("manual-{}", Utc::now().timestamp()),
    }
}

fn log_changes(changes: &ChangeSet) {
    for kind in chefsync_core::ArtifactKind::upload_order() {
        let category = changes.get(*kind);
        let changed = category.changed_names();
        if changed.is_empty() {
            tracing::info!("No {} have changed", kind.plural());
        } else {
            tracing::info!("Changed {}: {}", kind.plural(), changed.join(", "));
        }
        for deleted in category.deleted() {
            tracing::warn!("{deleted} was deleted; it is not removed from the server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_id_names_the_branch() {
        assert_eq!(integration_branch_name(Some("jenkins-ops-42")), "jenkins-ops-42");
    }

    #[test]
    fn missing_or_blank_build_id_falls_back_to_manual() {
        for id in [None, Some(""), Some("  ")] {
            let name = integration_branch_name(id);
            let ts = name.strip_prefix("manual-").expect("manual- prefix");
            assert!(ts.parse::<i64>().is_ok(), "{name}");
        }
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Start < Stage::EnsureRemote);
        assert!(Stage::UploadDataBags < Stage::UploadRoles);
        assert!(Stage::UploadRoles < Stage::UploadCookbooks);
        assert!(Stage::PushUpstream < Stage::ReturnToBaseBranch);
    }
}
