//! Environment snapshots: save, load and propagate cookbook version maps.
//!
//! Snapshots are items in one data bag, keyed by tag. Untagged saves draw
//! their tag from a counter item in the same bag:
//!
//! ```json
//! {"id": "generation", "tag": "0_3"}
//! ```
//!
//! The counter only ever increments its minor component.

use chrono::Utc;
use serde_json::json;

use chefsync_core::{
    config::is_record_id,
    ports::{ConfigServer, Provisioned, Vcs},
    Environment, GenerationTag, Snapshot, SyncConfig,
};

use crate::environment_file::EnvironmentFile;
use crate::error::SyncError;
use crate::publish::Upstream;

/// Item id of the generation counter.
pub const GENERATION_ITEM: &str = "generation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored(Snapshot),
    /// No snapshot has this tag. Nothing was changed.
    NotFound { tag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropOutcome {
    Synced,
    AlreadyInSync,
}

pub struct SnapshotManager<'a> {
    vcs: &'a dyn Vcs,
    server: &'a dyn ConfigServer,
    bag: String,
    environments: EnvironmentFile<'a>,
    remote: String,
    repo_url: Option<String>,
    branch: String,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(config: &SyncConfig, vcs: &'a dyn Vcs, server: &'a dyn ConfigServer) -> Self {
        Self {
            vcs,
            server,
            bag: config.snapshot_bag.clone(),
            environments: EnvironmentFile::new(vcs, server, config.environment_dir.clone()),
            remote: config.remote.clone(),
            repo_url: config.repo_url.clone(),
            branch: config.branch.clone(),
        }
    }

    /// Store `environment`'s version map under `tag`, or under the next
    /// generation tag when `tag` is `None`.
    pub fn save(&self, environment: &str, tag: Option<&str>) -> Result<Snapshot, SyncError> {
        if let Some(tag) = tag {
            validate_tag(tag)?;
        }
        let env = self.load_environment(environment)?;

        match self.server.ensure_data_bag(&self.bag)? {
            Provisioned::Created => tracing::info!("Created data bag {}", self.bag),
            Provisioned::AlreadyExists => {
                tracing::debug!("Data bag {} already exists", self.bag)
            }
        }

        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => self.next_generation()?.to_string(),
        };

        let snapshot = Snapshot {
            tag: tag.clone(),
            environment: env.name.clone(),
            cookbook_versions: env.cookbook_versions.clone(),
            created_at: Utc::now(),
        };
        let data = serde_json::to_value(&snapshot).map_err(|source| SyncError::MalformedRecord {
            bag: self.bag.clone(),
            item: tag.clone(),
            source,
        })?;
        self.server
            .create_or_update_data_bag_item(&self.bag, &tag, &data)?;
        tracing::info!(
            "Saved {} cookbook versions of {} as {}/{tag}",
            snapshot.cookbook_versions.len(),
            env.name,
            self.bag
        );

        self.environments.write_and_commit(&env)?;
        Ok(snapshot)
    }

    /// Restore `environment` from the snapshot tagged `tag`, then publish.
    pub fn load(&self, environment: &str, tag: &str) -> Result<LoadOutcome, SyncError> {
        validate_tag(tag)?;
        let upstream = self.upstream()?;

        let Some(raw) = self.server.load_data_bag_item(&self.bag, tag)? else {
            tracing::warn!("No snapshot {}/{tag}; nothing to restore", self.bag);
            return Ok(LoadOutcome::NotFound {
                tag: tag.to_string(),
            });
        };
        let snapshot: Snapshot =
            serde_json::from_value(raw).map_err(|source| SyncError::MalformedRecord {
                bag: self.bag.clone(),
                item: tag.to_string(),
                source,
            })?;

        let mut env = self.load_environment(environment)?;
        if snapshot.environment != env.name {
            tracing::warn!(
                "Snapshot {tag} was taken from {}; restoring it into {}",
                snapshot.environment,
                env.name
            );
        }
        upstream.ensure(self.vcs)?;

        env.cookbook_versions = snapshot.cookbook_versions.clone();
        env.restored_from_tag = Some(tag.to_string());
        self.server.save_environment(&env)?;
        tracing::info!("Restored {} from {}/{tag}", env.name, self.bag);

        self.environments.write_and_commit(&env)?;
        upstream.push(self.vcs)?;
        Ok(LoadOutcome::Restored(snapshot))
    }

    /// Copy `from`'s version map onto `to` and publish.
    pub fn prop(&self, from: &str, to: &str) -> Result<PropOutcome, SyncError> {
        let upstream = self.upstream()?;
        let source = self.load_environment(from)?;
        let mut target = self.load_environment(to)?;

        if source.cookbook_versions == target.cookbook_versions {
            tracing::info!("{from} and {to} are already in sync");
            return Ok(PropOutcome::AlreadyInSync);
        }

        target.cookbook_versions = source.cookbook_versions;
        self.server.save_environment(&target)?;
        tracing::info!("Propagated cookbook versions from {from} to {to}");

        self.environments.write_and_commit(&target)?;
        upstream.ensure(self.vcs)?;
        upstream.push(self.vcs)?;
        Ok(PropOutcome::Synced)
    }

    fn load_environment(&self, name: &str) -> Result<Environment, SyncError> {
        self.server
            .load_environment(name)?
            .ok_or_else(|| SyncError::EnvironmentNotFound {
                name: name.to_string(),
            })
    }

    fn upstream(&self) -> Result<Upstream, SyncError> {
        let url = self
            .repo_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                chefsync_core::ConfigError::Invalid("`repo_url` is required".to_string())
            })?;
        Ok(Upstream::new(&self.remote, url, &self.branch))
    }

    /// Read, advance and persist the generation counter.
    fn next_generation(&self) -> Result<GenerationTag, SyncError> {
        let next = match self.server.load_data_bag_item(&self.bag, GENERATION_ITEM)? {
            None => GenerationTag::FIRST,
            Some(record) => {
                let value = record.get("tag").and_then(|t| t.as_str()).ok_or_else(|| {
                    SyncError::MalformedGeneration {
                        value: record.to_string(),
                    }
                })?;
                let current: GenerationTag =
                    value.parse().map_err(|_| SyncError::MalformedGeneration {
                        value: value.to_string(),
                    })?;
                current.next().ok_or_else(|| SyncError::GenerationOverflow {
                    tag: current.to_string(),
                })?
            }
        };
        let counter = json!({ "id": GENERATION_ITEM, "tag": next.to_string() });
        self.server
            .create_or_update_data_bag_item(&self.bag, GENERATION_ITEM, &counter)?;
        tracing::debug!("Generation counter advanced to {next}");
        Ok(next)
    }
}

fn validate_tag(tag: &str) -> Result<(), SyncError> {
    let reason = if !is_record_id(tag) {
        "tags may only contain letters, digits, '_' and '-'"
    } else if tag == GENERATION_ITEM {
        "'generation' is reserved for the tag counter"
    } else {
        return Ok(());
    };
    Err(SyncError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.to_string(),
    })
}
