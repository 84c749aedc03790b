//! Upstream remote registration and push.

use chefsync_core::{
    ports::{RemoteStatus, Vcs},
    ConfigError, SyncConfig,
};

use crate::error::SyncError;

/// The canonical remote a run publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub remote: String,
    pub url: String,
    pub branch: String,
}

impl Upstream {
    pub fn new(
        remote: impl Into<String>,
        url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            remote: remote.into(),
            url: url.into(),
            branch: branch.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.remote.clone(),
            config.require_repo_url()?,
            config.branch.clone(),
        ))
    }

    /// `HEAD:<branch>`
    pub fn refspec(&self) -> String {
        format!("HEAD:{}", self.branch)
    }

    /// Register the remote. An existing remote of the same name is success.
    pub fn ensure(&self, vcs: &dyn Vcs) -> Result<RemoteStatus, SyncError> {
        let status = vcs.add_remote(&self.remote, &self.url)?;
        match &status {
            RemoteStatus::Added => {
                tracing::info!("Added remote {} -> {}", self.remote, self.url);
            }
            RemoteStatus::AlreadyExists { url } if url != &self.url => {
                tracing::warn!(
                    "Remote {} already points at {url}, not {}; leaving it",
                    self.remote,
                    self.url
                );
            }
            RemoteStatus::AlreadyExists { .. } => {
                tracing::debug!("We already added the {} remote - skipping", self.remote);
            }
        }
        Ok(status)
    }

    pub fn push(&self, vcs: &dyn Vcs) -> Result<(), SyncError> {
        let refspec = self.refspec();
        tracing::info!("Pushing {refspec} to {}", self.remote);
        vcs.push(&self.remote, &refspec)?;
        Ok(())
    }
}
