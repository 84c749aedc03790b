//! `environments/<env>.json`, regenerated from the server's copy.

use std::path::{Path, PathBuf};

use chefsync_core::{
    ports::{CommitOptions, CommitOutcome, ConfigServer, Vcs},
    Environment,
};

use crate::error::{json_err, SyncError};
use crate::writer::{atomic_write, WriteResult};

/// Pretty JSON with every object's keys sorted, plus a trailing newline.
///
/// `serde_json::Map` is ordered by key unless `preserve_order` is enabled,
/// which this workspace never does.
pub fn render(environment: &Environment, path: &Path) -> Result<String, SyncError> {
    let value = serde_json::to_value(environment).map_err(|e| json_err(path, e))?;
    let mut out = serde_json::to_string_pretty(&value).map_err(|e| json_err(path, e))?;
    out.push('\n');
    Ok(out)
}

/// Result of [`EnvironmentFile::regenerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regenerated {
    pub path: PathBuf,
    pub write: WriteResult,
    pub commit: CommitOutcome,
}

pub struct EnvironmentFile<'a> {
    vcs: &'a dyn Vcs,
    server: &'a dyn ConfigServer,
    dir: PathBuf,
}

impl<'a> EnvironmentFile<'a> {
    pub fn new(vcs: &'a dyn Vcs, server: &'a dyn ConfigServer, dir: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            server,
            dir: dir.into(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Reload `name` from the server and commit its file.
    pub fn regenerate(&self, name: &str) -> Result<Regenerated, SyncError> {
        let environment = self
            .server
            .load_environment(name)?
            .ok_or_else(|| SyncError::EnvironmentNotFound {
                name: name.to_string(),
            })?;
        self.write_and_commit(&environment)
    }

    /// Write `environment` and commit it, even when nothing changed.
    pub fn write_and_commit(&self, environment: &Environment) -> Result<Regenerated, SyncError> {
        let path = self.path_for(&environment.name);
        let content = render(environment, &path)?;
        let write = atomic_write(&path, &content)?;
        self.vcs.add(std::slice::from_ref(&path))?;
        let message = format!(
            "Updating {} with the latest cookbook versions",
            environment.name
        );
        let commit = self.vcs.commit(&message, CommitOptions::allow_empty())?;
        tracing::info!("Wrote {} ({})", path.display(), environment.name);
        Ok(Regenerated {
            path,
            write,
            commit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_sorts_keys_at_every_level() {
        let mut env = Environment::new("ops");
        env.cookbook_versions.insert("zlib".into(), "1.0.0".into());
        env.cookbook_versions.insert("apache".into(), "0.99.5".into());
        env.other.insert(
            "override_attributes".into(),
            serde_json::json!({"z": 1, "a": {"y": 2, "b": 3}}),
        );
        env.other
            .insert("description".into(), serde_json::json!("Operations"));

        let out = render(&env, Path::new("ops.json")).unwrap();
        assert!(out.ends_with("}\n"));
        let pos = |needle: &str| out.find(needle).unwrap_or_else(|| panic!("{needle}"));
        assert!(pos("\"cookbook_versions\"") < pos("\"description\""));
        assert!(pos("\"description\"") < pos("\"name\""));
        assert!(pos("\"apache\"") < pos("\"zlib\""));
        assert!(pos("\"b\": 3") < pos("\"y\": 2"));
        assert!(!out.contains("restored_from_tag"));
    }

    #[test]
    fn render_includes_restored_tag_when_set() {
        let mut env = Environment::new("ops");
        env.restored_from_tag = Some("0_3".into());
        let out = render(&env, Path::new("ops.json")).unwrap();
        assert!(out.contains("\"restored_from_tag\": \"0_3\""));
    }
}
