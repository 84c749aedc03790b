//! YAML configuration for a chefsync run.
//!
//! # Lookup order
//!
//! ```text
//! --config <path or url>     (explicit; http:// and https:// are fetched)
//! ./chefsync.yaml            (working directory)
//! ~/.chef/chefsync.yaml      (home)
//! ```
//!
//! # API pattern
//!
//! As with every home-relative lookup here:
//! - `fn_at(home: &Path, …)` takes an explicit home; tests use it with `TempDir`
//! - `fn(…)` derives home from `dirs::home_dir()` and delegates to `_at`
//!
//! Relative paths inside the file are resolved against `repo_dir`, and a
//! relative `repo_dir` is resolved against the directory holding the file.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ports::LintOptions;
use crate::types::WatchedRoots;

/// File name searched for in the working directory and `~/.chef/`.
pub const CONFIG_FILE_NAME: &str = "chefsync.yaml";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What `load` does when the requested snapshot tag does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingSnapshotPolicy {
    /// Report and exit zero.
    Succeed,
    /// Report and exit non-zero.
    #[default]
    Fail,
}

/// Credentials and endpoint handed to `knife`. Unset values are left to
/// knife's own configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct KnifeConfig {
    pub config: Option<PathBuf>,
    pub server_url: Option<String>,
    pub node_name: Option<String>,
    pub client_key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub repo_dir: PathBuf,
    /// Canonical upstream URL, registered as `remote`.
    pub repo_url: Option<String>,
    pub git_user: String,
    pub git_email: String,
    pub remote: String,
    /// Base branch: pushed to, and returned to after every run.
    pub branch: String,
    pub env_to: String,
    pub env_from: Option<String>,
    pub cookbook_paths: Vec<PathBuf>,
    pub role_paths: Vec<PathBuf>,
    pub data_bag_paths: Vec<PathBuf>,
    pub environment_dir: PathBuf,
    /// Validator names run before bumping, e.g. `ruby`, `foodcritic`.
    pub tests: Vec<String>,
    pub cookbook_freeze: bool,
    pub foodcritic: LintOptions,
    pub knife: KnifeConfig,
    pub snapshot_bag: String,
    pub on_missing_snapshot: MissingSnapshotPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            repo_url: None,
            git_user: "chefsync".to_string(),
            git_email: "chefsync@localhost".to_string(),
            remote: "upstream".to_string(),
            branch: "master".to_string(),
            env_to: "_default".to_string(),
            env_from: None,
            cookbook_paths: vec![PathBuf::from("cookbooks"), PathBuf::from("site-cookbooks")],
            role_paths: vec![PathBuf::from("roles")],
            data_bag_paths: vec![PathBuf::from("data_bags")],
            environment_dir: PathBuf::from("environments"),
            tests: Vec::new(),
            cookbook_freeze: false,
            foodcritic: LintOptions::default(),
            knife: KnifeConfig::default(),
            snapshot_bag: "chefsync_snapshots".to_string(),
            on_missing_snapshot: MissingSnapshotPolicy::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub env_to: Option<String>,
    pub env_from: Option<String>,
    pub tests: Option<Vec<String>>,
    pub freeze: bool,
    pub node_name: Option<String>,
    pub client_key: Option<PathBuf>,
    pub server_url: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut SyncConfig) {
        if let Some(env_to) = self.env_to {
            config.env_to = env_to;
        }
        if let Some(env_from) = self.env_from {
            config.env_from = Some(env_from);
        }
        if let Some(tests) = self.tests {
            config.tests = tests;
        }
        if self.freeze {
            config.cookbook_freeze = true;
        }
        if let Some(node_name) = self.node_name {
            config.knife.node_name = Some(node_name);
        }
        if let Some(client_key) = self.client_key {
            config.knife.client_key = Some(client_key);
        }
        if let Some(server_url) = self.server_url {
            config.knife.server_url = Some(server_url);
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup and load
// ---------------------------------------------------------------------------

/// Return the first config file that exists, in lookup order.
///
/// An explicit path is returned only if it exists; callers decide whether a
/// missing explicit file is worth a warning.
pub fn locate_at(explicit: Option<&Path>, cwd: &Path, home: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        let path = cwd.join(path);
        return path.is_file().then_some(path);
    }
    [
        cwd.join(CONFIG_FILE_NAME),
        home.join(".chef").join(CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// `locate_at` convenience wrapper.
pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(locate_at(explicit, cwd, &home))
}

/// Load and resolve the config at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed.
pub fn load_at(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse(&contents, path, base)
}

/// Whether `location` names a remote config rather than a file.
pub fn is_url(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Download and resolve the config at `url`.
///
/// Relative paths inside it are resolved against `base`, normally the working
/// directory. Transport failures and non-2xx statuses are
/// `ConfigError::Fetch`; malformed YAML is `ConfigError::Parse` with the URL
/// as its path.
pub fn load_url(url: &str, base: &Path) -> Result<SyncConfig, ConfigError> {
    let agent = ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build();
    let response = agent.get(url).call().map_err(|e| ConfigError::Fetch {
        url: url.to_string(),
        detail: match e {
            ureq::Error::Status(code, _) => format!("HTTP {code}"),
            ureq::Error::Transport(t) => t.to_string(),
        },
    })?;
    let contents = response.into_string().map_err(|e| ConfigError::Fetch {
        url: url.to_string(),
        detail: e.to_string(),
    })?;
    parse(&contents, Path::new(url), base)
}

fn parse(contents: &str, origin: &Path, base: &Path) -> Result<SyncConfig, ConfigError> {
    let config: SyncConfig = if contents.trim().is_empty() {
        SyncConfig::default()
    } else {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?
    };
    let config = config.resolved(base);
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Resolution and derived values
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Make every path absolute: `repo_dir` against `base`, the rest against
    /// `repo_dir`. Purely lexical; nothing has to exist yet.
    pub fn resolved(mut self, base: &Path) -> Self {
        self.repo_dir = normalize_path(&base.join(&self.repo_dir));
        let repo = self.repo_dir.clone();
        let resolve = |paths: &mut Vec<PathBuf>| {
            for p in paths.iter_mut() {
                *p = normalize_path(&repo.join(&*p));
            }
        };
        resolve(&mut self.cookbook_paths);
        resolve(&mut self.role_paths);
        resolve(&mut self.data_bag_paths);
        resolve(&mut self.foodcritic.include_rules);
        self.environment_dir = normalize_path(&repo.join(&self.environment_dir));
        if let Some(key) = self.knife.client_key.take() {
            self.knife.client_key = Some(normalize_path(&base.join(key)));
        }
        if let Some(cfg) = self.knife.config.take() {
            self.knife.config = Some(normalize_path(&base.join(cfg)));
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.trim().is_empty() {
            return Err(ConfigError::Invalid("`remote` must not be empty".to_string()));
        }
        if self.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("`branch` must not be empty".to_string()));
        }
        if self.env_to.trim().is_empty() {
            return Err(ConfigError::Invalid("`env_to` must not be empty".to_string()));
        }
        if !is_record_id(&self.snapshot_bag) {
            return Err(ConfigError::Invalid(format!(
                "`snapshot_bag` '{}' may only contain letters, digits, '_' and '-'",
                self.snapshot_bag
            )));
        }
        Ok(())
    }

    /// Upstream URL, required by `sync` and `prop`.
    pub fn require_repo_url(&self) -> Result<&str, ConfigError> {
        self.repo_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid("`repo_url` is required".to_string()))
    }

    pub fn watched_roots(&self) -> WatchedRoots {
        WatchedRoots {
            cookbooks: self.cookbook_paths.clone(),
            roles: self.role_paths.clone(),
            data_bags: self.data_bag_paths.clone(),
        }
    }

    /// `<environment_dir>/<env>.json`
    pub fn environment_file(&self, environment: &str) -> PathBuf {
        self.environment_dir.join(format!("{environment}.json"))
    }
}

/// Whether `id` is usable as a data bag or data bag item name.
pub fn is_record_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Lexically normalize `path`: drop `.` and trailing separators, fold `..`.
/// Does not touch the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
