//! Subcommands and the setup they share.

pub mod load;
pub mod prop;
pub mod save;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use chefsync_core::{config, ConfigOverrides, SyncConfig};
use chefsync_shell::{GitCli, Knife, KnifeServer};

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file or http(s) URL (default: ./chefsync.yaml, then
    /// ~/.chef/chefsync.yaml).
    #[arg(short = 'c', long, global = true, value_name = "PATH|URL")]
    pub config: Option<PathBuf>,

    /// Chef client node name.
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Chef client key.
    #[arg(short = 'k', long, global = true, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Chef server URL.
    #[arg(short = 's', long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Validators to run before bumping, e.g. `ruby,foodcritic`.
    #[arg(short = 'T', long = "test", global = true, value_delimiter = ',')]
    pub tests: Option<Vec<String>>,

    /// Freeze uploaded cookbook versions.
    #[arg(short = 'F', long, global = true)]
    pub freeze: bool,

    /// Log at debug level.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tests: self.tests.clone(),
            freeze: self.freeze,
            node_name: self.user.clone(),
            client_key: self.key.clone(),
            server_url: self.server_url.clone(),
            ..ConfigOverrides::default()
        }
    }

    /// Locate, load and override the configuration.
    ///
    /// A missing file is not an error: defaults resolved against the working
    /// directory are used instead. A URL is always fetched, and a failed
    /// fetch is a configuration error.
    pub fn load_config(&self, extra: ConfigOverrides) -> Result<SyncConfig> {
        let cwd = std::env::current_dir().context("could not determine working directory")?;
        let remote = self
            .config
            .as_deref()
            .and_then(|c| c.to_str())
            .filter(|c| config::is_url(c));
        let mut config = if let Some(url) = remote {
            tracing::debug!("fetching configuration from {url}");
            config::load_url(url, &cwd)?
        } else {
            match config::locate(self.config.as_deref(), &cwd)? {
                Some(path) => {
                    tracing::debug!("using configuration {}", path.display());
                    config::load_at(&path)?
                }
                None => {
                    match &self.config {
                        Some(explicit) => tracing::warn!(
                            "configuration {} not found; using defaults",
                            explicit.display()
                        ),
                        None => tracing::warn!(
                            "no {} found; using defaults",
                            config::CONFIG_FILE_NAME
                        ),
                    }
                    SyncConfig::default().resolved(&cwd)
                }
            }
        };
        self.overrides().apply(&mut config);
        extra.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// The collaborators every subcommand talks to.
pub struct Session {
    pub config: SyncConfig,
    pub knife: Knife,
    pub vcs: GitCli,
    pub server: KnifeServer,
}

impl Session {
    pub fn open(global: &GlobalArgs, extra: ConfigOverrides) -> Result<Self> {
        let config = global.load_config(extra)?;
        let knife = Knife::new(config.knife.clone());
        let vcs = GitCli::new(&config.repo_dir, &config.git_user, &config.git_email);
        let server = KnifeServer::new(knife.clone(), config.cookbook_paths.clone());
        Ok(Self {
            config,
            knife,
            vcs,
            server,
        })
    }
}
