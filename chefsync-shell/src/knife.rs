//! [`ConfigServer`] over the `knife` command line.
//!
//! Reads use `-F json`. Writes go through a temporary JSON file and
//! `knife ... from file`, the same path a human would take.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::Deserialize;

use chefsync_core::{
    config::KnifeConfig,
    ports::{ConfigServer, Provisioned},
    Environment, ServerError,
};

// ---------------------------------------------------------------------------
// Command builder
// ---------------------------------------------------------------------------

/// `knife` plus the connection flags from configuration.
#[derive(Debug, Clone)]
pub struct Knife {
    program: String,
    config: KnifeConfig,
}

impl Knife {
    pub fn new(config: KnifeConfig) -> Self {
        Self {
            program: "knife".to_string(),
            config,
        }
    }

    /// Use another executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Connection flags, in the order knife documents them.
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config.config {
            args.push("-c".to_string());
            args.push(config.display().to_string());
        }
        if let Some(url) = &self.config.server_url {
            args.push("-s".to_string());
            args.push(url.clone());
        }
        if let Some(node) = &self.config.node_name {
            args.push("-u".to_string());
            args.push(node.clone());
        }
        if let Some(key) = &self.config.client_key {
            args.push("-k".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    pub fn command<S: AsRef<str>>(&self, args: &[S]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(AsRef::as_ref))
            .args(self.connection_args());
        cmd
    }

    fn display<S: AsRef<str>>(&self, args: &[S]) -> String {
        let joined: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        format!("{} {}", self.program, joined.join(" "))
    }

    fn output<S: AsRef<str>>(&self, args: &[S]) -> Result<Output, ServerError> {
        tracing::debug!("{}", self.display(args));
        self.command(args)
            .output()
            .map_err(|source| ServerError::Io {
                command: self.display(args),
                source,
            })
    }

    /// Run and require success; returns stdout.
    fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, ServerError> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(self.failed(args, &output))
        }
    }

    /// Run a read; a "not found" answer is `None`.
    fn read<S: AsRef<str>>(&self, args: &[S]) -> Result<Option<String>, ServerError> {
        let output = self.output(args)?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        if is_not_found(&String::from_utf8_lossy(&output.stderr)) {
            return Ok(None);
        }
        Err(self.failed(args, &output))
    }

    fn failed<S: AsRef<str>>(&self, args: &[S], output: &Output) -> ServerError {
        ServerError::CommandFailed {
            command: self.display(args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Whether knife's stderr reports a missing object.
pub(crate) fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("404") || lower.contains("not found") || lower.contains("cannot find")
}

// ---------------------------------------------------------------------------
// Cookbook version listings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

/// Shapes knife prints for `cookbook show <name> -F json`, across releases.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VersionListing {
    Plain(Vec<String>),
    Detailed { versions: Vec<VersionEntry> },
    Keyed(BTreeMap<String, VersionListing>),
}

impl VersionListing {
    fn collect(self, out: &mut BTreeSet<String>) {
        match self {
            VersionListing::Plain(versions) => out.extend(versions),
            VersionListing::Detailed { versions } => {
                out.extend(versions.into_iter().map(|v| v.version))
            }
            VersionListing::Keyed(map) => {
                for listing in map.into_values() {
                    listing.collect(out);
                }
            }
        }
    }
}

pub(crate) fn parse_versions(raw: &str) -> Result<BTreeSet<String>, serde_json::Error> {
    let listing: VersionListing = serde_json::from_str(raw)?;
    let mut versions = BTreeSet::new();
    listing.collect(&mut versions);
    Ok(versions)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A Chef server reached through `knife`.
#[derive(Debug, Clone)]
pub struct KnifeServer {
    knife: Knife,
    cookbook_paths: Vec<PathBuf>,
}

impl KnifeServer {
    pub fn new(knife: Knife, cookbook_paths: Vec<PathBuf>) -> Self {
        Self {
            knife,
            cookbook_paths,
        }
    }

    /// Write `data` as `<name>.json` in a fresh temp dir and run
    /// `knife <args> <file>`.
    fn from_file(
        &self,
        args: &[&str],
        name: &str,
        data: &serde_json::Value,
    ) -> Result<(), ServerError> {
        let dir = tempfile::tempdir().map_err(|source| ServerError::Io {
            command: "create temp dir".to_string(),
            source,
        })?;
        let path = dir.path().join(format!("{name}.json"));
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, content).map_err(|source| ServerError::Io {
            command: format!("write {}", path.display()),
            source,
        })?;
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.push(path.display().to_string());
        self.knife.run(full.as_slice()).map(|_| ())
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":")
}

impl ConfigServer for KnifeServer {
    fn cookbook_versions(&self, cookbook: &str) -> Result<Option<BTreeSet<String>>, ServerError> {
        let Some(raw) = self
            .knife
            .read(&["cookbook", "show", cookbook, "-F", "json"])?
        else {
            return Ok(None);
        };
        let versions = parse_versions(&raw)?;
        Ok((!versions.is_empty()).then_some(versions))
    }

    fn upload_cookbooks(
        &self,
        names: &[String],
        environment: &str,
        freeze: bool,
    ) -> Result<(), ServerError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = vec!["cookbook".into(), "upload".into()];
        args.extend(names.iter().cloned());
        args.push("-E".into());
        args.push(environment.to_string());
        if !self.cookbook_paths.is_empty() {
            args.push("-o".into());
            args.push(join_paths(&self.cookbook_paths));
        }
        if freeze {
            args.push("--freeze".into());
        }
        self.knife.run(args.as_slice()).map(|_| ())
    }

    fn create_or_update_role(&self, paths: &[PathBuf]) -> Result<(), ServerError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = vec!["role".into(), "from".into(), "file".into()];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        self.knife.run(args.as_slice()).map(|_| ())
    }

    fn ensure_data_bag(&self, bag: &str) -> Result<Provisioned, ServerError> {
        if self
            .knife
            .read(&["data", "bag", "show", bag, "-F", "json"])?
            .is_some()
        {
            return Ok(Provisioned::AlreadyExists);
        }
        self.knife.run(&["data", "bag", "create", bag])?;
        Ok(Provisioned::Created)
    }

    fn create_or_update_data_bag_item(
        &self,
        bag: &str,
        item: &str,
        data: &serde_json::Value,
    ) -> Result<(), ServerError> {
        let mut data = data.clone();
        if let Some(object) = data.as_object_mut() {
            object
                .entry("id")
                .or_insert_with(|| serde_json::Value::String(item.to_string()));
        }
        self.from_file(&["data", "bag", "from", "file", bag], item, &data)
    }

    fn load_data_bag_item(
        &self,
        bag: &str,
        item: &str,
    ) -> Result<Option<serde_json::Value>, ServerError> {
        match self
            .knife
            .read(&["data", "bag", "show", bag, item, "-F", "json"])?
        {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn load_environment(&self, name: &str) -> Result<Option<Environment>, ServerError> {
        match self
            .knife
            .read(&["environment", "show", name, "-F", "json"])?
        {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_environment(&self, environment: &Environment) -> Result<(), ServerError> {
        let data = serde_json::to_value(environment)?;
        self.from_file(&["environment", "from", "file"], &environment.name, &data)
    }
}

/// Search path for `knife cookbook test -o`.
pub(crate) fn cookbook_search_path(paths: &[PathBuf]) -> String {
    join_paths(paths)
}

pub(crate) fn existing_cookbook_dirs(paths: &[PathBuf], cookbooks: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for root in paths {
        for name in cookbooks {
            let dir = root.join(name);
            if dir.is_dir() {
                dirs.push(dir);
            }
        }
    }
    dirs
}
