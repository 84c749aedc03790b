//! In-memory recording fakes of the VCS, server and validator ports.
//!
//! Every side effect is appended to a shared call log so tests can assert on
//! both the set and the order of operations.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chefsync_core::{
    ports::{
        BranchCheckout, CommitOptions, CommitOutcome, ConfigServer, FileChange, LintOptions,
        Provisioned, RemoteStatus, ValidationOutcome, Validator, Vcs,
    },
    Environment, Revision, ServerError, SyncConfig, ValidatorError, VcsError,
};
use serde_json::Value;
use tempfile::TempDir;

pub type CallLog = Rc<RefCell<Vec<String>>>;

pub fn new_log() -> CallLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.borrow().clone()
}

pub fn calls_with_prefix(log: &CallLog, prefix: &str) -> Vec<String> {
    log.borrow()
        .iter()
        .filter(|c| c.starts_with(prefix))
        .cloned()
        .collect()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// VCS
// ---------------------------------------------------------------------------

pub const HEAD_SHA: &str = "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00";

pub struct RecordingVcs {
    dir: TempDir,
    pub log: CallLog,
    pub changed: Vec<FileChange>,
    pub known_revisions: HashSet<String>,
    pub existing_remote: Option<String>,
    pub fail_checkout_of: Option<String>,
    pub fail_push: bool,
    commits: Cell<usize>,
}

impl RecordingVcs {
    pub fn new(log: &CallLog) -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
            log: Rc::clone(log),
            changed: Vec::new(),
            known_revisions: [HEAD_SHA.to_string()].into_iter().collect(),
            existing_remote: None,
            fail_checkout_of: None,
            fail_push: false,
            commits: Cell::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` at `relative`, creating parents.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, content).expect("write");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.dir.path().join(relative)).expect("read")
    }

    /// Record a checkpoint as if a previous run had written it.
    pub fn with_checkpoint(mut self, revision: &str) -> Self {
        self.write(".chefsync_last_commit", revision);
        self.known_revisions.insert(revision.to_string());
        self
    }

    pub fn config(&self) -> SyncConfig {
        SyncConfig {
            repo_url: Some("ssh://git@git.example.com/chef-repo".to_string()),
            ..SyncConfig::default()
        }
        .resolved(self.dir.path())
    }

    fn record(&self, call: String) {
        self.log.borrow_mut().push(call);
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(self.dir.path())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn failed(command: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: "simulated failure".to_string(),
    }
}

impl Vcs for RecordingVcs {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    fn changed_files(&self, from: &Revision, to: &Revision) -> Result<Vec<FileChange>, VcsError> {
        self.record(format!("vcs.diff {from} {to}"));
        Ok(self.changed.clone())
    }

    fn exists_at(&self, _revision: &Revision, path: &Path) -> Result<bool, VcsError> {
        Ok(self.dir.path().join(path).exists())
    }

    fn current_revision(&self) -> Result<Revision, VcsError> {
        Ok(Revision::from(HEAD_SHA))
    }

    fn revision_exists(&self, revision: &Revision) -> Result<bool, VcsError> {
        Ok(self.known_revisions.contains(revision.as_str()))
    }

    fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let rel: Vec<String> = paths.iter().map(|p| self.relative(p)).collect();
        self.record(format!("vcs.add {}", rel.join(" ")));
        Ok(())
    }

    fn commit(&self, message: &str, options: CommitOptions) -> Result<CommitOutcome, VcsError> {
        let mut flags = String::new();
        if options.add_all {
            flags.push_str(" [add_all]");
        }
        if options.allow_empty {
            flags.push_str(" [allow_empty]");
        }
        self.record(format!("vcs.commit{flags} {message}"));
        let n = self.commits.get() + 1;
        self.commits.set(n);
        Ok(CommitOutcome::Committed {
            revision: Revision::from(format!("commit{n}")),
        })
    }

    fn checkout_branch(&self, name: &str) -> Result<BranchCheckout, VcsError> {
        self.record(format!("vcs.checkout {name}"));
        if self.fail_checkout_of.as_deref() == Some(name) {
            return Err(failed(&format!("git checkout {name}")));
        }
        Ok(BranchCheckout::Created)
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<RemoteStatus, VcsError> {
        self.record(format!("vcs.add_remote {name} {url}"));
        Ok(match &self.existing_remote {
            Some(existing) => RemoteStatus::AlreadyExists {
                url: existing.clone(),
            },
            None => RemoteStatus::Added,
        })
    }

    fn push(&self, remote: &str, refspec: &str) -> Result<(), VcsError> {
        self.record(format!("vcs.push {remote} {refspec}"));
        if self.fail_push {
            return Err(failed("git push"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct FakeServer {
    pub log: CallLog,
    pub environments: RefCell<BTreeMap<String, Environment>>,
    pub bags: RefCell<BTreeMap<String, BTreeMap<String, Value>>>,
    pub published: BTreeMap<String, BTreeSet<String>>,
    pub fail_cookbook_upload: bool,
}

impl FakeServer {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            environments: RefCell::new(BTreeMap::new()),
            bags: RefCell::new(BTreeMap::new()),
            published: BTreeMap::new(),
            fail_cookbook_upload: false,
        }
    }

    pub fn with_environment(self, name: &str, versions: &[(&str, &str)]) -> Self {
        let mut env = Environment::new(name);
        for (cookbook, version) in versions {
            env.cookbook_versions
                .insert(cookbook.to_string(), version.to_string());
        }
        self.environments.borrow_mut().insert(name.to_string(), env);
        self
    }

    pub fn with_published(mut self, cookbook: &str, versions: &[&str]) -> Self {
        self.published.insert(
            cookbook.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn with_item(self, bag: &str, item: &str, data: Value) -> Self {
        self.bags
            .borrow_mut()
            .entry(bag.to_string())
            .or_default()
            .insert(item.to_string(), data);
        self
    }

    pub fn environment(&self, name: &str) -> Environment {
        self.environments
            .borrow()
            .get(name)
            .cloned()
            .expect("environment")
    }

    pub fn item(&self, bag: &str, item: &str) -> Option<Value> {
        self.bags.borrow().get(bag)?.get(item).cloned()
    }

    fn record(&self, call: String) {
        self.log.borrow_mut().push(call);
    }
}

impl ConfigServer for FakeServer {
    fn cookbook_versions(&self, cookbook: &str) -> Result<Option<BTreeSet<String>>, ServerError> {
        Ok(self.published.get(cookbook).cloned())
    }

    fn upload_cookbooks(
        &self,
        names: &[String],
        environment: &str,
        freeze: bool,
    ) -> Result<(), ServerError> {
        self.record(format!(
            "server.upload_cookbooks {} env={environment} freeze={freeze}",
            names.join(",")
        ));
        if self.fail_cookbook_upload {
            return Err(ServerError::CommandFailed {
                command: "knife cookbook upload".to_string(),
                status: "exit status: 100".to_string(),
                stderr: "simulated upload failure".to_string(),
            });
        }
        Ok(())
    }

    fn create_or_update_role(&self, paths: &[PathBuf]) -> Result<(), ServerError> {
        let names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        self.record(format!("server.roles {}", names.join(",")));
        Ok(())
    }

    fn ensure_data_bag(&self, bag: &str) -> Result<Provisioned, ServerError> {
        self.record(format!("server.ensure_data_bag {bag}"));
        let mut bags = self.bags.borrow_mut();
        if bags.contains_key(bag) {
            Ok(Provisioned::AlreadyExists)
        } else {
            bags.insert(bag.to_string(), BTreeMap::new());
            Ok(Provisioned::Created)
        }
    }

    fn create_or_update_data_bag_item(
        &self,
        bag: &str,
        item: &str,
        data: &Value,
    ) -> Result<(), ServerError> {
        self.record(format!("server.item {bag}/{item}"));
        self.bags
            .borrow_mut()
            .entry(bag.to_string())
            .or_default()
            .insert(item.to_string(), data.clone());
        Ok(())
    }

    fn load_data_bag_item(&self, bag: &str, item: &str) -> Result<Option<Value>, ServerError> {
        Ok(self.item(bag, item))
    }

    fn load_environment(&self, name: &str) -> Result<Option<Environment>, ServerError> {
        Ok(self.environments.borrow().get(name).cloned())
    }

    fn save_environment(&self, environment: &Environment) -> Result<(), ServerError> {
        self.record(format!("server.save_environment {}", environment.name));
        self.environments
            .borrow_mut()
            .insert(environment.name.clone(), environment.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct FakeValidator {
    pub name: String,
    pub passed: bool,
    pub log: CallLog,
}

impl FakeValidator {
    pub fn boxed(name: &str, passed: bool, log: &CallLog) -> Box<dyn Validator> {
        Box::new(Self {
            name: name.to_string(),
            passed,
            log: Rc::clone(log),
        })
    }
}

impl Validator for FakeValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(
        &self,
        cookbooks: &[String],
        _search_path: &[PathBuf],
        _options: &LintOptions,
    ) -> Result<ValidationOutcome, ValidatorError> {
        self.log
            .borrow_mut()
            .push(format!("validator.{} {}", self.name, cookbooks.join(",")));
        Ok(ValidationOutcome {
            passed: self.passed,
            summary: if self.passed { "ok" } else { "FC001 failure" }.to_string(),
        })
    }
}
