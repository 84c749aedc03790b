//! [`Vcs`] over the `git` command line.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chefsync_core::{
    ports::{
        BranchCheckout, CommitOptions, CommitOutcome, FileChange, FileStatus, RemoteStatus, Vcs,
    },
    Revision, VcsError,
};

/// A working copy driven through `git`, committing as a fixed identity.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
    user: String,
    email: String,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>, user: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            user: user.into(),
            email: email.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg(format!("user.name={}", self.user))
            .arg("-c")
            .arg(format!("user.email={}", self.email))
            .args(args)
            .current_dir(&self.workdir);
        cmd
    }

    /// Run `git args`, whatever its exit status.
    fn output(&self, args: &[&str]) -> Result<Output, VcsError> {
        tracing::debug!("git {}", args.join(" "));
        self.command(args).output().map_err(|source| VcsError::Io {
            command: display(args),
            source,
        })
    }

    /// Run `git args` and return trimmed stdout; non-zero exit is an error.
    fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(failed(args, &output))
        }
    }

    /// Whether `git args` exits zero.
    fn succeeds(&self, args: &[&str]) -> Result<bool, VcsError> {
        Ok(self.output(args)?.status.success())
    }
}

fn display(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

fn failed(args: &[&str], output: &Output) -> VcsError {
    VcsError::CommandFailed {
        command: display(args),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Parse `git diff --name-status -z` output.
pub(crate) fn parse_name_status(raw: &str) -> Result<Vec<FileChange>, String> {
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();
    while let Some(code) = fields.next() {
        let path = fields
            .next()
            .ok_or_else(|| format!("status '{code}' has no path"))?;
        let status = match code.chars().next() {
            Some('A') => FileStatus::Added,
            Some('D') => FileStatus::Deleted,
            Some(_) => FileStatus::Modified,
            None => return Err("empty status field".to_string()),
        };
        changes.push(FileChange::new(path, status));
    }
    Ok(changes)
}

fn tree_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl Vcs for GitCli {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn changed_files(&self, from: &Revision, to: &Revision) -> Result<Vec<FileChange>, VcsError> {
        let args = [
            "diff",
            "--name-status",
            "--no-renames",
            "-z",
            from.as_str(),
            to.as_str(),
        ];
        let output = self.output(&args)?;
        if !output.status.success() {
            return Err(failed(&args, &output));
        }
        parse_name_status(&String::from_utf8_lossy(&output.stdout)).map_err(|detail| {
            VcsError::UnexpectedOutput {
                command: display(&args),
                detail,
            }
        })
    }

    fn exists_at(&self, revision: &Revision, path: &Path) -> Result<bool, VcsError> {
        let object = format!("{}:{}", revision, tree_path(path));
        self.succeeds(&["cat-file", "-e", &object])
    }

    fn current_revision(&self) -> Result<Revision, VcsError> {
        self.run(&["rev-parse", "HEAD"]).map(Revision::from)
    }

    fn revision_exists(&self, revision: &Revision) -> Result<bool, VcsError> {
        let spec = format!("{revision}^{{commit}}");
        self.succeeds(&["rev-parse", "--verify", "--quiet", &spec])
    }

    fn add(&self, paths: &[PathBuf]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let owned: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let mut args = vec!["add", "--"];
        args.extend(owned.iter().map(String::as_str));
        self.run(&args).map(|_| ())
    }

    fn commit(&self, message: &str, options: CommitOptions) -> Result<CommitOutcome, VcsError> {
        if options.add_all {
            self.run(&["add", "--all"])?;
        }
        if !options.allow_empty && self.succeeds(&["diff", "--cached", "--quiet"])? {
            tracing::debug!("nothing staged; skipping commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        let mut args = vec!["commit", "--quiet", "-m", message];
        if options.allow_empty {
            args.push("--allow-empty");
        }
        self.run(&args)?;
        Ok(CommitOutcome::Committed {
            revision: self.current_revision()?,
        })
    }

    fn checkout_branch(&self, name: &str) -> Result<BranchCheckout, VcsError> {
        let local = format!("refs/heads/{name}");
        if self.succeeds(&["rev-parse", "--verify", "--quiet", &local])? {
            self.run(&["checkout", "--quiet", name])?;
            Ok(BranchCheckout::Existing)
        } else {
            self.run(&["checkout", "--quiet", "-b", name])?;
            Ok(BranchCheckout::Created)
        }
    }

    fn add_remote(&self, name: &str, url: &str) -> Result<RemoteStatus, VcsError> {
        let output = self.output(&["remote", "get-url", name])?;
        if output.status.success() {
            return Ok(RemoteStatus::AlreadyExists {
                url: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            });
        }
        self.run(&["remote", "add", name, url])?;
        Ok(RemoteStatus::Added)
    }

    fn push(&self, remote: &str, refspec: &str) -> Result<(), VcsError> {
        self.run(&["push", "--quiet", remote, refspec]).map(|_| ())
    }
}
