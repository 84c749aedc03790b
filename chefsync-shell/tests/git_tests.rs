//! `GitCli` against real repositories in temp directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chefsync_core::{
    ports::{BranchCheckout, CommitOptions, CommitOutcome, FileChange, FileStatus, RemoteStatus, Vcs},
    Revision,
};
use chefsync_shell::GitCli;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run `git {args:?}`: {e}"));
    assert!(
        output.status.success(),
        "`git {args:?}` failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A repository on `master` with one commit holding two cookbooks and a role.
fn chef_repo() -> (TempDir, GitCli) {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();
    git(root, &["init", "--quiet"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    write(root, "cookbooks/apache/metadata.rb", "version '0.99.4'\n");
    write(root, "cookbooks/legacy/metadata.rb", "version '0.1.0'\n");
    write(root, "roles/web.json", "{}\n");
    let cli = GitCli::new(root, "chefsync test", "chefsync@example.com");
    cli.commit("Initial import", CommitOptions::add_all())
        .expect("initial commit");
    (dir, cli)
}

fn head(dir: &Path) -> Revision {
    Revision::from(git(dir, &["rev-parse", "HEAD"]))
}

// ---------------------------------------------------------------------------
// History queries
// ---------------------------------------------------------------------------

#[test]
fn changed_files_reports_added_modified_and_deleted() {
    let (dir, cli) = chef_repo();
    let root = dir.path();
    let first = head(root);

    write(root, "cookbooks/apache/metadata.rb", "version '0.99.5'\n");
    write(root, "roles/db role.json", "{}\n");
    fs::remove_file(root.join("cookbooks/legacy/metadata.rb")).unwrap();
    cli.commit("second", CommitOptions::add_all()).expect("commit");

    let mut changes = cli.changed_files(&first, &Revision::head()).expect("diff");
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(
        changes,
        vec![
            FileChange::new("cookbooks/apache/metadata.rb", FileStatus::Modified),
            FileChange::new("cookbooks/legacy/metadata.rb", FileStatus::Deleted),
            FileChange::new("roles/db role.json", FileStatus::Added),
        ]
    );

    assert!(cli.exists_at(&first, Path::new("cookbooks/legacy")).unwrap());
    assert!(!cli
        .exists_at(&Revision::head(), Path::new("cookbooks/legacy"))
        .unwrap());
}

#[test]
fn revision_existence() {
    let (dir, cli) = chef_repo();
    let current = cli.current_revision().expect("rev-parse");
    assert_eq!(current, head(dir.path()));
    assert_eq!(current.as_str().len(), 40);
    assert!(cli.revision_exists(&current).unwrap());
    assert!(!cli
        .revision_exists(&Revision::from("0000000000000000000000000000000000000000"))
        .unwrap());
    assert!(!cli.revision_exists(&Revision::from("no-such-ref")).unwrap());
}

#[test]
fn diff_against_unknown_revision_fails() {
    let (_dir, cli) = chef_repo();
    assert!(cli
        .changed_files(&Revision::from("no-such-ref"), &Revision::head())
        .is_err());
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

#[test]
fn clean_tree_has_nothing_to_commit() {
    let (dir, cli) = chef_repo();
    let before = head(dir.path());
    let outcome = cli
        .commit("no-op", CommitOptions::add_all())
        .expect("commit");
    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert_eq!(head(dir.path()), before);
}

#[test]
fn allow_empty_always_records_a_commit() {
    let (dir, cli) = chef_repo();
    let before = head(dir.path());
    let outcome = cli
        .commit("Updating _default with the latest cookbook versions", CommitOptions::allow_empty())
        .expect("commit");
    let CommitOutcome::Committed { revision } = outcome else {
        panic!("expected a commit");
    };
    assert_ne!(revision, before);
    assert_eq!(
        git(dir.path(), &["log", "-1", "--format=%an <%ae>"]),
        "chefsync test <chefsync@example.com>"
    );
}

#[test]
fn add_stages_only_the_named_paths() {
    let (dir, cli) = chef_repo();
    let root = dir.path();
    write(root, ".chefsync_last_commit", "abc");
    write(root, "scratch.txt", "untracked");

    cli.add(&[root.join(".chefsync_last_commit")]).expect("add");
    cli.commit("marker", CommitOptions::default()).expect("commit");

    let tracked = git(root, &["ls-files"]);
    assert!(tracked.contains(".chefsync_last_commit"));
    assert!(!tracked.contains("scratch.txt"));
}

// ---------------------------------------------------------------------------
// Branches, remotes, push
// ---------------------------------------------------------------------------

#[test]
fn checkout_creates_then_reuses_branches() {
    let (dir, cli) = chef_repo();
    assert_eq!(cli.checkout_branch("jenkins-1").unwrap(), BranchCheckout::Created);
    assert_eq!(
        git(dir.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
        "jenkins-1"
    );
    assert_eq!(cli.checkout_branch("master").unwrap(), BranchCheckout::Existing);
    assert_eq!(cli.checkout_branch("jenkins-1").unwrap(), BranchCheckout::Existing);
}

#[test]
fn adding_a_remote_twice_is_not_an_error() {
    let (_dir, cli) = chef_repo();
    assert_eq!(
        cli.add_remote("upstream", "ssh://git@example.com/chef").unwrap(),
        RemoteStatus::Added
    );
    assert_eq!(
        cli.add_remote("upstream", "ssh://git@example.com/other").unwrap(),
        RemoteStatus::AlreadyExists {
            url: "ssh://git@example.com/chef".to_string()
        }
    );
}

#[test]
fn push_updates_the_remote_branch() {
    let (dir, cli) = chef_repo();
    let bare = TempDir::new().expect("bare");
    git(bare.path(), &["init", "--quiet", "--bare"]);
    let url: PathBuf = bare.path().to_path_buf();

    cli.add_remote("upstream", &url.display().to_string())
        .expect("remote");
    cli.checkout_branch("build-9").expect("branch");
    cli.commit("build commit", CommitOptions::allow_empty())
        .expect("commit");
    cli.push("upstream", "HEAD:master").expect("push");

    assert_eq!(
        git(bare.path(), &["rev-parse", "refs/heads/master"]),
        head(dir.path()).to_string()
    );
}
