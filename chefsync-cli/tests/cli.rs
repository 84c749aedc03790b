//! End-to-end checks of the `chefsync` binary that need no Chef server.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn chefsync_cmd(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chefsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("BUILD_TAG")
        .env_remove("RUST_LOG")
        .current_dir(cwd);
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("run git");
    assert!(status.success(), "git {args:?} failed");
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A committed Chef repository with one cookbook and one role.
fn chef_repo() -> TempDir {
    let dir = TempDir::new().expect("repo");
    let root = dir.path();
    git(root, &["init", "--quiet"]);
    git(root, &["config", "user.name", "test"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    write(root, "cookbooks/apache/metadata.rb", "name 'apache'\nversion '0.99.4'\n");
    write(root, "roles/web.json", "{\"name\": \"web\"}\n");
    write(root, "chefsync.yaml", "repo_dir: .\n");
    git(root, &["add", "--all"]);
    git(root, &["commit", "--quiet", "-m", "import"]);
    dir
}

#[test]
fn help_lists_every_subcommand() {
    let home = TempDir::new().unwrap();
    chefsync_cmd(home.path(), home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            contains("sync")
                .and(contains("prop"))
                .and(contains("save"))
                .and(contains("load"))
                .and(contains("status")),
        );
}

#[test]
fn load_requires_a_tag() {
    let home = TempDir::new().unwrap();
    chefsync_cmd(home.path(), home.path())
        .args(["load", "-e", "production"])
        .assert()
        .failure()
        .stderr(contains("--tag"));
}

#[test]
fn malformed_config_exits_with_configuration_status() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    fs::write(cwd.path().join("chefsync.yaml"), "branch: [unterminated\n").unwrap();

    chefsync_cmd(home.path(), cwd.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(contains("failed to parse config"));
}

#[test]
fn unknown_config_key_exits_with_configuration_status() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    fs::write(cwd.path().join("chefsync.yaml"), "no_such_setting: true\n").unwrap();

    chefsync_cmd(home.path(), cwd.path())
        .arg("status")
        .assert()
        .code(2);
}

#[test]
fn unknown_validator_exits_before_touching_the_repository() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();

    chefsync_cmd(home.path(), repo.path())
        .args(["-T", "ruby,rspec", "sync"])
        .assert()
        .code(2)
        .stderr(contains("unknown test 'rspec'"));

    assert!(!repo.path().join(".chefsync_last_commit").exists());
}

#[test]
fn sync_without_repo_url_is_a_configuration_error() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();

    chefsync_cmd(home.path(), repo.path())
        .arg("sync")
        .assert()
        .code(2)
        .stderr(contains("repo_url"));
}

#[test]
fn prop_without_source_environment_is_a_configuration_error() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();

    chefsync_cmd(home.path(), repo.path())
        .args(["prop", "-t", "production"])
        .assert()
        .code(2)
        .stderr(contains("env_from"));
}

#[test]
fn status_without_checkpoint_lists_everything() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();

    chefsync_cmd(home.path(), repo.path())
        .arg("status")
        .assert()
        .success()
        .stdout(
            contains("no checkpoint")
                .and(contains("apache"))
                .and(contains("web")),
        );
}

#[test]
fn status_json_reports_pending_changes_since_checkpoint() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();
    let root = repo.path();

    let head = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(root)
        .output()
        .expect("rev-parse");
    let head = String::from_utf8_lossy(&head.stdout).trim().to_string();
    write(root, ".chefsync_last_commit", &head);
    write(root, "roles/db.json", "{\"name\": \"db\"}\n");
    git(root, &["add", "--all"]);
    git(root, &["commit", "--quiet", "-m", "add db role"]);

    let output = chefsync_cmd(home.path(), root)
        .args(["status", "--json"])
        .output()
        .expect("status");
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["checkpoint"]["revision"], head.as_str());
    assert!(json["checkpoint"]["age"].is_string());
    assert_eq!(json["changes"]["roles"]["db"]["kind"], "added");
    assert!(json["changes"]["cookbooks"].as_object().unwrap().is_empty());
    assert!(json.get("bumps").is_none());
}

#[test]
fn missing_explicit_config_falls_back_to_defaults() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();
    fs::remove_file(repo.path().join("chefsync.yaml")).unwrap();
    git(repo.path(), &["commit", "--quiet", "-am", "drop config"]);

    chefsync_cmd(home.path(), repo.path())
        .args(["-c", "missing.yaml", "status"])
        .assert()
        .success()
        .stderr(contains("not found; using defaults"));
}

#[test]
fn unreachable_config_url_exits_with_configuration_status() {
    let home = TempDir::new().unwrap();
    let repo = chef_repo();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/chefsync.yaml");

    chefsync_cmd(home.path(), repo.path())
        .args(["-c", url.as_str(), "status"])
        .assert()
        .code(2)
        .stderr(contains("failed to fetch config"));
}
