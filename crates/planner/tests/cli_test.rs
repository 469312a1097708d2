#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use plannerapp::cache::fs_backend::FsBackend;
use plannerapp::cache::{CacheKey, LocalCache};
use plannerapp::clock::SystemClock;
use plannerapp::init::user_cache_dir;
use plannerapp::model::{Goal, Page, Record, ResourceKind};
use plannerapp::reconcile::Reconciler;
use plannerapp::session::Session;
use predicates::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// Nothing listens on the discard port, so every request is refused at once.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn planner_cmd(temp: &TempDir) -> Command {
    let mut cmd = Command::new(cargo_bin("planner"));
    cmd.current_dir(temp.path())
        .env("PLANNER_CACHE_DIR", temp.path().join("cache"))
        .env("PLANNER_BASE_URL", UNREACHABLE)
        .env("PLANNER_USER", "ana")
        .env_remove("PLANNER_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn seed_goals(cache_root: &Path, goals: Vec<Record<Goal>>) {
    let dir = user_cache_dir(cache_root, &Session::authenticated("ana", None));
    let cache = Arc::new(LocalCache::new(
        FsBackend::new(dir),
        Duration::from_secs(300),
        Arc::new(SystemClock),
    ));
    let reconciler = Reconciler::new(cache, Arc::new(SystemClock));
    reconciler.apply_page(
        &CacheKey::resource(ResourceKind::Goals),
        &[],
        &Page::new(goals, None, false),
    );
}

#[test]
fn test_help_lists_resources() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("goals"))
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_version() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_bad_arguments_fail() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["goals", "edit", "1", "--due", "soon"])
        .assert()
        .failure();
}

#[test]
fn test_cache_status_and_clear_when_empty() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(empty)"));

    planner_cmd(&temp)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 0 cached entries"));
}

#[test]
fn test_list_degrades_when_offline() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["goals", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No goals found."))
        .stderr(predicate::str::contains("Could not reach the planner service"));
}

#[test]
fn test_list_reads_fresh_cache_without_network() {
    let temp = TempDir::new().unwrap();
    seed_goals(
        &temp.path().join("cache"),
        vec![
            Record::new("7", Goal::new("Finish FAFSA", "Academic")),
            Record::new("9", Goal::new("SAT prep", "Testing")),
        ],
    );

    planner_cmd(&temp)
        .args(["goals", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Finish FAFSA [Academic]"))
        .stdout(predicate::str::contains("SAT prep [Testing]"))
        .stderr(predicate::str::is_empty());

    planner_cmd(&temp)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("goals"))
        .stdout(predicate::str::contains("fresh"));

    planner_cmd(&temp)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 cached entry"));
}

#[test]
fn test_other_users_cache_is_not_shown() {
    let temp = TempDir::new().unwrap();
    seed_goals(
        &temp.path().join("cache"),
        vec![Record::new("7", Goal::new("Finish FAFSA", "Academic"))],
    );

    planner_cmd(&temp)
        .env("PLANNER_USER", "ben")
        .args(["goals", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Finish FAFSA").not());
}

#[test]
fn test_add_offline_reports_unsaved_change() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["goals", "add", "Finish", "FAFSA"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error: 1 change could not be saved"));
}

#[test]
fn test_edit_unknown_record_offline() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["notes", "edit", "42", "Call", "parent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "could not reach the planner service to look up note 42",
        ));
}

#[test]
fn test_edit_requires_a_field() {
    let temp = TempDir::new().unwrap();
    planner_cmd(&temp)
        .args(["goals", "edit", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to change"));
}
