//! CLI smoke tests: run the `ff` binary against a temp namespace root.
//!
//! stdout is not a terminal here, so every command answers in JSON.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn ff(home: &Path, developer: &str) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ff");
    cmd.current_dir(home);
    cmd.env("HOME", home);
    cmd.env_remove("FF_ROOT");
    cmd.env_remove("RUST_LOG");
    cmd.arg("--root").arg(home.join(".flowforge"));
    cmd.arg("--developer").arg(developer);
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

#[test]
fn test_version_json() {
    let dir = TempDir::new().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ff");
    cmd.current_dir(dir.path());
    let out = json_stdout(cmd.arg("version"));
    assert_eq!(out["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_session_lifecycle() {
    let dir = TempDir::new().unwrap();

    let started = json_stdout(ff(dir.path(), "ana").args(["session", "start", "T1"]));
    assert_eq!(started["taskId"], "T1");
    assert_eq!(started["active"], true);

    ff(dir.path(), "ana")
        .args(["session", "start", "T2"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("ALREADY_ACTIVE"));

    let ended = json_stdout(ff(dir.path(), "ana").args(["session", "end"]));
    assert_eq!(ended["sessionId"], started["sessionId"]);
    assert_eq!(ended["active"], false);

    let listed = json_stdout(ff(dir.path(), "ana").args(["session", "list"]));
    assert_eq!(listed["count"], 1);

    let restored = json_stdout(ff(dir.path(), "bo").args(["session", "restore", "task:T1", "--no-branch"]));
    assert_eq!(restored["restoredFrom"], started["sessionId"]);
    assert_eq!(restored["developerId"], "bo");
}

#[test]
fn test_end_without_session_is_not_found() {
    let dir = TempDir::new().unwrap();
    ff(dir.path(), "ana")
        .args(["session", "end"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("NO_ACTIVE_SESSION"));
}

#[test]
fn test_blocker_moves_task_to_blocked() {
    let dir = TempDir::new().unwrap();
    ff(dir.path(), "ana").args(["task", "claim", "T1"]).assert().success();
    ff(dir.path(), "ana")
        .args(["blocker", "report", "T1", "waiting on review"])
        .assert()
        .success();

    let tasks = json_stdout(ff(dir.path(), "ana").args(["task", "list"]));
    assert_eq!(tasks["tasks"]["T1"]["status"], "blocked");

    let blockers = json_stdout(ff(dir.path(), "ana").args(["blocker", "list"]));
    assert_eq!(blockers["count"], 1);

    ff(dir.path(), "ana").args(["blocker", "resolve", "T1"]).assert().success();
    let blockers = json_stdout(ff(dir.path(), "ana").args(["blocker", "list"]));
    assert_eq!(blockers["count"], 0);
}

#[test]
fn test_handoff_requires_current_assignee() {
    let dir = TempDir::new().unwrap();
    ff(dir.path(), "ana").args(["task", "claim", "T1"]).assert().success();
    ff(dir.path(), "bo")
        .args(["task", "handoff", "T1", "--to", "cy"])
        .assert()
        .code(4);

    let out = json_stdout(ff(dir.path(), "ana").args(["task", "handoff", "T1", "--to", "bo"]));
    assert_eq!(out["assignment"]["assignee"], "bo");
    assert_eq!(out["assignment"]["previousOwner"], "ana");
}

#[test]
fn test_quarantine_list_empty() {
    let dir = TempDir::new().unwrap();
    let out = json_stdout(ff(dir.path(), "ana").args(["quarantine", "list"]));
    assert_eq!(out["count"], 0);
}

#[test]
fn test_invalid_developer_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    ff(dir.path(), "Bad Id!")
        .args(["session", "status"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("INVALID_ARGUMENT"));
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".flowforge")).unwrap();
    std::fs::write(dir.path().join(".flowforge/config.json"), "{ nope").unwrap();
    ff(dir.path(), "ana")
        .args(["session", "status"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("CONFIG_ERROR"));
}

#[test]
fn test_read_only_commands_do_not_create_root() {
    let dir = TempDir::new().unwrap();
    let out = json_stdout(ff(dir.path(), "ana").args(["session", "status"]));
    assert_eq!(out["developerId"], "ana");
    json_stdout(ff(dir.path(), "ana").args(["quarantine", "list"]));
    json_stdout(ff(dir.path(), "ana").args(["blocker", "list"]));
    assert!(!dir.path().join(".flowforge").exists());
}
