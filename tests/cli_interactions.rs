//! CLI options interaction tests
//!
//! These tests validate the `serve` and `run` commands, their global
//! options, and the exit codes of failing requests.

use predicates::prelude::*;
use std::fs;
use assert_cmd::Command;
use tempfile::TempDir;

/// Helper function to create a test command running inside a scratch directory
fn create_test_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pst").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("LISTEN_ADDR")
        .env_remove("ARTIFACT_DIR")
        .env_remove("DOWNLOAD_URL")
        .env_remove("PING_DEADLINE_SECONDS");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_conflicting_color_flags() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--color", "--no-color", "run"])
        .write_stdin("{}")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--no-color"));
}

#[test]
fn test_invalid_ping_deadline_rejected_by_parser() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--ping-deadline", "0", "run"])
        .assert()
        .failure();
}

#[test]
fn test_missing_request_file() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--no-color", "run", "--request", "does-not-exist.json"])
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("does-not-exist.json"));
}

#[test]
fn test_malformed_request_prints_fatal_event() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--no-color", "run"])
        .write_stdin("{\"concurrency\": \"many\"")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("\"info\":\"error\""));
}

#[test]
fn test_request_without_profiles() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--no-color", "run"])
        .write_stdin("Default^pingonly^tcp^none^x^1^20^no links in here")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::contains("no profile found"));
}

#[test]
fn test_ping_only_run_streams_events() {
    let dir = TempDir::new().unwrap();
    let artifacts = dir.path().join("artifacts");
    let request = dir.path().join("request.json");
    fs::write(
        &request,
        r#"{"speedtestMode":"pingonly","concurrency":2,"subscription":"trojan://pw@127.0.0.1:10?sni=x#local"}"#,
    )
    .unwrap();

    let output = create_test_cmd(&dir)
        .args(["--no-color", "--ping-deadline", "1", "--artifact-dir"])
        .arg(&artifacts)
        .args(["run", "--request"])
        .arg(&request)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let kinds: Vec<String> = stdout
        .lines()
        .map(|line| {
            let event: serde_json::Value = serde_json::from_str(line).unwrap();
            event["info"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(kinds.first().map(String::as_str), Some("started"));
    assert_eq!(kinds.iter().filter(|k| *k == "endone").count(), 1);
    assert!(kinds.contains(&"eof".to_string()));
    assert_eq!(kinds.last().map(String::as_str), Some("picdata"));
}
