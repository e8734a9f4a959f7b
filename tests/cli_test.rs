//! Command line interface tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("kura-uploadr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("count"));
}

#[test]
fn test_upload_requires_files() {
    Command::cargo_bin("kura-uploadr")
        .unwrap()
        .arg("upload")
        .assert()
        .failure();
}

#[test]
fn test_upload_missing_file_fails() {
    Command::cargo_bin("kura-uploadr")
        .unwrap()
        .args(["upload", "/nonexistent/kura-photo.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("kura-photo.png"));
}

#[test]
fn test_serve_with_missing_config_fails() {
    Command::cargo_bin("kura-uploadr")
        .unwrap()
        .args(["--config", "/nonexistent/kura.yaml", "serve"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("kura.yaml"));
}
