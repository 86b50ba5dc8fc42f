//! CLI smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("sniprag")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("worker"));
}

#[test]
fn test_stats_against_memory_db() {
    Command::cargo_bin("sniprag")
        .unwrap()
        .args(["--memory", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Documents: 0"))
        .stdout(predicate::str::contains("0 pending"));
}

#[test]
fn test_status_of_unknown_document() {
    Command::cargo_bin("sniprag")
        .unwrap()
        .args(["--memory", "status", "deadbeefdeadbeef"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"));
}
