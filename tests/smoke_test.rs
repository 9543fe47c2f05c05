//! Smoke tests for the j2g CLI.
//!
//! These tests verify basic CLI functionality:
//! - `j2g --version` outputs version info
//! - `j2g --help` lists the commands
//! - `j2g` with no command fails with usage

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the j2g binary.
fn j2g() -> Command {
    Command::new(env!("CARGO_BIN_EXE_j2g"))
}

#[test]
fn test_version_flag() {
    j2g()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("j2g"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    j2g()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("relink"));
}

#[test]
fn test_migrate_help_lists_resume_flags() {
    j2g()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--start-from"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--skip-labels"));
}

#[test]
fn test_no_command_is_usage_error() {
    j2g()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
