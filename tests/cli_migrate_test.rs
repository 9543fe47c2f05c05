//! Integration tests for `j2g migrate`, `j2g relink` and `j2g check-token`.
//!
//! Only paths that stop before any network call are exercised here; the
//! GitHub exchange itself is covered by unit tests with a scripted transport.

mod common;

use common::{EXPORT, SECURED_ITEM, TestEnv, parse_error_json, parse_json};
use predicates::prelude::*;

#[test]
fn test_dry_run_plan_json() {
    let env = TestEnv::with_project();
    let output = env.j2g().args(["migrate", "--dry-run"]).output().unwrap();
    assert!(output.status.success());

    let json = parse_json(&output.stdout);
    assert_eq!(json["mode"], "dry-run");
    assert_eq!(json["project"], "PROJ");
    assert_eq!(json["total_issues"], 2);
    assert_eq!(json["to_import"], 2);
    assert_eq!(json["first_key"], "PROJ-1");
    assert_eq!(json["last_key"], "PROJ-2");
    assert_eq!(json["milestones"][0], "v1.0");
}

#[test]
fn test_dry_run_resume_index() {
    let env = TestEnv::with_project();
    env.j2g()
        .args(["-H", "migrate", "--dry-run", "--start-from", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 2 issue(s) from index 1"))
        .stdout(predicate::str::contains("PROJ-2 .. PROJ-2"));
}

#[test]
fn test_dry_run_needs_no_token() {
    let env = TestEnv::with_project();
    env.j2g()
        .args(["migrate", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("token").not());
}

#[test]
fn test_migrate_without_token_fails() {
    let env = TestEnv::with_project();
    env.j2g()
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no GitHub token configured"));
    assert!(!env.work_path().join("ids.txt").exists());
}

#[test]
fn test_relink_without_token_fails() {
    let env = TestEnv::with_project();
    env.j2g()
        .args(["-H", "relink"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_check_token_without_token_fails() {
    let env = TestEnv::new();
    let output = env.j2g().args(["-q", "check-token"]).output().unwrap();
    assert!(!output.status.success());

    let json = parse_error_json(&output.stderr);
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("no GitHub token configured")
    );
}

#[test]
fn test_dry_run_lists_secured_issues() {
    let env = TestEnv::with_project();
    env.write(
        "export.xml",
        &EXPORT.replace("</channel>", &format!("{}</channel>", SECURED_ITEM)),
    );
    let output = env
        .j2g()
        .args(["migrate", "--dry-run"])
        .env("JIRA_MIGRATION_SECURITY_REPO", "widgets-private")
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);

    let json = parse_json(&output.stdout);
    assert_eq!(json["total_issues"], 2);
    assert_eq!(json["secured"]["repository"], "acme/widgets-private");
    assert_eq!(json["secured"]["first_key"], "PROJ-3");
}
