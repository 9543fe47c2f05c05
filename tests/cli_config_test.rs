//! Integration tests for configuration resolution and `j2g config`.
//!
//! - Precedence: CLI flag > env var > project config > system config > default
//! - Secrets: the token lives in state.kdl (0600) and is always masked

mod common;

use std::fs;

use common::{TestEnv, parse_error_json, parse_json};
use predicates::prelude::*;
use serde_json::Value;

fn setting<'a>(json: &'a Value, key: &str) -> &'a Value {
    json["settings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["key"] == key)
        .unwrap_or_else(|| panic!("missing setting {}", key))
}

fn config_show(env: &TestEnv, args: &[&str]) -> Value {
    let output = env
        .j2g()
        .args(args)
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    parse_json(&output.stdout)
}

// ==================== precedence ====================

#[test]
fn test_defaults_only() {
    let env = TestEnv::new();
    let json = config_show(&env, &[]);

    let done = setting(&json, "done-status-category");
    assert_eq!(done["value"], "3");
    assert_eq!(done["source"], "default");
    assert!(setting(&json, "jira-project")["value"].is_null());
}

#[test]
fn test_project_file_beats_system_file() {
    let env = TestEnv::with_project();
    fs::write(
        env.config_dir.path().join("config.kdl"),
        "jira-project \"SYS\"\ngithub-repo \"system-repo\"\nsource-name \"legacy\"\n",
    )
    .unwrap();

    let json = config_show(&env, &[]);
    assert_eq!(setting(&json, "jira-project")["value"], "PROJ");
    assert!(
        setting(&json, "jira-project")["source"]
            .as_str()
            .unwrap()
            .starts_with("project:")
    );
    assert_eq!(setting(&json, "source-name")["value"], "legacy");
    assert_eq!(setting(&json, "source-name")["source"], "system");
}

#[test]
fn test_env_beats_project_file() {
    let env = TestEnv::with_project();
    let output = env
        .j2g()
        .args(["config", "show"])
        .env("JIRA_MIGRATION_GITHUB_REPO", "from-env")
        .output()
        .unwrap();
    let json = parse_json(&output.stdout);

    let repo = setting(&json, "github-repo");
    assert_eq!(repo["value"], "from-env");
    assert_eq!(repo["source"], "env:JIRA_MIGRATION_GITHUB_REPO");
}

#[test]
fn test_explicit_config_file() {
    let env = TestEnv::new();
    env.write("conf/other.kdl", "jira-project \"ALT\"\nid-log \"ids.txt\"\n");

    let json = config_show(&env, &["-c", "conf/other.kdl"]);
    assert_eq!(setting(&json, "jira-project")["value"], "ALT");
    let id_log = setting(&json, "id-log")["value"].as_str().unwrap();
    assert!(id_log.ends_with("ids.txt"));
    assert!(id_log.contains("conf"));
}

#[test]
fn test_missing_explicit_config_file() {
    let env = TestEnv::new();
    env.j2g()
        .args(["-c", "nope.kdl", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.kdl"));
}

#[test]
fn test_error_with_quotes_is_valid_json() {
    let env = TestEnv::new();
    let output = env
        .j2g()
        .args(["-q", "-c", r#"my "odd" cfg.kdl"#, "analyze"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let json = parse_error_json(&output.stderr);
    assert!(json["error"].as_str().unwrap().contains(r#"my "odd" cfg.kdl"#));
}

#[test]
fn test_invalid_config_value() {
    let env = TestEnv::new();
    env.write("j2g.kdl", "jira-url \"ftp://example.com\"\n");
    env.j2g()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("jira-url"));
}

// ==================== token ====================

#[test]
fn test_set_token_from_stdin() {
    let env = TestEnv::new();
    env.j2g()
        .args(["config", "set-token"])
        .write_stdin("ghp_abcdefghijklmnop\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("ghp_...mnop"))
        .stdout(predicate::str::contains("abcdefghijkl").not());

    let state = fs::read_to_string(env.state_path()).unwrap();
    assert!(state.contains("ghp_abcdefghijklmnop"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(env.state_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let json = config_show(&env, &[]);
    let token = setting(&json, "github-token");
    assert_eq!(token["value"], "ghp_...mnop");
    assert_eq!(token["source"], "state");
}

#[test]
fn test_set_token_rejects_blank_input() {
    let env = TestEnv::new();
    env.j2g()
        .args(["config", "set-token"])
        .write_stdin("   \n")
        .assert()
        .failure();
    assert!(!env.state_path().exists());
}

#[test]
fn test_env_token_is_masked() {
    let env = TestEnv::new();
    let output = env
        .j2g()
        .args(["-H", "config", "show"])
        .env("JIRA_MIGRATION_GITHUB_ACCESS_TOKEN", "ghp_zyxwvutsrqponmlk")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ghp_...nmlk"));
    assert!(!stdout.contains("zyxwvutsrq"));
    assert!(stdout.contains("env:JIRA_MIGRATION_GITHUB_ACCESS_TOKEN"));
}
