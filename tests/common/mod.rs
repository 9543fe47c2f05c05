//! Common test utilities for j2g integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't read the
//! user's `~/.config/jira2gh/` or `~/.local/share/jira2gh/` directories.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A small export with two PROJ issues and one record of another project.
pub const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="0.92"><channel>
<item>
  <title>[PROJ-1] Crash on start</title>
  <link>https://issues.example.com/browse/PROJ-1</link>
  <key id="10001">PROJ-1</key>
  <project key="PROJ">Project</project>
  <description>&lt;p&gt;Blocks PROJ-2&lt;/p&gt;</description>
  <type>Bug</type>
  <priority>Major</priority>
  <status>Open</status>
  <statusCategory id="2"/>
  <reporter username="alice">Alice</reporter>
  <created>Mon, 4 Mar 2019 10:20:30 +0000</created>
  <updated>Tue, 5 Mar 2019 08:00:00 +0000</updated>
  <fixVersion>v1.0</fixVersion>
  <component>Core</component>
  <labels><label>regression</label></labels>
</item>
<item>
  <title>[PROJ-2] Add export</title>
  <link>https://issues.example.com/browse/PROJ-2</link>
  <key id="10002">PROJ-2</key>
  <project key="PROJ">Project</project>
  <type>Story</type>
  <status>Done</status>
  <statusCategory id="3"/>
  <reporter username="bob">Bob</reporter>
  <created>Mon, 4 Mar 2019 10:20:30 +0000</created>
  <updated>Mon, 4 Mar 2019 10:20:30 +0000</updated>
  <resolved>Wed, 6 Mar 2019 09:00:00 +0000</resolved>
</item>
<item>
  <title>[OTHER-1] Not ours</title>
  <key id="20001">OTHER-1</key>
  <project key="OTHER">Other</project>
  <type>Bug</type>
</item>
</channel></rss>
"#;

/// An extra PROJ issue restricted by a Jira security level.
pub const SECURED_ITEM: &str = r#"<item>
  <title>[PROJ-3] Token leak in logs</title>
  <key id="10003">PROJ-3</key>
  <project key="PROJ">Project</project>
  <type>Bug</type>
  <security id="10000">Internal</security>
  <status>Open</status>
  <statusCategory id="2"/>
  <reporter username="carol">Carol</reporter>
  <created>Tue, 5 Mar 2019 08:00:00 +0000</created>
  <updated>Tue, 5 Mar 2019 08:00:00 +0000</updated>
</item>
"#;

/// Environment variables j2g reads; cleared so the host shell can't leak in.
const MIGRATION_ENV: &[&str] = &[
    "JIRA_MIGRATION_JIRA_PROJECT_NAME",
    "JIRA_MIGRATION_JIRA_URL",
    "JIRA_MIGRATION_JIRA_DONE_ID",
    "JIRA_MIGRATION_FILE_PATHS",
    "JIRA_MIGRATION_GITHUB_ACCESS_TOKEN",
    "JIRA_MIGRATION_GITHUB_ACCOUNT",
    "JIRA_MIGRATION_GITHUB_REPO",
    "JIRA_MIGRATION_INCLUDE_COMPONENT_IN_LABELS",
    "JIRA_MIGRATION_JQL_QUERY",
    "JIRA_MIGRATION_SECURITY_REPO",
    "RUST_LOG",
];

/// A test environment with isolated config and data directories.
///
/// - `work_dir`: the working directory, holding `j2g.kdl` and exports
/// - `config_dir`: system config (via `J2G_CONFIG_DIR`)
/// - `data_dir`: state.kdl (via `J2G_DATA_DIR`)
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    /// A test environment with `export.xml` and a complete `j2g.kdl`.
    pub fn with_project() -> Self {
        let env = Self::new();
        env.write("export.xml", EXPORT);
        env.write(
            "j2g.kdl",
            r#"jira-project "PROJ"
jira-url "https://issues.example.com"
github-account "acme"
github-repo "widgets"
missing-allow-list "allow-all"
xml-paths "export.xml"
id-log "ids.txt"
"#,
        );
        env
    }

    /// Get a Command for the j2g binary with isolated directories.
    pub fn j2g(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_j2g"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("J2G_CONFIG_DIR", self.config_dir.path());
        cmd.env("J2G_DATA_DIR", self.data_dir.path());
        for name in MIGRATION_ENV {
            cmd.env_remove(name);
        }
        cmd
    }

    /// Write a file relative to the working directory.
    pub fn write(&self, name: &str, content: &str) {
        let path = self.work_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn work_path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn state_path(&self) -> std::path::PathBuf {
        self.data_dir.path().join("state.kdl")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).unwrap()
}

/// Parse the last stderr line, where j2g reports a failure as JSON.
pub fn parse_error_json(stderr: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stderr);
    let line = text.lines().last().unwrap_or_default();
    serde_json::from_str(line).unwrap_or_else(|e| panic!("stderr is not JSON ({}): {}", e, text))
}
