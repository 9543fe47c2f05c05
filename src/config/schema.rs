//! KDL schema definitions for config.kdl and state.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation functions
//! - File reading and writing with the required permissions

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::labels::MissingAllowList;
use crate::{Error, Result};

/// Migration preferences stored in config.kdl.
///
/// Nothing in here is secret, so the file can live next to the export.
/// File permissions: 0644 (rw-r--r--)
///
/// # KDL Schema
///
/// ```kdl
/// jira-project "PROJ"
/// jira-url "https://issues.example.com"
/// done-status-category "3"
/// github-account "acme"
/// github-repo "widgets"
/// security-repo "widgets-private"
/// security-id-log "jira-keys-to-github-id-security.txt"
/// source-name "jira"
/// component-labels #true
/// labels-mapping "labels_mapping.txt"
/// allowed-labels "allowed_labels.txt"
/// missing-allow-list "drop-all"  // or "allow-all"
/// unknown-type-label "other"
/// id-log "jira-keys-to-github-id.txt"
/// xml-paths "export-0.xml" "export-1000.xml"
/// placeholder-references #true
/// jql-query "project = PROJ ORDER BY key ASC"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct J2gConfig {
    /// Jira project key; records of other projects are skipped
    pub jira_project: Option<String>,
    pub jira_url: Option<String>,
    /// `statusCategory` id that marks an issue as closed
    pub done_status_category: Option<String>,
    pub github_account: Option<String>,
    pub github_repo: Option<String>,
    /// Repository receiving issues that carry a Jira security level
    pub security_repo: Option<String>,
    pub security_id_log: Option<PathBuf>,
    /// Prefix for the sentinel and component labels
    pub source_name: Option<String>,
    pub component_labels: Option<bool>,
    pub labels_mapping: Option<PathBuf>,
    pub allowed_labels: Option<PathBuf>,
    pub missing_allow_list: Option<MissingAllowList>,
    pub unknown_type_label: Option<String>,
    pub id_log: Option<PathBuf>,
    /// Export files or directories, read in order
    pub xml_paths: Option<Vec<PathBuf>>,
    /// Rewrite same-project keys into relinkable placeholders
    pub placeholder_references: Option<bool>,
    /// Query used by `fetch`
    pub jql_query: Option<String>,
}

fn first_string(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

fn first_bool(doc: &KdlDocument, name: &str) -> Option<bool> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_bool())
}

/// Accepts both `done-status-category 3` and `done-status-category "3"`.
fn first_string_or_integer(doc: &KdlDocument, name: &str) -> Option<String> {
    let entry = doc.get(name)?.entries().first()?;
    match entry.value() {
        KdlValue::String(s) => Some(s.clone()),
        KdlValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn push_string(doc: &mut KdlDocument, name: &str, value: &str) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    doc.nodes_mut().push(node);
}

fn push_bool(doc: &mut KdlDocument, name: &str, value: bool) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::Bool(value)));
    doc.nodes_mut().push(node);
}

impl J2gConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(ref project) = self.jira_project {
            if project.is_empty() || !project.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(format!(
                    "jira-project must be a Jira project key like PROJ, got '{}'",
                    project
                ));
            }
        }
        if let Some(ref url) = self.jira_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("jira-url must be an http(s) URL, got '{}'", url));
            }
        }
        if let Some(ref source) = self.source_name {
            if source.is_empty() || source.contains(char::is_whitespace) {
                return Err(format!(
                    "source-name must be a single word, got '{}'",
                    source
                ));
            }
        }
        for (name, value) in [
            ("github-account", &self.github_account),
            ("github-repo", &self.github_repo),
            ("security-repo", &self.security_repo),
        ] {
            if let Some(value) = value {
                if value.is_empty() || value.contains('/') {
                    return Err(format!("{} must not be empty or contain '/'", name));
                }
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.jira_project = first_string(doc, "jira-project");
        config.jira_url = first_string(doc, "jira-url");
        config.done_status_category = first_string_or_integer(doc, "done-status-category");
        config.github_account = first_string(doc, "github-account");
        config.github_repo = first_string(doc, "github-repo");
        config.security_repo = first_string(doc, "security-repo");
        config.security_id_log = first_string(doc, "security-id-log").map(PathBuf::from);
        config.source_name = first_string(doc, "source-name");
        config.component_labels = first_bool(doc, "component-labels");
        config.labels_mapping = first_string(doc, "labels-mapping").map(PathBuf::from);
        config.allowed_labels = first_string(doc, "allowed-labels").map(PathBuf::from);
        config.missing_allow_list =
            first_string(doc, "missing-allow-list").and_then(|s| MissingAllowList::parse(&s));
        config.unknown_type_label = first_string(doc, "unknown-type-label");
        config.id_log = first_string(doc, "id-log").map(PathBuf::from);
        config.placeholder_references = first_bool(doc, "placeholder-references");
        config.jql_query = first_string(doc, "jql-query");

        // xml-paths takes every argument, in order
        if let Some(node) = doc.get("xml-paths") {
            let paths: Vec<PathBuf> = node
                .entries()
                .iter()
                .filter(|entry| entry.name().is_none())
                .filter_map(|entry| entry.value().as_string())
                .map(PathBuf::from)
                .collect();
            if !paths.is_empty() {
                config.xml_paths = Some(paths);
            }
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        let strings = [
            ("jira-project", self.jira_project.as_deref()),
            ("jira-url", self.jira_url.as_deref()),
            ("done-status-category", self.done_status_category.as_deref()),
            ("github-account", self.github_account.as_deref()),
            ("github-repo", self.github_repo.as_deref()),
            ("security-repo", self.security_repo.as_deref()),
            ("source-name", self.source_name.as_deref()),
        ];
        for (name, value) in strings {
            if let Some(value) = value {
                push_string(&mut doc, name, value);
            }
        }

        if let Some(enabled) = self.component_labels {
            push_bool(&mut doc, "component-labels", enabled);
        }
        if let Some(ref path) = self.labels_mapping {
            push_string(&mut doc, "labels-mapping", &path.to_string_lossy());
        }
        if let Some(ref path) = self.allowed_labels {
            push_string(&mut doc, "allowed-labels", &path.to_string_lossy());
        }
        if let Some(missing) = self.missing_allow_list {
            push_string(&mut doc, "missing-allow-list", missing.as_str());
        }
        if let Some(ref label) = self.unknown_type_label {
            push_string(&mut doc, "unknown-type-label", label);
        }
        if let Some(ref path) = self.id_log {
            push_string(&mut doc, "id-log", &path.to_string_lossy());
        }
        if let Some(ref path) = self.security_id_log {
            push_string(&mut doc, "security-id-log", &path.to_string_lossy());
        }
        if let Some(ref paths) = self.xml_paths {
            let mut node = KdlNode::new("xml-paths");
            for path in paths {
                node.push(KdlEntry::new(KdlValue::String(
                    path.to_string_lossy().into_owned(),
                )));
            }
            doc.nodes_mut().push(node);
        }
        if let Some(enabled) = self.placeholder_references {
            push_bool(&mut doc, "placeholder-references", enabled);
        }
        if let Some(ref query) = self.jql_query {
            push_string(&mut doc, "jql-query", query);
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &J2gConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            jira_project,
            jira_url,
            done_status_category,
            github_account,
            github_repo,
            security_repo,
            security_id_log,
            source_name,
            component_labels,
            labels_mapping,
            allowed_labels,
            missing_allow_list,
            unknown_type_label,
            id_log,
            xml_paths,
            placeholder_references,
            jql_query
        );
    }

    /// Read and validate a config file. A missing file is an empty config.
    pub fn read(path: &Path) -> Result<Self> {
        let Some(doc) = read_kdl(path)? else {
            return Ok(Self::new());
        };
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }
}

/// Machine-specific secrets stored in state.kdl.
///
/// **MUST be created with 0600 permissions (owner read/write only)**.
///
/// # KDL Schema
///
/// ```kdl
/// github-token "ghp_xxxxxxxxxxxxxxxxxxxx"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct J2gState {
    /// GitHub PAT for the import API (sensitive!)
    pub github_token: Option<String>,
}

impl J2gState {
    /// Create an empty state with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if this state contains any secrets.
    pub fn has_secrets(&self) -> bool {
        self.github_token.is_some()
    }

    /// Get the masked token for display purposes.
    pub fn masked_token(&self) -> Option<String> {
        self.github_token.as_deref().map(mask_token)
    }

    /// Parse state from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            github_token: first_string(doc, "github-token"),
        }
    }

    /// Convert state to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        if let Some(ref token) = self.github_token {
            push_string(&mut doc, "github-token", token);
        }
        doc
    }

    /// Read a state file. A missing file is an empty state.
    pub fn read(path: &Path) -> Result<Self> {
        Ok(read_kdl(path)?
            .map(|doc| Self::from_kdl(&doc))
            .unwrap_or_default())
    }

    /// Write the state file, creating parents, with owner-only permissions.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, render_kdl(self.to_kdl()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(STATE_FILE_MODE))?;
        }
        Ok(())
    }
}

/// Show the first and last four characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let head: String = chars.iter().take(4).collect();
    if chars.len() <= 12 {
        format!("{}...", head)
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Format a document for writing to disk.
pub fn render_kdl(mut doc: KdlDocument) -> String {
    doc.autoformat();
    doc.to_string()
}

fn read_kdl(path: &Path) -> Result<Option<KdlDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e)))?;
    Ok(Some(doc))
}

/// Required permissions for state.kdl (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const STATE_FILE_MODE: u32 = 0o600;

/// Required permissions for config.kdl (Unix: 0644, readable by all).
#[cfg(unix)]
pub const CONFIG_FILE_MODE: u32 = 0o644;
