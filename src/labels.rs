//! Label normalization and colouring.
//!
//! Raw Jira labels, components and types are mapped to GitHub label names
//! through a sparse mapping table and then filtered against an allow-list.
//! Both tables are plain text files:
//!
//! ```text
//! # labels_mapping.txt          # allowed_labels.txt
//! Bug=bug                       bug
//! new-feature=enhancement       enhancement
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Map a raw label and check it against the allow-list.
///
/// Returns `None` (drop) when the mapped label is not allowed. An empty
/// allow-list therefore drops every label.
pub fn normalize(
    raw: &str,
    mapping: &HashMap<String, String>,
    allow_list: &HashSet<String>,
) -> Option<String> {
    let mapped = mapping.get(raw).map(String::as_str).unwrap_or(raw);
    if allow_list.contains(mapped) {
        Some(mapped.to_string())
    } else {
        None
    }
}

/// What to do when no allow-list file is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingAllowList {
    /// Drop every label (safe default)
    #[default]
    DropAll,
    /// Keep every label after mapping
    AllowAll,
}

impl MissingAllowList {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "drop-all" | "drop" => Some(MissingAllowList::DropAll),
            "allow-all" | "allow" => Some(MissingAllowList::AllowAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissingAllowList::DropAll => "drop-all",
            MissingAllowList::AllowAll => "allow-all",
        }
    }
}

impl std::fmt::Display for MissingAllowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mapping table plus allow-list, with an explicit policy for a missing list.
#[derive(Debug, Clone, Default)]
pub struct LabelPolicy {
    mapping: HashMap<String, String>,
    allow_list: Option<HashSet<String>>,
    missing: MissingAllowList,
}

impl LabelPolicy {
    pub fn new(
        mapping: HashMap<String, String>,
        allow_list: Option<HashSet<String>>,
        missing: MissingAllowList,
    ) -> Self {
        Self {
            mapping,
            allow_list,
            missing,
        }
    }

    /// Load the policy from optional mapping and allow-list files.
    ///
    /// Missing files are not errors: a missing mapping means identity, a
    /// missing allow-list defers to `missing`.
    pub fn load(
        mapping_path: Option<&Path>,
        allow_list_path: Option<&Path>,
        missing: MissingAllowList,
    ) -> Result<Self> {
        let mapping = match mapping_path {
            Some(path) => load_mapping(path)?.unwrap_or_default(),
            None => HashMap::new(),
        };
        let allow_list = match allow_list_path {
            Some(path) => load_allow_list(path)?,
            None => None,
        };
        if allow_list.is_none() && missing == MissingAllowList::DropAll {
            tracing::warn!("No allowed labels list available: all free-form labels will be dropped");
        }
        Ok(Self::new(mapping, allow_list, missing))
    }

    /// Normalize one raw label; `None` means the label is dropped.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        match (&self.allow_list, self.missing) {
            (Some(allowed), _) => normalize(raw, &self.mapping, allowed),
            (None, MissingAllowList::DropAll) => None,
            (None, MissingAllowList::AllowAll) => Some(
                self.mapping
                    .get(raw)
                    .cloned()
                    .unwrap_or_else(|| raw.to_string()),
            ),
        }
    }

    pub fn has_allow_list(&self) -> bool {
        self.allow_list.is_some()
    }
}

/// Read `key=value` lines into a mapping.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_mapping(path: &Path) -> Result<Option<HashMap<String, String>>> {
    let Some(content) = read_optional(path)? else {
        tracing::warn!(
            "{} not found. No label mappings will be applied.",
            path.display()
        );
        return Ok(None);
    };

    let mapping = content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    Ok(Some(mapping))
}

/// Read one allowed label per line.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_allow_list(path: &Path) -> Result<Option<HashSet<String>>> {
    let Some(content) = read_optional(path)? else {
        tracing::warn!("{} not found.", path.display());
        return Ok(None);
    };

    Ok(Some(
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    ))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Chooses a GitHub label colour (six hex digits, no `#`) for a raw label.
pub trait ColorSelector {
    fn color(&self, label: &str) -> String;
}

impl<F> ColorSelector for F
where
    F: Fn(&str) -> String,
{
    fn color(&self, label: &str) -> String {
        self(label)
    }
}

/// Green for work items, red for bugs, grey for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultColorSelector;

impl ColorSelector for DefaultColorSelector {
    fn color(&self, label: &str) -> String {
        let bare = label.rsplit(':').next().unwrap_or(label).to_lowercase();
        match bare.as_str() {
            "task" | "story" => "7bc043",
            "bug" => "ee4035",
            _ => "ededed",
        }
        .to_string()
    }
}
