//! Data models for the migration.
//!
//! This module defines the core data structures:
//! - `Issue` - The canonical unit of migration built from one Jira record
//! - `Comment` - Original and synthesized issue comments
//! - `Relationships` - Cross-issue links, consumed before transmission
//! - `IssuePayload` - The wire form of an issue, without transient fields

mod issue;

pub use issue::{Comment, ImportRequest, Issue, IssuePayload, RelationKind, Relationships};

/// Prefix of the sentinel label carried by every imported issue.
pub const SENTINEL_PREFIX: &str = "imported-";

/// The sentinel label for a source system, e.g. `imported-jira-issue`.
pub fn sentinel_label(source: &str) -> String {
    format!("{}{}-issue", SENTINEL_PREFIX, source)
}
