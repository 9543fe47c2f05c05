//! Jira export records.
//!
//! A [`JiraItem`] is one `<item>` of a Jira XML export with every optional
//! element surfaced as `Option` or an empty `Vec`. Downstream code never
//! walks the XML tree; it only inspects these fields.
//!
//! - [`xml`] turns XML documents and files into items
//! - [`fetch`] downloads paginated XML search results from a Jira server

pub mod fetch;
pub mod xml;

/// Custom field key that carries the epic link in Jira exports.
pub const EPIC_LINK_FIELD: &str = "com.pyxis.greenhopper.jira:gh-epic-link";

/// A Jira user reference (`<reporter username="...">Display</reporter>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraUser {
    /// Login name from the `username` attribute
    pub username: String,
    /// Display text of the element
    pub display_name: String,
}

/// One comment of a Jira issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraComment {
    /// Author login from the `author` attribute
    pub author: String,
    /// Free-text creation timestamp from the `created` attribute
    pub created: Option<String>,
    /// Comment text (still HTML-escaped)
    pub body: String,
}

/// A group of links sharing one direction and description
/// (`<outwardlinks description="duplicates">`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkGroup {
    /// Human-readable relationship, e.g. "is duplicated by"
    pub description: Option<String>,
    /// Keys of the linked issues
    pub keys: Vec<String>,
}

/// One `<issuelinktype>` with its outward and inward groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueLinkType {
    pub name: Option<String>,
    pub outward: Vec<LinkGroup>,
    pub inward: Vec<LinkGroup>,
}

/// One `<item>` of a Jira XML export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JiraItem {
    pub key: String,
    /// `key` attribute of the `<project>` element, when present
    pub project_key: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub issue_type: Option<String>,
    pub status: Option<String>,
    pub status_category_id: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub reporter: Option<JiraUser>,
    pub assignee: Option<JiraUser>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub resolved: Option<String>,
    pub fix_version: Option<String>,
    pub components: Vec<String>,
    pub labels: Vec<String>,
    pub comments: Vec<JiraComment>,
    pub subtasks: Vec<String>,
    pub parent: Option<String>,
    pub link_types: Vec<IssueLinkType>,
    pub epic_link: Option<String>,
    pub security: Option<String>,
}

impl JiraItem {
    /// Project key of this record.
    ///
    /// Uses the explicit `<project key="...">` attribute when present,
    /// otherwise the part of the issue key before the first `-`.
    pub fn project(&self) -> &str {
        match self.project_key.as_deref() {
            Some(project) => project,
            None => self.key.split('-').next().unwrap_or(&self.key),
        }
    }
}
