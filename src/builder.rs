//! Build canonical issues from Jira records.
//!
//! [`IssueModelBuilder`] turns one [`JiraItem`] into an [`Issue`]: it decodes
//! HTML entities, renders the provenance footer, maps the Jira type to a
//! label and converts subtasks, parents, comments and links.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime};

use crate::html::decode_entities;
use crate::jira::{JiraComment, JiraItem, JiraUser};
use crate::labels::LabelPolicy;
use crate::models::{sentinel_label, Comment, Issue, RelationKind};

/// Source name used for the sentinel and component label prefixes.
pub const DEFAULT_SOURCE_NAME: &str = "jira";

/// Assignee display text Jira uses for unassigned issues.
const UNASSIGNED: &str = "Unassigned";

/// Per-run settings the builder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Jira project key; records of other projects are skipped
    pub project: String,
    /// `statusCategory` id that marks an issue as done
    pub done_status_id: String,
    /// Jira base URL without trailing slash
    pub jira_base_url: String,
    pub source_name: String,
    /// Emit `<source>-component:<name>` and `<name>` labels for components
    pub component_labels: bool,
    /// Label for issue types without a mapping; `None` emits nothing
    pub unknown_type_label: Option<String>,
}

impl BuilderConfig {
    pub fn new(project: &str, done_status_id: &str, jira_base_url: &str) -> Self {
        Self {
            project: project.to_string(),
            done_status_id: done_status_id.to_string(),
            jira_base_url: jira_base_url.trim_end_matches('/').to_string(),
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            component_labels: true,
            unknown_type_label: None,
        }
    }
}

/// Result of building one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built(Box<Issue>),
    /// The record belongs to another project
    Skipped { key: String, project: String },
}

/// Map a lowercased Jira issue type to its canonical label.
pub fn map_issue_type(issue_type: &str) -> Option<&'static str> {
    match issue_type {
        "bug" => Some("bug"),
        "improvement" | "new feature" | "task" | "story" | "patch" => Some("rfe"),
        "epic" => Some("epic"),
        _ => None,
    }
}

/// Parse a Jira timestamp.
///
/// Accepts RFC 2822 (the XML export format), RFC 3339 and
/// `YYYY-MM-DD HH:MM:SS` (taken as UTC). Anything else is logged and `None`.
pub fn parse_jira_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc().fixed_offset());
    }
    tracing::warn!("Unparseable timestamp '{}', treating as absent", raw);
    None
}

fn parse_optional_date(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.and_then(parse_jira_date)
}

/// Builds canonical issues for one project.
pub struct IssueModelBuilder<'a> {
    config: &'a BuilderConfig,
    labels: &'a LabelPolicy,
    import_date: NaiveDate,
}

impl<'a> IssueModelBuilder<'a> {
    pub fn new(config: &'a BuilderConfig, labels: &'a LabelPolicy) -> Self {
        Self {
            config,
            labels,
            import_date: Local::now().date_naive(),
        }
    }

    /// Fix the date rendered as "imported" in the body footer.
    pub fn with_import_date(mut self, date: NaiveDate) -> Self {
        self.import_date = date;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        self.config
    }

    /// Build an issue, or report that the record belongs to another project.
    pub fn build(&self, item: &JiraItem) -> BuildOutcome {
        let project = item.project();
        if project != self.config.project {
            return BuildOutcome::Skipped {
                key: item.key.clone(),
                project: project.to_string(),
            };
        }

        let title = item.title.clone().unwrap_or_default();
        let mut issue = Issue::new(item.key.clone(), title);

        let closed = item.status_category_id.as_deref() == Some(self.config.done_status_id.as_str());
        let resolved = parse_optional_date(item.resolved.as_deref());

        issue.closed = closed;
        issue.closed_at = if closed { resolved } else { None };
        issue.created_at = parse_optional_date(item.created.as_deref());
        issue.updated_at = parse_optional_date(item.updated.as_deref());
        issue.body = self.render_body(item, resolved);
        issue.labels = self.assemble_labels(item);
        issue.set_milestone_name(item.fix_version.clone());

        self.add_subtask_comments(&mut issue, item);
        for comment in &item.comments {
            issue.comments.push(self.render_comment(comment));
        }
        self.add_relationships(&mut issue, item);

        BuildOutcome::Built(Box::new(issue))
    }

    fn profile_url(&self, username: &str) -> String {
        format!(
            "{}/secure/ViewProfile.jspa?name={}",
            self.config.jira_base_url, username
        )
    }

    fn user_link(&self, user: &JiraUser) -> String {
        format!(
            r#"<a title="{}" href="{}">{}</a>"#,
            user.display_name,
            self.profile_url(&user.username),
            user.username
        )
    }

    fn render_body(&self, item: &JiraItem, resolved: Option<DateTime<FixedOffset>>) -> String {
        let mut body = decode_entities(item.description.as_deref());
        let title = item.title.as_deref().unwrap_or_default();
        let reporter = item
            .reporter
            .as_ref()
            .map(|u| self.user_link(u))
            .unwrap_or_else(|| "an unknown user".to_string());

        body.push_str("\n\n---\n<details><summary><i>Originally reported by ");
        body.push_str(&reporter);
        body.push_str(&format!(
            r#", imported from: <a href="{}/browse/{}" target="_blank">{}</a></i></summary>"#,
            self.config.jira_base_url,
            item.key,
            strip_key_tag(title)
        ));

        body.push_str("\n<i><ul>");
        if let Some(assignee) = item.assignee.as_ref() {
            if assignee.display_name != UNASSIGNED {
                body.push_str(&format!("\n<li><b>assignee</b>: {}", self.user_link(assignee)));
            }
        }
        for (name, value) in [
            ("status", item.status.as_deref()),
            ("priority", item.priority.as_deref()),
            ("resolution", item.resolution.as_deref()),
        ] {
            if let Some(value) = value {
                body.push_str(&format!("\n<li><b>{}</b>: {}", name, value));
            }
        }
        if let Some(resolved) = resolved {
            body.push_str(&format!("\n<li><b>resolved</b>: {}", resolved.to_rfc3339()));
        }
        body.push_str(&format!(
            "\n<li><b>imported</b>: {}",
            self.import_date.format("%Y-%m-%d")
        ));
        body.push_str("\n</ul></i>\n</details>");
        body
    }

    fn assemble_labels(&self, item: &JiraItem) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let mut push = |label: String| {
            if !labels.contains(&label) {
                labels.push(label);
            }
        };

        if self.config.component_labels {
            for component in &item.components {
                let component = component.to_lowercase();
                push(format!("{}-component:{}", self.config.source_name, component));
                push(component);
            }
        }

        if let Some(issue_type) = item.issue_type.as_deref() {
            match map_issue_type(&issue_type.to_lowercase()) {
                Some(label) => push(label.to_string()),
                None => {
                    if let Some(fallback) = self.config.unknown_type_label.as_ref() {
                        push(fallback.clone());
                    }
                }
            }
        }

        for label in &item.labels {
            if let Some(label) = self.labels.normalize(&label.trim().to_lowercase()) {
                push(label);
            }
        }

        push(sentinel_label(&self.config.source_name));
        labels
    }

    fn add_subtask_comments(&self, issue: &mut Issue, item: &JiraItem) {
        if !item.subtasks.is_empty() {
            let list: String = item
                .subtasks
                .iter()
                .map(|key| format!("- {}\n", key))
                .collect();
            tracing::debug!(key = %item.key, "Subtasks:\n{}", list);
            issue
                .comments
                .push(Comment::new(issue.created_at, format!("Subtasks:\n\n{}", list)));
        }

        if let Some(parent) = item.parent.as_deref() {
            tracing::debug!(key = %item.key, parent, "Parent task");
            issue.comments.push(Comment::new(
                issue.created_at,
                format!("Subtask of parent task {}", parent),
            ));
        }
    }

    fn render_comment(&self, comment: &JiraComment) -> Comment {
        let body = format!(
            "<i><a href=\"{}\">{}</a>:</i>\n{}",
            self.profile_url(&comment.author),
            comment.author,
            decode_entities(Some(&comment.body))
        );
        Comment::new(parse_optional_date(comment.created.as_deref()), body)
    }

    fn add_relationships(&self, issue: &mut Issue, item: &JiraItem) {
        let Some(relationships) = issue.relationships_mut() else {
            return;
        };

        for link_type in &item.link_types {
            for group in link_type.outward.iter().chain(link_type.inward.iter()) {
                let Some(kind) = group
                    .description
                    .as_deref()
                    .and_then(RelationKind::from_description)
                else {
                    continue;
                };
                relationships
                    .list_mut(kind)
                    .extend(group.keys.iter().cloned());
            }
        }

        relationships.epic_link = item.epic_link.clone();
    }
}

/// Drop a leading `[KEY] ` tag from a Jira title.
fn strip_key_tag(title: &str) -> &str {
    match title.find(']') {
        Some(end) if title.starts_with('[') => title[end + 1..].trim_start(),
        _ => title,
    }
}
