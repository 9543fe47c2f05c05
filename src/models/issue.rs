//! The canonical issue model and its wire payload.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A comment attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Absent for synthesized relationship comments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<FixedOffset>>,

    pub body: String,
}

impl Comment {
    pub fn new(created_at: Option<DateTime<FixedOffset>>, body: impl Into<String>) -> Self {
        Self {
            created_at,
            body: body.into(),
        }
    }
}

/// Kind of cross-issue relationship carried by a Jira link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Duplicates,
    IsDuplicatedBy,
    IsRelatedTo,
    DependsOn,
    Blocks,
}

impl RelationKind {
    /// All kinds in the order their comments are rendered.
    pub const ALL: [RelationKind; 5] = [
        RelationKind::Duplicates,
        RelationKind::IsDuplicatedBy,
        RelationKind::IsRelatedTo,
        RelationKind::DependsOn,
        RelationKind::Blocks,
    ];

    /// Match a link description such as "is duplicated by".
    ///
    /// Spaces are replaced by `-` before matching; anything unrecognized is `None`.
    pub fn from_description(description: &str) -> Option<Self> {
        match description.trim().replace(' ', "-").as_str() {
            "duplicates" => Some(RelationKind::Duplicates),
            "is-duplicated-by" => Some(RelationKind::IsDuplicatedBy),
            "is-related-to" => Some(RelationKind::IsRelatedTo),
            "depends-on" => Some(RelationKind::DependsOn),
            "blocks" => Some(RelationKind::Blocks),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Duplicates => "duplicates",
            RelationKind::IsDuplicatedBy => "is-duplicated-by",
            RelationKind::IsRelatedTo => "is-related-to",
            RelationKind::DependsOn => "depends-on",
            RelationKind::Blocks => "blocks",
        }
    }
}

/// Structured relationship lists of an issue, keyed by foreign issue key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    pub duplicates: Vec<String>,
    pub is_duplicated_by: Vec<String>,
    pub is_related_to: Vec<String>,
    pub depends_on: Vec<String>,
    pub blocks: Vec<String>,
    pub epic_link: Option<String>,
}

impl Relationships {
    pub fn list(&self, kind: RelationKind) -> &[String] {
        match kind {
            RelationKind::Duplicates => &self.duplicates,
            RelationKind::IsDuplicatedBy => &self.is_duplicated_by,
            RelationKind::IsRelatedTo => &self.is_related_to,
            RelationKind::DependsOn => &self.depends_on,
            RelationKind::Blocks => &self.blocks,
        }
    }

    pub fn list_mut(&mut self, kind: RelationKind) -> &mut Vec<String> {
        match kind {
            RelationKind::Duplicates => &mut self.duplicates,
            RelationKind::IsDuplicatedBy => &mut self.is_duplicated_by,
            RelationKind::IsRelatedTo => &mut self.is_related_to,
            RelationKind::DependsOn => &mut self.depends_on,
            RelationKind::Blocks => &mut self.blocks,
        }
    }

    pub fn is_empty(&self) -> bool {
        RelationKind::ALL.iter().all(|k| self.list(*k).is_empty()) && self.epic_link.is_none()
    }
}

/// The canonical unit of migration.
///
/// Relationships live in an `Option` that can only be taken, never put back,
/// so an issue that went through relationship rewriting stays clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    key: String,
    pub title: String,
    pub body: String,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub closed_at: Option<DateTime<FixedOffset>>,
    pub closed: bool,
    pub labels: Vec<String>,
    milestone_name: Option<String>,
    pub comments: Vec<Comment>,
    relationships: Option<Relationships>,
}

impl Issue {
    /// Create an issue with empty relationship lists.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            body: String::new(),
            created_at: None,
            updated_at: None,
            closed_at: None,
            closed: false,
            labels: Vec::new(),
            milestone_name: None,
            comments: Vec::new(),
            relationships: Some(Relationships::default()),
        }
    }

    /// Source identifier, e.g. "PROJ-123".
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn milestone_name(&self) -> Option<&str> {
        self.milestone_name.as_deref()
    }

    pub fn set_milestone_name(&mut self, name: Option<String>) {
        self.milestone_name = name;
    }

    /// Remove the transient milestone name.
    pub fn take_milestone_name(&mut self) -> Option<String> {
        self.milestone_name.take()
    }

    pub fn relationships(&self) -> Option<&Relationships> {
        self.relationships.as_ref()
    }

    /// Mutable access while the relationships have not been taken.
    pub fn relationships_mut(&mut self) -> Option<&mut Relationships> {
        self.relationships.as_mut()
    }

    /// Remove the structured relationships. Later calls return `None`.
    pub fn take_relationships(&mut self) -> Option<Relationships> {
        self.relationships.take()
    }

    /// Add a label unless it is already present.
    pub fn push_label(&mut self, label: String) {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }
}

/// Issue fields as sent to `POST /import/issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<FixedOffset>>,
    pub closed: bool,
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

impl IssuePayload {
    /// Build the payload from an issue and its resolved milestone number.
    pub fn from_issue(issue: &Issue, milestone: Option<u64>) -> Self {
        Self {
            title: issue.title.clone(),
            body: issue.body.clone(),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
            closed: issue.closed,
            labels: issue.labels.clone(),
            milestone,
        }
    }
}

/// Request body of `POST /import/issues`.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRequest {
    pub issue: IssuePayload,
    pub comments: Vec<Comment>,
}
