//! Project aggregate: the ordered issue list plus frequency histograms.
//!
//! Records are added once, in file order, and that order is the import
//! order. Histograms count raw (pre-normalization) names per occurrence.
//! The milestone registry is seeded from the milestone histogram and later
//! filled with real GitHub milestone numbers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::builder::{BuildOutcome, IssueModelBuilder};
use crate::jira::JiraItem;
use crate::models::{sentinel_label, Issue};

/// Name to occurrence count.
pub type Histogram = BTreeMap<String, u64>;

/// Result of [`ProjectAggregate::add_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { index: usize },
    Skipped { key: String, project: String },
}

/// Remote id state of one milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneId {
    /// Seen in the export, not yet matched or created remotely
    Placeholder,
    Remote(u64),
}

/// Milestone name to GitHub milestone number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MilestoneRegistry {
    entries: BTreeMap<String, MilestoneId>,
}

impl MilestoneRegistry {
    /// Add a name with a placeholder id unless already known.
    pub fn seed(&mut self, name: &str) {
        self.entries
            .entry(name.to_string())
            .or_insert(MilestoneId::Placeholder);
    }

    /// Overwrite a known entry with its remote number.
    ///
    /// Returns `false` and changes nothing when `name` was never seeded.
    pub fn register_milestone(&mut self, name: &str, id: u64) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                *entry = MilestoneId::Remote(id);
                true
            }
            None => false,
        }
    }

    pub fn resolve_milestone_id(&self, name: &str) -> Option<u64> {
        match self.entries.get(name) {
            Some(MilestoneId::Remote(id)) => Some(*id),
            _ => None,
        }
    }

    /// Names still holding a placeholder, in name order.
    pub fn unresolved(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, id)| **id == MilestoneId::Placeholder)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All issues of one project plus the histograms built while adding them.
#[derive(Debug, Clone)]
pub struct ProjectAggregate {
    name: String,
    source_name: String,
    sentinel: String,
    issues: Vec<Issue>,
    milestones: Histogram,
    components: Histogram,
    labels: Histogram,
    types: Histogram,
    registry: MilestoneRegistry,
}

impl ProjectAggregate {
    pub fn new(name: &str, source_name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_name: source_name.to_string(),
            sentinel: sentinel_label(source_name),
            issues: Vec::new(),
            milestones: Histogram::new(),
            components: Histogram::new(),
            labels: Histogram::new(),
            types: Histogram::new(),
            registry: MilestoneRegistry::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build `item` and append it, updating histograms and the registry.
    ///
    /// Records of other projects are skipped without touching any state.
    pub fn add_item(&mut self, item: &JiraItem, builder: &IssueModelBuilder<'_>) -> AddOutcome {
        let issue = match builder.build(item) {
            BuildOutcome::Built(issue) => *issue,
            BuildOutcome::Skipped { key, project } => {
                tracing::info!(
                    "Skipping item {} for project {} current project: {}",
                    key,
                    project,
                    self.name
                );
                return AddOutcome::Skipped { key, project };
            }
        };

        if let Some(milestone) = issue.milestone_name() {
            bump(&mut self.milestones, milestone);
            self.registry.seed(milestone);
        }
        for component in &item.components {
            bump(&mut self.components, component);
        }
        for label in &item.labels {
            bump(&mut self.labels, label);
        }
        if let Some(issue_type) = item.issue_type.as_deref() {
            bump(&mut self.types, issue_type);
        }

        self.issues.push(issue);
        AddOutcome::Added {
            index: self.issues.len() - 1,
        }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Issues may be edited in place but never added or removed here.
    pub fn issues_mut(&mut self) -> &mut [Issue] {
        &mut self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn milestones(&self) -> &Histogram {
        &self.milestones
    }

    pub fn components(&self) -> &Histogram {
        &self.components
    }

    pub fn labels(&self) -> &Histogram {
        &self.labels
    }

    pub fn types(&self) -> &Histogram {
        &self.types
    }

    /// Prefix used for the sentinel and component labels.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Components, labels and types merged, plus the sentinel with count 0.
    ///
    /// Later maps win on name clashes.
    pub fn all_labels(&self) -> Histogram {
        let mut merged = self.components.clone();
        merged.extend(self.labels.iter().map(|(k, v)| (k.clone(), *v)));
        merged.extend(self.types.iter().map(|(k, v)| (k.clone(), *v)));
        merged.insert(self.sentinel.clone(), 0);
        merged
    }

    pub fn registry(&self) -> &MilestoneRegistry {
        &self.registry
    }

    pub fn register_milestone(&mut self, name: &str, id: u64) -> bool {
        self.registry.register_milestone(name, id)
    }

    pub fn resolve_milestone_id(&self, name: &str) -> Option<u64> {
        self.registry.resolve_milestone_id(name)
    }

    pub fn unresolved_milestones(&self) -> Vec<String> {
        self.registry.unresolved()
    }

    /// Snapshot of the histograms for display.
    pub fn report(&self) -> ProjectReport {
        ProjectReport {
            project: self.name.clone(),
            milestones: self.milestones.clone(),
            types: self.types.clone(),
            components: self.components.clone(),
            labels: self.labels.clone(),
            total_issues: self.issues.len(),
        }
    }
}

fn bump(histogram: &mut Histogram, name: &str) {
    *histogram.entry(name.to_string()).or_insert(0) += 1;
}

/// Histogram summary of a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub milestones: Histogram,
    pub types: Histogram,
    pub components: Histogram,
    pub labels: Histogram,
    pub total_issues: usize,
}

impl ProjectReport {
    /// Render as indented histograms with one `#` per occurrence.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("{}:", self.project)];
        for (title, histogram) in [
            ("Milestones", &self.milestones),
            ("Types", &self.types),
            ("Components", &self.components),
            ("Labels", &self.labels),
        ] {
            lines.push(format!("  {}:", title));
            for (name, count) in histogram {
                lines.push(format!(
                    "{:>30} ({:>5}): {}",
                    name,
                    count,
                    "#".repeat(*count as usize)
                ));
            }
        }
        lines.push(String::new());
        lines.push(format!("Total Issues to Import: {}", self.total_issues));
        lines.join("\n")
    }
}
