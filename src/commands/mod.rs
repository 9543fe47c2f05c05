//! Command implementations for the j2g CLI.
//!
//! Each command takes the resolved [`Settings`] and returns a result type
//! implementing [`Output`], which `main` prints as JSON or human text.
//! Commands that talk to GitHub live in [`migrate`].

mod migrate;

pub use migrate::{
    MigrateOptions, MigratePlan, MigrateReport, MigrateResult, TargetReport, TokenCheckResult,
    check_token, migrate, migrate_with, relink, relink_with,
};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::{BuilderConfig, IssueModelBuilder};
use crate::config::{self, SettingEntry, Settings};
use crate::github::importer::remote_label_name;
use crate::jira::fetch::{self, FetchSummary, SearchSource, UreqSearchSource};
use crate::jira::JiraItem;
use crate::jira::xml::read_xml_files;
use crate::labels::{ColorSelector, DefaultColorSelector, LabelPolicy};
use crate::project::{AddOutcome, ProjectAggregate, ProjectReport};
use crate::relink::RelinkSummary;
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

// ==================== Project loading ====================

/// A project built from the configured export files.
pub struct LoadedProject {
    pub project: ProjectAggregate,
    pub policy: LabelPolicy,
    /// Keys of records that belong to other projects
    pub skipped: Vec<String>,
    /// Keys of issues that carry a Jira security level
    pub secured: Vec<String>,
}

/// The export split by Jira security level, one aggregate per repository.
pub struct LoadedTargets {
    /// Issues without a security level, for github-repo
    pub public: ProjectAggregate,
    /// Issues with a security level, for security-repo
    pub secured: ProjectAggregate,
    pub policy: LabelPolicy,
}

fn read_export(settings: &Settings) -> Result<(BuilderConfig, LabelPolicy, Vec<JiraItem>)> {
    let paths = &settings.xml_paths.value;
    if paths.is_empty() {
        return Err(Error::Config(format!(
            "no XML export files given (pass them as arguments, set {} or xml-paths in {})",
            config::resolver::FILE_PATHS_ENV,
            config::resolver::PROJECT_CONFIG_FILE
        )));
    }

    let builder_config = settings.builder_config()?;
    let policy = settings.label_policy()?;
    let items = read_xml_files(paths)?;
    tracing::info!(records = items.len(), "Read Jira export");
    Ok((builder_config, policy, items))
}

fn build_project<'a>(
    config: &BuilderConfig,
    policy: &LabelPolicy,
    items: impl IntoIterator<Item = &'a JiraItem>,
) -> LoadedProject {
    let mut project = ProjectAggregate::new(&config.project, &config.source_name);
    let mut skipped = Vec::new();
    let mut secured = Vec::new();
    let builder = IssueModelBuilder::new(config, policy);
    for item in items {
        match project.add_item(item, &builder) {
            AddOutcome::Skipped { key, .. } => skipped.push(key),
            _ if item.security.is_some() => secured.push(item.key.clone()),
            _ => {}
        }
    }

    LoadedProject {
        project,
        policy: policy.clone(),
        skipped,
        secured,
    }
}

/// Read every configured XML file and build the project aggregate.
pub fn load_project(settings: &Settings) -> Result<LoadedProject> {
    let (builder_config, policy, items) = read_export(settings)?;
    Ok(build_project(&builder_config, &policy, &items))
}

/// Read the export and build one aggregate per target repository.
pub fn load_targets(settings: &Settings) -> Result<LoadedTargets> {
    let (builder_config, policy, items) = read_export(settings)?;
    let (secured, public): (Vec<&JiraItem>, Vec<&JiraItem>) =
        items.iter().partition(|item| item.security.is_some());

    let public = build_project(&builder_config, &policy, public);
    let secured = build_project(&builder_config, &policy, secured);
    tracing::info!(
        public = public.project.len(),
        secured = secured.project.len(),
        "Split issues by security level"
    );

    Ok(LoadedTargets {
        public: public.project,
        secured: secured.project,
        policy,
    })
}

// ==================== analyze ====================

#[derive(Serialize)]
pub struct AnalyzeResult {
    #[serde(flatten)]
    pub report: ProjectReport,
    pub skipped: usize,
    /// Issues with a Jira security level, imported into security-repo
    pub secured: usize,
}

impl Output for AnalyzeResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut out = self.report.render();
        if self.skipped > 0 {
            out.push_str(&format!(
                "\nSkipped {} record(s) from other projects",
                self.skipped
            ));
        }
        if self.secured > 0 {
            out.push_str(&format!(
                "\n{} issue(s) carry a security level and go to security-repo",
                self.secured
            ));
        }
        out
    }
}

/// Print histograms of what an export contains.
pub fn analyze(settings: &Settings) -> Result<AnalyzeResult> {
    let loaded = load_project(settings)?;
    Ok(AnalyzeResult {
        report: loaded.project.report(),
        skipped: loaded.skipped.len(),
        secured: loaded.secured.len(),
    })
}

// ==================== labels ====================

/// How one raw label will be created on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelPreview {
    pub raw: String,
    pub count: u64,
    /// `None` when the label policy drops it
    pub name: Option<String>,
    pub color: String,
}

#[derive(Serialize)]
pub struct LabelsResult {
    pub labels: Vec<LabelPreview>,
    pub kept: usize,
    pub dropped: usize,
}

impl Output for LabelsResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .labels
            .iter()
            .map(|label| match label.name {
                Some(ref name) => format!(
                    "{:>30} ({:>5}) -> {} #{}",
                    label.raw, label.count, name, label.color
                ),
                None => format!("{:>30} ({:>5}) -> (dropped)", label.raw, label.count),
            })
            .collect();
        lines.push(String::new());
        lines.push(format!("{} kept, {} dropped", self.kept, self.dropped));
        lines.join("\n")
    }
}

/// Normalize the merged label view the way label sync will.
pub fn preview_labels(
    project: &ProjectAggregate,
    policy: &LabelPolicy,
    component_labels: bool,
    colors: &dyn ColorSelector,
) -> Vec<LabelPreview> {
    project
        .all_labels()
        .into_iter()
        .map(|(raw, count)| {
            let is_component = component_labels && project.components().contains_key(&raw);
            LabelPreview {
                name: remote_label_name(&raw, is_component, project.source_name(), policy),
                color: colors.color(&raw),
                count,
                raw,
            }
        })
        .collect()
}

/// Show the label mapping that a migration would apply.
pub fn labels(settings: &Settings) -> Result<LabelsResult> {
    let loaded = load_project(settings)?;
    let labels = preview_labels(
        &loaded.project,
        &loaded.policy,
        settings.component_labels.value,
        &DefaultColorSelector,
    );
    let kept = labels.iter().filter(|l| l.name.is_some()).count();
    Ok(LabelsResult {
        dropped: labels.len() - kept,
        kept,
        labels,
    })
}

// ==================== fetch ====================

impl Output for FetchSummary {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Fetched {} issue(s) into {} page file(s)",
            self.total,
            self.pages.len()
        )];
        lines.extend(self.pages.iter().map(|p| format!("  {}", p.display())));
        if !self.secured.is_empty() {
            lines.push(format!(
                "Issues with a security level: {}",
                self.secured.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// Query used when none is configured.
pub fn default_jql(project: &str) -> String {
    format!("project = {} ORDER BY key ASC", project)
}

/// Download the XML export pages for the configured query.
pub fn fetch(settings: &Settings, out_dir: &Path, page_size: u64) -> Result<FetchSummary> {
    let source = UreqSearchSource::new(settings.require_jira_url()?);
    fetch_with(settings, &source, out_dir, page_size)
}

pub fn fetch_with(
    settings: &Settings,
    source: &dyn SearchSource,
    out_dir: &Path,
    page_size: u64,
) -> Result<FetchSummary> {
    let jql = match settings.jql_query {
        Some(ref query) => query.value.clone(),
        None => default_jql(settings.require_project()?),
    };
    tracing::info!(%jql, "Fetching Jira issues");
    fetch::fetch_all(source, &jql, page_size, out_dir)
}

// ==================== config ====================

#[derive(Serialize)]
pub struct ConfigShowResult {
    pub settings: Vec<SettingEntry>,
    pub project_file: PathBuf,
    pub system_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for entry in &self.settings {
            match (&entry.value, &entry.source) {
                (Some(value), Some(source)) => {
                    lines.push(format!("{:<24} {} ({})", entry.key, value, source))
                }
                _ => lines.push(format!("{:<24} (not set)", entry.key)),
            }
        }
        lines.push(String::new());
        lines.push(format!("project config: {}", self.project_file.display()));
        if let Some(ref path) = self.system_file {
            lines.push(format!("system config:  {}", path.display()));
        }
        if let Some(ref path) = self.state_file {
            lines.push(format!("state:          {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Every resolved setting with its source; the token is masked.
pub fn config_show(settings: &Settings) -> ConfigShowResult {
    ConfigShowResult {
        settings: settings.entries(),
        project_file: settings.paths.project.clone(),
        system_file: settings.paths.system.clone(),
        state_file: settings.paths.state.clone(),
    }
}

#[derive(Serialize)]
pub struct SetTokenResult {
    pub path: PathBuf,
    pub token: String,
}

impl Output for SetTokenResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Stored token {} in {}", self.token, self.path.display())
    }
}

/// Save a GitHub token into state.kdl.
pub fn config_set_token(settings: &Settings, token: &str) -> Result<SetTokenResult> {
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Error::InvalidInput(
            "token must be a single non-empty word".to_string(),
        ));
    }
    let path = config::store_token(&settings.paths, token)?;
    Ok(SetTokenResult {
        path,
        token: config::mask_token(token),
    })
}

// ==================== shared result impls ====================

impl Output for RelinkSummary {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "Scanned {} comment(s), patched {}",
            self.scanned, self.patched
        );
        if !self.unresolved.is_empty() {
            let keys: BTreeSet<&str> = self.unresolved.iter().map(String::as_str).collect();
            out.push_str(&format!(
                "\nKeys without a GitHub issue: {}",
                keys.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        out
    }
}
