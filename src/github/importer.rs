//! The GitHub import state machine.
//!
//! A run walks through fixed phases:
//!
//! ```text
//! Idle -> MilestonesSynced -> LabelsSynced -> IssuesImporting(i) -> Done
//! ```
//!
//! Calling an operation out of order fails with [`Error::PhaseOrder`].
//! Issues are created with GitHub's asynchronous import API: the issue and
//! its comments are submitted in one request, then a status URL is polled
//! until the import settles. Each created issue is recorded in the
//! [`IdLog`] before the next one starts, so a failed or interrupted run can
//! be resumed by index.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use super::{ApiRequest, GithubRepo, Sleeper, Transport};
use crate::id_log::IdLog;
use crate::labels::{ColorSelector, LabelPolicy};
use crate::models::{Comment, ImportRequest, Issue, IssuePayload};
use crate::project::ProjectAggregate;
use crate::relationships::{IdRewriter, RelationshipRewriter};
use crate::{Error, Result};

/// Wait between import status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Wait between pages of a paginated listing.
pub const PAGE_INTERVAL: Duration = Duration::from_secs(1);

/// Phase of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Idle,
    MilestonesSynced,
    LabelsSynced,
    /// Working on the issue at this index
    IssuesImporting(usize),
    Done,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportPhase::Idle => write!(f, "idle"),
            ImportPhase::MilestonesSynced => write!(f, "milestones-synced"),
            ImportPhase::LabelsSynced => write!(f, "labels-synced"),
            ImportPhase::IssuesImporting(index) => write!(f, "issues-importing({})", index),
            ImportPhase::Done => write!(f, "done"),
        }
    }
}

/// Collaborators of an import run.
pub struct ImportContext<'a> {
    pub transport: &'a dyn Transport,
    pub sleeper: &'a dyn Sleeper,
    pub repo: &'a GithubRepo,
    pub labels: &'a LabelPolicy,
    pub rewriter: &'a dyn IdRewriter,
    pub id_log: &'a IdLog,
    /// Prefix source for `<source>-component:` labels
    pub source_name: &'a str,
    pub component_labels: bool,
}

/// Outcome of [`RemoteImporter::sync_milestones`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MilestoneSummary {
    /// Existing remote milestones reused by title
    pub matched: Vec<String>,
    pub created: Vec<String>,
}

/// Outcome of [`RemoteImporter::sync_labels`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub created: Vec<String>,
    /// Labels rejected by the label policy
    pub dropped: Vec<String>,
    /// Labels GitHub refused to create (usually because they exist)
    pub failed: Vec<String>,
}

/// One issue created on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedIssue {
    pub index: usize,
    pub key: String,
    pub number: u64,
}

/// Outcome of [`RemoteImporter::import_issues`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub start_index: usize,
    pub imported: Vec<ImportedIssue>,
}

/// Drives milestone, label and issue creation against one repository.
pub struct RemoteImporter<'a> {
    ctx: ImportContext<'a>,
    cancel: Option<&'a AtomicBool>,
    phase: ImportPhase,
}

impl<'a> RemoteImporter<'a> {
    pub fn new(ctx: ImportContext<'a>) -> Self {
        Self {
            ctx,
            cancel: None,
            phase: ImportPhase::Idle,
        }
    }

    /// Stop cleanly before the next issue once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    fn expect_phase(&self, expected: ImportPhase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::PhaseOrder {
                expected: expected.to_string(),
                actual: self.phase.to_string(),
            })
        }
    }

    /// Match registry milestones against GitHub and create the missing ones.
    ///
    /// Afterwards every registry entry holds a real milestone number.
    pub fn sync_milestones(&mut self, project: &mut ProjectAggregate) -> Result<MilestoneSummary> {
        self.expect_phase(ImportPhase::Idle)?;
        let mut summary = MilestoneSummary::default();

        let milestone_url = self.ctx.repo.url("/milestones");
        tracing::info!("Importing milestones... {}", milestone_url);

        let mut next = Some(format!("{}?state=all", milestone_url));
        let mut first_page = true;
        while let Some(url) = next.take() {
            if !first_page {
                self.ctx.sleeper.sleep(PAGE_INTERVAL);
            }
            first_page = false;

            let response = self.ctx.transport.send(&ApiRequest::get(&url))?;
            if response.status != 200 {
                return Err(Error::UnexpectedStatus {
                    context: format!("Failed to list milestones from {}", url),
                    status: response.status,
                    body: response.body_text(),
                });
            }

            for milestone in response.body.as_array().into_iter().flatten() {
                let title = milestone.get("title").and_then(Value::as_str);
                let number = milestone.get("number").and_then(Value::as_u64);
                if let (Some(title), Some(number)) = (title, number) {
                    if project.register_milestone(title, number) {
                        tracing::info!("{} found", title);
                        summary.matched.push(title.to_string());
                    }
                }
            }
            next = response.next_page;
        }

        for name in project.unresolved_milestones() {
            let response = self
                .ctx
                .transport
                .send(&ApiRequest::post(&milestone_url, json!({ "title": name })))?;
            if response.status != 201 {
                return Err(Error::UnexpectedStatus {
                    context: format!("Failed to create milestone '{}'", name),
                    status: response.status,
                    body: response.body_text(),
                });
            }
            let number = response
                .body
                .get("number")
                .and_then(Value::as_u64)
                .ok_or_else(|| Error::UnexpectedStatus {
                    context: format!("Created milestone '{}' has no number", name),
                    status: response.status,
                    body: response.body_text(),
                })?;
            project.register_milestone(&name, number);
            tracing::info!("Created milestone {} (#{})", name, number);
            summary.created.push(name);
        }

        self.phase = ImportPhase::MilestonesSynced;
        Ok(summary)
    }

    /// Create one label per name in the merged label view.
    ///
    /// Policy drops are skipped and failed creations are logged; neither
    /// stops the run.
    pub fn sync_labels(
        &mut self,
        project: &ProjectAggregate,
        colors: &dyn ColorSelector,
    ) -> Result<LabelSummary> {
        self.expect_phase(ImportPhase::MilestonesSynced)?;
        let mut summary = LabelSummary::default();

        let label_url = self.ctx.repo.url("/labels");
        tracing::info!("Importing labels... {}", label_url);

        for raw in project.all_labels().keys() {
            let is_component = self.ctx.component_labels && project.components().contains_key(raw);
            let Some(name) =
                remote_label_name(raw, is_component, self.ctx.source_name, self.ctx.labels)
            else {
                tracing::debug!("Label '{}' dropped by label policy", raw);
                summary.dropped.push(raw.clone());
                continue;
            };

            let body = json!({ "name": name, "color": colors.color(raw) });
            let response = self
                .ctx
                .transport
                .send(&ApiRequest::post(&label_url, body))?;
            if response.status == 201 {
                tracing::info!("{}->{}", raw, name);
                summary.created.push(name);
            } else {
                tracing::warn!(
                    "Failure importing label {}: {} {}",
                    name,
                    response.status,
                    response.body_text()
                );
                summary.failed.push(name);
            }
        }

        self.phase = ImportPhase::LabelsSynced;
        Ok(summary)
    }

    /// Move past label creation without touching GitHub, for resumed runs.
    pub fn skip_labels(&mut self) -> Result<()> {
        self.expect_phase(ImportPhase::MilestonesSynced)?;
        self.phase = ImportPhase::LabelsSynced;
        Ok(())
    }

    /// Import every issue from `start_index` on, in aggregate order.
    pub fn import_issues(
        &mut self,
        project: &mut ProjectAggregate,
        start_index: usize,
    ) -> Result<ImportSummary> {
        self.expect_phase(ImportPhase::LabelsSynced)?;
        tracing::info!("Importing issues...");

        let mut summary = ImportSummary {
            start_index,
            imported: Vec::new(),
        };

        for index in start_index..project.len() {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                tracing::warn!("Import interrupted before index {}", index);
                return Err(Error::Interrupted { next_index: index });
            }
            self.phase = ImportPhase::IssuesImporting(index);
            tracing::info!("Index = {}", index);

            let key = project.issues()[index].key().to_string();
            let number = self
                .import_at(project, index)
                .map_err(|source| Error::IssueAborted {
                    index,
                    key: key.clone(),
                    source: Box::new(source),
                })?;
            self.ctx
                .id_log
                .append(&key, number)
                .map_err(|source| Error::IdLogWrite {
                    key: key.clone(),
                    number,
                    next_index: index + 1,
                    source: Box::new(source),
                })?;

            summary.imported.push(ImportedIssue { index, key, number });
        }

        self.phase = ImportPhase::Done;
        Ok(summary)
    }

    fn import_at(&self, project: &mut ProjectAggregate, index: usize) -> Result<u64> {
        let milestone = match project.issues_mut()[index].take_milestone_name() {
            Some(name) => Some(
                project
                    .resolve_milestone_id(&name)
                    .ok_or(Error::MilestoneResolution(name))?,
            ),
            None => None,
        };

        let issue = &mut project.issues_mut()[index];
        self.import_issue_with_comments(issue, milestone)
    }

    /// Rewrite relationships and comments, then create the issue remotely.
    fn import_issue_with_comments(&self, issue: &mut Issue, milestone: Option<u64>) -> Result<u64> {
        tracing::info!(key = issue.key(), labels = ?issue.labels, "Issue");

        RelationshipRewriter::new(&self.ctx.repo.account, &self.ctx.repo.repo, self.ctx.rewriter)
            .convert(issue);

        let comments = mem::take(&mut issue.comments)
            .into_iter()
            .map(|c| Comment::new(c.created_at, self.ctx.rewriter.rewrite(&c.body)))
            .collect();

        let request = ImportRequest {
            issue: IssuePayload::from_issue(issue, milestone),
            comments,
        };
        let status_url = self.upload_issue(&request)?;
        self.wait_for_issue_creation(&status_url)
    }

    /// Submit an issue to the import API and return its status URL.
    pub fn upload_issue(&self, request: &ImportRequest) -> Result<String> {
        let url = self.ctx.repo.url("/import/issues");
        let response = self
            .ctx
            .transport
            .send(&ApiRequest::post(url, serde_json::to_value(request)?))?;

        match response.status {
            202 => response
                .str_field("url")
                .map(str::to_string)
                .ok_or_else(|| Error::UnexpectedStatus {
                    context: format!("Import of '{}' returned no status url", request.issue.title),
                    status: response.status,
                    body: response.body_text(),
                }),
            422 => Err(Error::ValidationRejected {
                title: request.issue.title.clone(),
                body: response.body_text(),
            }),
            status => Err(Error::UnexpectedStatus {
                context: format!("Failed to POST issue: '{}'", request.issue.title),
                status,
                body: response.body_text(),
            }),
        }
    }

    /// Poll an import status URL until it settles; returns the issue number.
    ///
    /// The first poll is immediate. Pending and 404 responses sleep for
    /// [`POLL_INTERVAL`] and poll again.
    pub fn wait_for_issue_creation(&self, status_url: &str) -> Result<u64> {
        loop {
            let response = self.ctx.transport.send(&ApiRequest::get(status_url))?;
            match response.status {
                200 => {}
                404 => {
                    self.ctx.sleeper.sleep(POLL_INTERVAL);
                    continue;
                }
                status => {
                    return Err(Error::UnexpectedStatus {
                        context: format!(
                            "Failed to check GitHub issue import status url: {}",
                            status_url
                        ),
                        status,
                        body: response.body_text(),
                    });
                }
            }

            match response.str_field("status").unwrap_or_default() {
                "pending" => self.ctx.sleeper.sleep(POLL_INTERVAL),
                "imported" => {
                    let issue_url = response.str_field("issue_url").unwrap_or_default();
                    let number = issue_number(issue_url).ok_or_else(|| {
                        Error::UnexpectedImportState(format!(
                            "imported without a usable issue_url: '{}'",
                            issue_url
                        ))
                    })?;
                    tracing::info!(
                        "Imported Issue: {}",
                        issue_url.replace("api.github.com/repos/", "github.com/")
                    );
                    return Ok(number);
                }
                "failed" => {
                    return Err(Error::ImportFailed {
                        body: response.body_text(),
                    });
                }
                other => return Err(Error::UnexpectedImportState(other.to_string())),
            }
        }
    }
}

/// GitHub label name for a raw label; `None` when the policy drops it.
///
/// Components are prefixed with `<source>-component:` before normalization.
pub fn remote_label_name(
    raw: &str,
    is_component: bool,
    source_name: &str,
    policy: &LabelPolicy,
) -> Option<String> {
    let name = raw.to_lowercase();
    if is_component {
        policy.normalize(&format!("{}-component:{}", source_name, name))
    } else {
        policy.normalize(&name)
    }
}

/// Number from the last path segment of an issue URL.
fn issue_number(issue_url: &str) -> Option<u64> {
    issue_url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}
