//! Commands that talk to GitHub: `migrate`, `relink` and `check-token`.
//!
//! Issues with a Jira security level go to `security-repo`, everything else
//! to `github-repo`. Each repository gets its own milestone and label sync,
//! its own id log and its own relink pass.

use std::sync::atomic::AtomicBool;

use serde::Serialize;

use super::{LabelPreview, Output, json_string, load_targets, preview_labels};
use crate::config::Settings;
use crate::config::resolver::SECURITY_REPO_ENV;
use crate::github::importer::{
    ImportContext, ImportSummary, LabelSummary, MilestoneSummary, RemoteImporter,
};
use crate::github::{
    GithubRepo, Sleeper, ThreadSleeper, Transport, UreqTransport, validate_github_user,
};
use crate::id_log::IdLog;
use crate::labels::{DefaultColorSelector, LabelPolicy};
use crate::project::ProjectAggregate;
use crate::relationships::{IdRewriter, IdentityRewriter, PlaceholderRewriter};
use crate::relink::{RelinkSummary, Relinker};
use crate::{Error, Result};

/// Flags of `j2g migrate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Index of the first issue to import
    pub start_from: usize,
    /// Build and report the plan without calling GitHub
    pub dry_run: bool,
    pub no_relink: bool,
    /// Assume labels already exist (typical for resumed runs)
    pub skip_labels: bool,
    /// Only import into the security repository; `start_from` indexes its issues
    pub secured_only: bool,
}

/// What a migration would do.
#[derive(Debug, Serialize)]
pub struct MigratePlan {
    pub project: String,
    /// `account/repo`, when configured
    pub repository: Option<String>,
    pub total_issues: usize,
    pub start_index: usize,
    pub to_import: usize,
    pub first_key: Option<String>,
    pub last_key: Option<String>,
    pub milestones: Vec<String>,
    pub labels: Vec<LabelPreview>,
    /// Plan for the issues with a security level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secured: Option<Box<MigratePlan>>,
}

impl MigratePlan {
    fn new(
        project: &ProjectAggregate,
        repository: Option<&GithubRepo>,
        labels: Vec<LabelPreview>,
        start_index: usize,
    ) -> Self {
        let pending = project.issues().get(start_index..).unwrap_or_default();
        Self {
            project: project.name().to_string(),
            repository: repository.map(|r| format!("{}/{}", r.account, r.repo)),
            total_issues: project.len(),
            start_index,
            to_import: pending.len(),
            first_key: pending.first().map(|i| i.key().to_string()),
            last_key: pending.last().map(|i| i.key().to_string()),
            milestones: project.registry().names().map(str::to_string).collect(),
            labels,
            secured: None,
        }
    }

    fn render(&self, lines: &mut Vec<String>) {
        let into = self.repository.as_deref().unwrap_or("(no repository configured)");
        lines.push(format!(
            "Dry run for {} into {}: {} of {} issue(s) from index {}",
            self.project, into, self.to_import, self.total_issues, self.start_index
        ));
        if let (Some(first), Some(last)) = (&self.first_key, &self.last_key) {
            lines.push(format!("  issues: {} .. {}", first, last));
        }
        lines.push(format!("  milestones: {}", self.milestones.join(", ")));
        let kept: Vec<&str> = self
            .labels
            .iter()
            .filter_map(|l| l.name.as_deref())
            .collect();
        lines.push(format!("  labels: {}", kept.join(", ")));
    }
}

/// What a migration did in one repository.
#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub repository: String,
    pub milestones: MilestoneSummary,
    /// `None` when label creation was skipped
    pub labels: Option<LabelSummary>,
    pub import: ImportSummary,
    pub relink: Option<RelinkSummary>,
}

/// What a migration did.
#[derive(Debug, Serialize)]
pub struct MigrateReport {
    pub user: String,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum MigrateResult {
    DryRun(MigratePlan),
    Migrated(MigrateReport),
}

impl Output for MigrateResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match self {
            MigrateResult::DryRun(plan) => {
                plan.render(&mut lines);
                if let Some(ref secured) = plan.secured {
                    secured.render(&mut lines);
                }
            }
            MigrateResult::Migrated(report) => {
                if report.targets.is_empty() {
                    lines.push(format!("Nothing to import (as {})", report.user));
                }
                for target in &report.targets {
                    lines.push(format!(
                        "Migrated {} issue(s) into {} as {}",
                        target.import.imported.len(),
                        target.repository,
                        report.user
                    ));
                    lines.push(format!(
                        "  milestones: {} matched, {} created",
                        target.milestones.matched.len(),
                        target.milestones.created.len()
                    ));
                    match target.labels {
                        Some(ref labels) => lines.push(format!(
                            "  labels: {} created, {} dropped, {} failed",
                            labels.created.len(),
                            labels.dropped.len(),
                            labels.failed.len()
                        )),
                        None => lines.push("  labels: skipped".to_string()),
                    }
                    if let Some(last) = target.import.imported.last() {
                        lines.push(format!("  last issue: {} -> #{}", last.key, last.number));
                    }
                    if let Some(ref relink) = target.relink {
                        lines.push(format!("  {}", relink.to_human().replace('\n', "\n  ")));
                    }
                }
            }
        }
        lines.join("\n")
    }
}

/// Run a migration against github.com with the configured token.
pub fn migrate(
    settings: &Settings,
    options: MigrateOptions,
    cancel: &AtomicBool,
) -> Result<MigrateResult> {
    if options.dry_run {
        return dry_run(settings, options);
    }
    let transport = UreqTransport::new(settings.require_token()?);
    migrate_with(settings, options, &transport, &ThreadSleeper, cancel)
}

fn dry_run(settings: &Settings, options: MigrateOptions) -> Result<MigrateResult> {
    let loaded = load_targets(settings)?;
    let repo = settings.require_repo().ok();
    let security_repo = settings.security_repo()?;
    let plan_for = |project: &ProjectAggregate, repo: Option<&GithubRepo>, start: usize| {
        let labels = preview_labels(
            project,
            &loaded.policy,
            settings.component_labels.value,
            &DefaultColorSelector,
        );
        MigratePlan::new(project, repo, labels, start)
    };

    if options.secured_only {
        return Ok(MigrateResult::DryRun(plan_for(
            &loaded.secured,
            security_repo.as_ref(),
            options.start_from,
        )));
    }

    let mut plan = plan_for(&loaded.public, repo.as_ref(), options.start_from);
    if !loaded.secured.is_empty() {
        plan.secured = Some(Box::new(plan_for(
            &loaded.secured,
            security_repo.as_ref(),
            0,
        )));
    }
    Ok(MigrateResult::DryRun(plan))
}

fn missing_security_repo(secured: &ProjectAggregate) -> Error {
    let keys: Vec<&str> = secured.issues().iter().map(|i| i.key()).collect();
    if keys.is_empty() {
        return Error::Config(format!(
            "--secured-only needs security-repo (use --security-repo or {})",
            SECURITY_REPO_ENV
        ));
    }
    Error::Config(format!(
        "{} issue(s) carry a Jira security level ({}) but security-repo is not set (use --security-repo or {})",
        keys.len(),
        keys.join(", "),
        SECURITY_REPO_ENV
    ))
}

/// Migration with explicit collaborators.
pub fn migrate_with(
    settings: &Settings,
    options: MigrateOptions,
    transport: &dyn Transport,
    sleeper: &dyn Sleeper,
    cancel: &AtomicBool,
) -> Result<MigrateResult> {
    if options.dry_run {
        return dry_run(settings, options);
    }

    let repo = settings.require_repo()?;
    let security_repo = settings.security_repo()?;
    let mut loaded = load_targets(settings)?;
    if security_repo.is_none() && (options.secured_only || !loaded.secured.is_empty()) {
        return Err(missing_security_repo(&loaded.secured));
    }

    let first_target = if options.secured_only {
        &loaded.secured
    } else {
        &loaded.public
    };
    if options.start_from > first_target.len() {
        tracing::warn!(
            start = options.start_from,
            issues = first_target.len(),
            "Start index is past the last issue"
        );
    }

    let user = validate_github_user(transport, repo.api_base())?;
    tracing::info!(login = %user.login, "GitHub token validated");

    let placeholders;
    let rewriter: &dyn IdRewriter = if settings.placeholder_references.value {
        placeholders = PlaceholderRewriter::new(loaded.public.name(), settings.require_jira_url()?)?;
        &placeholders
    } else {
        &IdentityRewriter
    };

    let run = TargetRun {
        settings,
        transport,
        sleeper,
        cancel,
        policy: &loaded.policy,
        rewriter,
        relink: !options.no_relink && settings.placeholder_references.value,
    };

    let mut targets = Vec::new();
    if !options.secured_only {
        targets.push(run.import(
            &repo,
            &settings.id_log(),
            &mut loaded.public,
            options.start_from,
            options.skip_labels,
        )?);
    }

    match security_repo {
        Some(ref security_repo) if !loaded.secured.is_empty() => {
            let (start_from, skip_labels) = if options.secured_only {
                (options.start_from, options.skip_labels)
            } else {
                (0, false)
            };
            let report = run.import(
                security_repo,
                &settings.security_id_log(),
                &mut loaded.secured,
                start_from,
                skip_labels,
            );
            match report {
                Ok(report) => targets.push(report),
                Err(e) if options.secured_only => return Err(e),
                Err(e) => return Err(Error::SecuredImport(Box::new(e))),
            }
        }
        _ => tracing::info!("No issues with a security level to import"),
    }

    Ok(MigrateResult::Migrated(MigrateReport {
        user: user.login,
        targets,
    }))
}

/// Collaborators shared by the per-repository imports of one run.
struct TargetRun<'a> {
    settings: &'a Settings,
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    cancel: &'a AtomicBool,
    policy: &'a LabelPolicy,
    rewriter: &'a dyn IdRewriter,
    relink: bool,
}

impl TargetRun<'_> {
    fn import(
        &self,
        repo: &GithubRepo,
        id_log: &IdLog,
        project: &mut ProjectAggregate,
        start_from: usize,
        skip_labels: bool,
    ) -> Result<TargetReport> {
        let repository = format!("{}/{}", repo.account, repo.repo);
        tracing::info!(%repository, issues = project.len(), start_from, "Importing into repository");

        let mut importer = RemoteImporter::new(ImportContext {
            transport: self.transport,
            sleeper: self.sleeper,
            repo,
            labels: self.policy,
            rewriter: self.rewriter,
            id_log,
            source_name: &self.settings.source_name.value,
            component_labels: self.settings.component_labels.value,
        })
        .with_cancel_flag(self.cancel);

        let milestones = importer.sync_milestones(project)?;
        let labels = if skip_labels {
            importer.skip_labels()?;
            None
        } else {
            Some(importer.sync_labels(project, &DefaultColorSelector)?)
        };
        let import = importer.import_issues(project, start_from)?;

        let relink = if self.relink {
            Some(relink_target(self.transport, self.sleeper, repo, id_log)?)
        } else {
            None
        };

        Ok(TargetReport {
            repository,
            milestones,
            labels,
            import,
            relink,
        })
    }
}

/// Resolve placeholders in already imported comments.
pub fn relink(settings: &Settings) -> Result<RelinkSummary> {
    let transport = UreqTransport::new(settings.require_token()?);
    relink_with(settings, &transport, &ThreadSleeper)
}

/// Relink `github-repo`, then `security-repo` when it has imported issues.
pub fn relink_with(
    settings: &Settings,
    transport: &dyn Transport,
    sleeper: &dyn Sleeper,
) -> Result<RelinkSummary> {
    let repo = settings.require_repo()?;
    let mut summary = relink_target(transport, sleeper, &repo, &settings.id_log())?;

    if let Some(security_repo) = settings.security_repo()? {
        let id_log = settings.security_id_log();
        if id_log.mapping()?.is_empty() {
            tracing::info!(path = %id_log.path().display(), "Security id log is empty, skipping security repository");
        } else {
            let secured = relink_target(transport, sleeper, &security_repo, &id_log)?;
            summary.scanned += secured.scanned;
            summary.patched += secured.patched;
            summary.unresolved.extend(secured.unresolved);
        }
    }
    Ok(summary)
}

fn relink_target(
    transport: &dyn Transport,
    sleeper: &dyn Sleeper,
    repo: &GithubRepo,
    id_log: &IdLog,
) -> Result<RelinkSummary> {
    let mapping = id_log.mapping()?;
    if mapping.is_empty() {
        tracing::warn!(path = %id_log.path().display(), "Id log is empty, placeholders will become bare keys");
    }
    Relinker::new(transport, sleeper, repo, &mapping).run()
}

/// Result of `j2g check-token`.
#[derive(Debug, Serialize)]
pub struct TokenCheckResult {
    pub valid: bool,
    pub login: String,
    pub name: Option<String>,
    /// Masked token
    pub token: String,
    pub source: String,
}

impl Output for TokenCheckResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let who = match self.name {
            Some(ref name) => format!("{} ({})", self.login, name),
            None => self.login.clone(),
        };
        format!("Token {} from {} is valid for {}", self.token, self.source, who)
    }
}

/// Validate the configured token against GET /user.
pub fn check_token(settings: &Settings) -> Result<TokenCheckResult> {
    let transport = UreqTransport::new(settings.require_token()?);
    check_token_with(settings, &transport)
}

fn check_token_with(settings: &Settings, transport: &dyn Transport) -> Result<TokenCheckResult> {
    settings.require_token()?;
    let user = validate_github_user(transport, crate::github::GITHUB_API_BASE)?;
    Ok(TokenCheckResult {
        valid: true,
        login: user.login,
        name: user.name,
        token: settings.masked_token().unwrap_or_default(),
        source: settings
            .github_token
            .as_ref()
            .map(|r| r.source.to_string())
            .unwrap_or_default(),
    })
}
