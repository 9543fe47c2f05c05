//! jira2gh - Migrate Jira XML exports into GitHub.
//!
//! This library provides the core functionality for the `j2g` CLI tool:
//! parsing Jira XML records into a canonical issue model, aggregating them
//! into a project, and replaying that project against the GitHub API as
//! milestones, labels, issues and comments.

pub mod builder;
pub mod cli;
pub mod commands;
pub mod config;
pub mod github;
pub mod html;
pub mod id_log;
pub mod jira;
pub mod labels;
pub mod logging;
pub mod models;
pub mod project;
pub mod relationships;
pub mod relink;


/// Library-level error type for migration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Invalid or expired token: GitHub returned 401 Unauthorized")]
    Unauthorized,

    #[error("Token lacks required permissions: GitHub returned 403 Forbidden")]
    Forbidden,

    #[error("Initial import validation failed for issue '{title}' due to the following errors:\n{body}")]
    ValidationRejected { title: String, body: String },

    #[error("{context}: unexpected HTTP status code {status}\n{body}")]
    UnexpectedStatus {
        context: String,
        status: u16,
        body: String,
    },

    #[error("Failed to import GitHub issue due to the following errors:\n{body}")]
    ImportFailed { body: String },

    #[error("Status check for GitHub issue import returned unexpected status: '{0}'")]
    UnexpectedImportState(String),

    #[error("Milestone '{0}' has no GitHub id: milestones must be synced before issues")]
    MilestoneResolution(String),

    #[error("Import phase out of order: expected {expected}, currently {actual}")]
    PhaseOrder { expected: String, actual: String },

    #[error("Interrupted: resume with --start-from {next_index}")]
    Interrupted { next_index: usize },

    #[error("Import stopped at index {index} ({key}), resume with --start-from {index}: {source}")]
    IssueAborted {
        index: usize,
        key: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Issue {key} was created as #{number} but not recorded in the id log, add it by hand and resume with --start-from {next_index}: {source}")]
    IdLogWrite {
        key: String,
        number: u64,
        next_index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Import into the security repository stopped (add --secured-only when resuming): {0}")]
    SecuredImport(Box<Error>),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;
