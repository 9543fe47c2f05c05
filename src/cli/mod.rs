//! CLI argument definitions for j2g.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::jira::fetch::DEFAULT_PAGE_SIZE;
use crate::labels::MissingAllowList;

/// Version with the commit and build time, for `--version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("J2G_GIT_COMMIT"),
    " ",
    env!("J2G_BUILD_TIMESTAMP"),
    ")"
);

/// j2g - Migrate a Jira XML export into GitHub issues.
///
/// Start with `j2g analyze` to see what an export contains, then
/// `j2g migrate --dry-run` to preview the import.
#[derive(Parser, Debug)]
#[command(name = "j2g")]
#[command(author, version, long_version = LONG_VERSION, about = "Migrate Jira XML exports into GitHub issues", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// More log output on stderr (-v debug, -vv HTTP, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Project config file to use instead of ./j2g.kdl
    #[arg(short = 'c', long = "config", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs to this file
    #[arg(long = "log-file", global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the Jira records come from and how labels are normalized.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Jira XML export files or directories (replaces xml-paths)
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Jira project key; records of other projects are skipped
    #[arg(short = 'p', long)]
    pub project: Option<String>,

    /// Jira base URL, used for profile links and reference rewriting
    #[arg(long)]
    pub jira_url: Option<String>,

    /// statusCategory id that marks an issue as closed
    #[arg(long, value_name = "ID")]
    pub done_id: Option<String>,

    /// File of `jira-label=github-label` lines
    #[arg(long, value_name = "FILE")]
    pub labels_mapping: Option<PathBuf>,

    /// File with one allowed GitHub label per line
    #[arg(long, value_name = "FILE")]
    pub allowed_labels: Option<PathBuf>,

    /// Keep every label when no allow-list file is available
    #[arg(long)]
    pub allow_all_labels: bool,

    /// Do not turn components into labels
    #[arg(long)]
    pub no_component_labels: bool,
}

impl SourceArgs {
    fn apply(&self, mut overrides: ConfigOverrides) -> ConfigOverrides {
        if !self.paths.is_empty() {
            overrides.xml_paths = Some(self.paths.clone());
        }
        overrides.jira_project = self.project.clone();
        overrides.jira_url = self.jira_url.clone();
        overrides.done_status_category = self.done_id.clone();
        overrides.labels_mapping = self.labels_mapping.clone();
        overrides.allowed_labels = self.allowed_labels.clone();
        if self.allow_all_labels {
            overrides.missing_allow_list = Some(MissingAllowList::AllowAll);
        }
        if self.no_component_labels {
            overrides.component_labels = Some(false);
        }
        overrides
    }
}

/// The GitHub repository receiving the issues.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// GitHub user or organization owning the repository
    #[arg(long)]
    pub account: Option<String>,

    /// GitHub repository name
    #[arg(long)]
    pub repo: Option<String>,

    /// File recording `<jira-key>:<issue-number>` per imported issue
    #[arg(long, value_name = "FILE")]
    pub id_log: Option<PathBuf>,

    /// Repository receiving issues that carry a Jira security level
    #[arg(long, value_name = "REPO")]
    pub security_repo: Option<String>,

    /// Id log of the security repository
    #[arg(long, value_name = "FILE")]
    pub security_id_log: Option<PathBuf>,
}

impl TargetArgs {
    fn apply(&self, mut overrides: ConfigOverrides) -> ConfigOverrides {
        overrides.github_account = self.account.clone();
        overrides.github_repo = self.repo.clone();
        overrides.id_log = self.id_log.clone();
        overrides.security_repo = self.security_repo.clone();
        overrides.security_id_log = self.security_id_log.clone();
        overrides
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show milestone, type, component and label histograms of an export
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Preview how labels will be named on GitHub
    Labels {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Download a JQL query from a Jira server as XML page files
    Fetch {
        /// Directory receiving result-<start>.xml files
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Issues per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u64,

        /// JQL query (default: every issue of the project)
        #[arg(long)]
        jql: Option<String>,

        /// Jira project key
        #[arg(short = 'p', long)]
        project: Option<String>,

        /// Jira base URL
        #[arg(long)]
        jira_url: Option<String>,
    },

    /// Import milestones, labels and issues into GitHub
    ///
    /// A failed or interrupted run prints the index to pass to --start-from.
    Migrate {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Index of the first issue to import
        #[arg(long, default_value_t = 0, value_name = "INDEX")]
        start_from: usize,

        /// Show what would be imported without calling GitHub
        #[arg(long)]
        dry_run: bool,

        /// Skip resolving cross-issue references after the import
        #[arg(long)]
        no_relink: bool,

        /// Do not create labels (they already exist)
        #[arg(long)]
        skip_labels: bool,

        /// Only import issues with a security level into security-repo
        #[arg(long)]
        secured_only: bool,
    },

    /// Resolve cross-issue references in imported comments
    Relink {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Validate the configured GitHub token
    CheckToken,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show every resolved setting and where it came from
    Show,

    /// Store a GitHub token in state.kdl, read from stdin
    SetToken,
}

impl Commands {
    /// CLI flags of this command as configuration overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        let overrides = ConfigOverrides::new();
        match self {
            Commands::Analyze { source } | Commands::Labels { source } => source.apply(overrides),
            Commands::Fetch {
                jql,
                project,
                jira_url,
                ..
            } => ConfigOverrides {
                jql_query: jql.clone(),
                jira_project: project.clone(),
                jira_url: jira_url.clone(),
                ..overrides
            },
            Commands::Migrate { source, target, .. } => target.apply(source.apply(overrides)),
            Commands::Relink { target } => target.apply(overrides),
            Commands::CheckToken | Commands::Config { .. } => overrides,
        }
    }
}
