//! Unified precedence resolution for configuration and state.
//!
//! ## Config Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. `JIRA_MIGRATION_*` environment variables
//! 3. Project config (`./j2g.kdl`, or the file given with `-c`)
//! 4. System config.kdl (`~/.config/jira2gh/config.kdl`)
//! 5. Built-in defaults
//!
//! ## Token Precedence (highest to lowest)
//!
//! 1. `JIRA_MIGRATION_GITHUB_ACCESS_TOKEN` environment variable
//! 2. System state.kdl (`~/.local/share/jira2gh/state.kdl`)
//!
//! The resolver is the only place that reads the environment. Everything
//! downstream receives the immutable [`Settings`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::{BuilderConfig, DEFAULT_SOURCE_NAME};
use crate::config::schema::{J2gConfig, J2gState, mask_token};
use crate::github::GithubRepo;
use crate::id_log::{DEFAULT_ID_LOG, DEFAULT_SECURITY_ID_LOG, IdLog};
use crate::jira::xml::split_path_list;
use crate::labels::{LabelPolicy, MissingAllowList};
use crate::{Error, Result};

pub const JIRA_PROJECT_ENV: &str = "JIRA_MIGRATION_JIRA_PROJECT_NAME";
pub const JIRA_URL_ENV: &str = "JIRA_MIGRATION_JIRA_URL";
pub const DONE_ID_ENV: &str = "JIRA_MIGRATION_JIRA_DONE_ID";
pub const FILE_PATHS_ENV: &str = "JIRA_MIGRATION_FILE_PATHS";
pub const GITHUB_TOKEN_ENV: &str = "JIRA_MIGRATION_GITHUB_ACCESS_TOKEN";
pub const GITHUB_ACCOUNT_ENV: &str = "JIRA_MIGRATION_GITHUB_ACCOUNT";
pub const GITHUB_REPO_ENV: &str = "JIRA_MIGRATION_GITHUB_REPO";
pub const SECURITY_REPO_ENV: &str = "JIRA_MIGRATION_SECURITY_REPO";
pub const COMPONENT_LABELS_ENV: &str = "JIRA_MIGRATION_INCLUDE_COMPONENT_IN_LABELS";
pub const JQL_QUERY_ENV: &str = "JIRA_MIGRATION_JQL_QUERY";

/// Overrides the directory holding the system config.kdl.
pub const CONFIG_DIR_ENV: &str = "J2G_CONFIG_DIR";
/// Overrides the directory holding state.kdl.
pub const DATA_DIR_ENV: &str = "J2G_DATA_DIR";

/// File name of the per-project config looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "j2g.kdl";

/// Jira's built-in "Done" status category.
pub const DEFAULT_DONE_STATUS_CATEGORY: &str = "3";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from the project config file
    Project(PathBuf),
    /// Value from system-level config
    System,
    /// Value from state.kdl
    State,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Project(path) => write!(f, "project:{}", path.display()),
            ValueSource::System => write!(f, "system"),
            ValueSource::State => write!(f, "state"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Locations of the files taking part in resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub project: PathBuf,
    /// Whether the project file was named explicitly and must exist
    pub project_required: bool,
    pub system: Option<PathBuf>,
    pub state: Option<PathBuf>,
}

impl ConfigPaths {
    /// Work out file locations from the `-c` flag and the environment.
    pub fn discover(config_flag: Option<&Path>, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let system = match env(CONFIG_DIR_ENV) {
            Some(dir) => Some(PathBuf::from(dir).join("config.kdl")),
            None => dirs::config_dir().map(|d| d.join("jira2gh").join("config.kdl")),
        };
        let state = match env(DATA_DIR_ENV) {
            Some(dir) => Some(PathBuf::from(dir).join("state.kdl")),
            None => dirs::data_dir().map(|d| d.join("jira2gh").join("state.kdl")),
        };

        Self {
            project: config_flag
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE)),
            project_required: config_flag.is_some(),
            system,
            state,
        }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub jira_project: Option<String>,
    pub jira_url: Option<String>,
    pub done_status_category: Option<String>,
    pub github_account: Option<String>,
    pub github_repo: Option<String>,
    pub security_repo: Option<String>,
    pub component_labels: Option<bool>,
    pub labels_mapping: Option<PathBuf>,
    pub allowed_labels: Option<PathBuf>,
    pub missing_allow_list: Option<MissingAllowList>,
    pub id_log: Option<PathBuf>,
    pub security_id_log: Option<PathBuf>,
    pub xml_paths: Option<Vec<PathBuf>>,
    pub jql_query: Option<String>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jira_project(mut self, project: impl Into<String>) -> Self {
        self.jira_project = Some(project.into());
        self
    }

    pub fn with_jira_url(mut self, url: impl Into<String>) -> Self {
        self.jira_url = Some(url.into());
        self
    }

    pub fn with_github_repo(mut self, account: impl Into<String>, repo: impl Into<String>) -> Self {
        self.github_account = Some(account.into());
        self.github_repo = Some(repo.into());
        self
    }

    pub fn with_security_repo(mut self, repo: impl Into<String>) -> Self {
        self.security_repo = Some(repo.into());
        self
    }

    pub fn with_xml_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.xml_paths = Some(paths);
        self
    }

    pub fn with_missing_allow_list(mut self, missing: MissingAllowList) -> Self {
        self.missing_allow_list = Some(missing);
        self
    }
}

/// Immutable, fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jira_project: Option<Resolved<String>>,
    pub jira_url: Option<Resolved<String>>,
    pub done_status_category: Resolved<String>,
    pub github_account: Option<Resolved<String>>,
    pub github_repo: Option<Resolved<String>>,
    /// Target for issues carrying a Jira security level
    pub security_repo: Option<Resolved<String>>,
    pub source_name: Resolved<String>,
    pub component_labels: Resolved<bool>,
    pub labels_mapping: Option<Resolved<PathBuf>>,
    pub allowed_labels: Option<Resolved<PathBuf>>,
    pub missing_allow_list: Resolved<MissingAllowList>,
    pub unknown_type_label: Option<Resolved<String>>,
    pub id_log: Resolved<PathBuf>,
    pub security_id_log: Resolved<PathBuf>,
    pub xml_paths: Resolved<Vec<PathBuf>>,
    pub placeholder_references: Resolved<bool>,
    pub jql_query: Option<Resolved<String>>,
    pub github_token: Option<Resolved<String>>,
    pub paths: ConfigPaths,
}

/// One line of `config show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingEntry {
    pub key: &'static str,
    pub value: Option<String>,
    pub source: Option<String>,
}

fn entry<T>(key: &'static str, value: Option<&Resolved<T>>, show: impl Fn(&T) -> String) -> SettingEntry {
    SettingEntry {
        key,
        value: value.map(|r| show(&r.value)),
        source: value.map(|r| r.source.to_string()),
    }
}

fn show_path(path: &PathBuf) -> String {
    path.display().to_string()
}

impl Settings {
    fn require<'a>(value: &'a Option<Resolved<String>>, key: &str, hint: &str) -> Result<&'a str> {
        value.as_ref().map(|r| r.value.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "{} is not set (use {} or set it in {})",
                key, hint, PROJECT_CONFIG_FILE
            ))
        })
    }

    pub fn require_project(&self) -> Result<&str> {
        Self::require(
            &self.jira_project,
            "jira-project",
            &format!("--project or {}", JIRA_PROJECT_ENV),
        )
    }

    pub fn require_jira_url(&self) -> Result<&str> {
        Self::require(
            &self.jira_url,
            "jira-url",
            &format!("--jira-url or {}", JIRA_URL_ENV),
        )
    }

    pub fn require_repo(&self) -> Result<GithubRepo> {
        let account = Self::require(
            &self.github_account,
            "github-account",
            &format!("--account or {}", GITHUB_ACCOUNT_ENV),
        )?;
        let repo = Self::require(
            &self.github_repo,
            "github-repo",
            &format!("--repo or {}", GITHUB_REPO_ENV),
        )?;
        Ok(GithubRepo::new(account, repo))
    }

    /// The security repository, under the same account as `github-repo`.
    ///
    /// `Ok(None)` when no security repository is configured.
    pub fn security_repo(&self) -> Result<Option<GithubRepo>> {
        let Some(ref repo) = self.security_repo else {
            return Ok(None);
        };
        let account = Self::require(
            &self.github_account,
            "github-account",
            &format!("--account or {}", GITHUB_ACCOUNT_ENV),
        )?;
        Ok(Some(GithubRepo::new(account, &repo.value)))
    }

    pub fn require_token(&self) -> Result<&str> {
        self.github_token
            .as_ref()
            .map(|r| r.value.as_str())
            .ok_or_else(|| {
                Error::Config(format!(
                    "no GitHub token configured (set {} or run `j2g config set-token`)",
                    GITHUB_TOKEN_ENV
                ))
            })
    }

    /// Get the masked token for display purposes.
    pub fn masked_token(&self) -> Option<String> {
        self.github_token.as_ref().map(|r| mask_token(&r.value))
    }

    /// Settings for [`crate::builder::IssueModelBuilder`].
    pub fn builder_config(&self) -> Result<BuilderConfig> {
        let mut config = BuilderConfig::new(
            self.require_project()?,
            &self.done_status_category.value,
            self.require_jira_url()?,
        );
        config.source_name = self.source_name.value.clone();
        config.component_labels = self.component_labels.value;
        config.unknown_type_label = self.unknown_type_label.as_ref().map(|r| r.value.clone());
        Ok(config)
    }

    /// Load the label mapping and allow-list files.
    pub fn label_policy(&self) -> Result<LabelPolicy> {
        LabelPolicy::load(
            self.labels_mapping.as_ref().map(|r| r.value.as_path()),
            self.allowed_labels.as_ref().map(|r| r.value.as_path()),
            self.missing_allow_list.value,
        )
    }

    pub fn id_log(&self) -> IdLog {
        IdLog::new(&self.id_log.value)
    }

    pub fn security_id_log(&self) -> IdLog {
        IdLog::new(&self.security_id_log.value)
    }

    /// Every setting with its source, token masked.
    pub fn entries(&self) -> Vec<SettingEntry> {
        let owned = |s: &String| s.clone();
        vec![
            entry("jira-project", self.jira_project.as_ref(), owned),
            entry("jira-url", self.jira_url.as_ref(), owned),
            entry("done-status-category", Some(&self.done_status_category), owned),
            entry("github-account", self.github_account.as_ref(), owned),
            entry("github-repo", self.github_repo.as_ref(), owned),
            entry("security-repo", self.security_repo.as_ref(), owned),
            entry("source-name", Some(&self.source_name), owned),
            entry("component-labels", Some(&self.component_labels), bool::to_string),
            entry("labels-mapping", self.labels_mapping.as_ref(), show_path),
            entry("allowed-labels", self.allowed_labels.as_ref(), show_path),
            entry("missing-allow-list", Some(&self.missing_allow_list), |m| {
                m.as_str().to_string()
            }),
            entry("unknown-type-label", self.unknown_type_label.as_ref(), owned),
            entry("id-log", Some(&self.id_log), show_path),
            entry("security-id-log", Some(&self.security_id_log), show_path),
            entry("xml-paths", Some(&self.xml_paths), |paths| {
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(";")
            }),
            entry(
                "placeholder-references",
                Some(&self.placeholder_references),
                bool::to_string,
            ),
            entry("jql-query", self.jql_query.as_ref(), owned),
            entry("github-token", self.github_token.as_ref(), |t| mask_token(t)),
        ]
    }
}

/// The two file layers below CLI and environment.
struct FileLayers {
    project: J2gConfig,
    project_path: PathBuf,
    system: J2gConfig,
}

impl FileLayers {
    /// Pick the highest layer that sets a value.
    fn pick<T: Clone>(
        &self,
        cli: Option<&T>,
        env: Option<Resolved<T>>,
        field: impl Fn(&J2gConfig) -> Option<T>,
    ) -> Option<Resolved<T>> {
        if let Some(value) = cli {
            Some(Resolved::new(value.clone(), ValueSource::CliFlag))
        } else if env.is_some() {
            env
        } else if let Some(value) = field(&self.project) {
            Some(Resolved::new(
                value,
                ValueSource::Project(self.project_path.clone()),
            ))
        } else {
            field(&self.system).map(|value| Resolved::new(value, ValueSource::System))
        }
    }
}

/// Read a non-empty environment variable.
fn env_string(env: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<Resolved<String>> {
    env(name)
        .filter(|v| !v.trim().is_empty())
        .map(|v| Resolved::new(v, ValueSource::EnvVar(name.to_string())))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be true or false, got '{}'",
            name, other
        ))),
    }
}

/// Resolve relative paths in a config file against the file's directory.
fn rebase_paths(config: &mut J2gConfig, file: &Path) {
    let Some(base) = file.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    let rebase = |path: &mut PathBuf| {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    };
    let single = [
        config.labels_mapping.as_mut(),
        config.allowed_labels.as_mut(),
        config.id_log.as_mut(),
        config.security_id_log.as_mut(),
    ];
    single.into_iter().flatten().for_each(rebase);
    if let Some(paths) = config.xml_paths.as_mut() {
        paths.iter_mut().for_each(rebase);
    }
}

/// Resolve settings from explicit file locations and an environment lookup.
///
/// This is the testable core of [`resolve_settings`].
pub fn resolve_settings_with(
    overrides: &ConfigOverrides,
    paths: ConfigPaths,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    if paths.project_required && !paths.project.exists() {
        return Err(Error::Config(format!(
            "config file not found: {}",
            paths.project.display()
        )));
    }

    let mut project = J2gConfig::read(&paths.project)?;
    rebase_paths(&mut project, &paths.project);
    let mut system = match paths.system {
        Some(ref path) => J2gConfig::read(path)?,
        None => J2gConfig::new(),
    };
    if let Some(ref path) = paths.system {
        rebase_paths(&mut system, path);
    }
    let state = match paths.state {
        Some(ref path) => J2gState::read(path)?,
        None => J2gState::new(),
    };
    tracing::debug!(project = %paths.project.display(), "Resolving settings");

    let layers = FileLayers {
        project,
        project_path: paths.project.clone(),
        system,
    };

    let component_labels_env = match env_string(env, COMPONENT_LABELS_ENV) {
        Some(raw) => Some(Resolved::new(
            parse_bool(COMPONENT_LABELS_ENV, &raw.value)?,
            raw.source,
        )),
        None => None,
    };
    let xml_paths_env = env_string(env, FILE_PATHS_ENV)
        .map(|raw| Resolved::new(split_path_list(&raw.value), raw.source));

    // Token: env var > state.kdl
    let github_token = if let Some(token) = env_string(env, GITHUB_TOKEN_ENV) {
        Some(token)
    } else {
        state
            .github_token
            .map(|token| Resolved::new(token, ValueSource::State))
    };

    let default = |value| Resolved::new(value, ValueSource::Default);

    Ok(Settings {
        jira_project: layers.pick(
            overrides.jira_project.as_ref(),
            env_string(env, JIRA_PROJECT_ENV),
            |c| c.jira_project.clone(),
        ),
        jira_url: layers.pick(
            overrides.jira_url.as_ref(),
            env_string(env, JIRA_URL_ENV),
            |c| c.jira_url.clone(),
        ),
        done_status_category: layers
            .pick(
                overrides.done_status_category.as_ref(),
                env_string(env, DONE_ID_ENV),
                |c| c.done_status_category.clone(),
            )
            .unwrap_or_else(|| default(DEFAULT_DONE_STATUS_CATEGORY.to_string())),
        github_account: layers.pick(
            overrides.github_account.as_ref(),
            env_string(env, GITHUB_ACCOUNT_ENV),
            |c| c.github_account.clone(),
        ),
        github_repo: layers.pick(
            overrides.github_repo.as_ref(),
            env_string(env, GITHUB_REPO_ENV),
            |c| c.github_repo.clone(),
        ),
        security_repo: layers.pick(
            overrides.security_repo.as_ref(),
            env_string(env, SECURITY_REPO_ENV),
            |c| c.security_repo.clone(),
        ),
        source_name: layers
            .pick(None, None, |c| c.source_name.clone())
            .unwrap_or_else(|| default(DEFAULT_SOURCE_NAME.to_string())),
        component_labels: layers
            .pick(
                overrides.component_labels.as_ref(),
                component_labels_env,
                |c| c.component_labels,
            )
            .unwrap_or_else(|| Resolved::new(true, ValueSource::Default)),
        labels_mapping: layers.pick(overrides.labels_mapping.as_ref(), None, |c| {
            c.labels_mapping.clone()
        }),
        allowed_labels: layers.pick(overrides.allowed_labels.as_ref(), None, |c| {
            c.allowed_labels.clone()
        }),
        missing_allow_list: layers
            .pick(overrides.missing_allow_list.as_ref(), None, |c| {
                c.missing_allow_list
            })
            .unwrap_or_else(|| Resolved::new(MissingAllowList::default(), ValueSource::Default)),
        unknown_type_label: layers.pick(None, None, |c| c.unknown_type_label.clone()),
        id_log: layers
            .pick(overrides.id_log.as_ref(), None, |c| c.id_log.clone())
            .unwrap_or_else(|| Resolved::new(PathBuf::from(DEFAULT_ID_LOG), ValueSource::Default)),
        security_id_log: layers
            .pick(overrides.security_id_log.as_ref(), None, |c| {
                c.security_id_log.clone()
            })
            .unwrap_or_else(|| {
                Resolved::new(PathBuf::from(DEFAULT_SECURITY_ID_LOG), ValueSource::Default)
            }),
        xml_paths: layers
            .pick(overrides.xml_paths.as_ref(), xml_paths_env, |c| {
                c.xml_paths.clone()
            })
            .unwrap_or_else(|| Resolved::new(Vec::new(), ValueSource::Default)),
        placeholder_references: layers
            .pick(None, None, |c| c.placeholder_references)
            .unwrap_or_else(|| Resolved::new(true, ValueSource::Default)),
        jql_query: layers.pick(
            overrides.jql_query.as_ref(),
            env_string(env, JQL_QUERY_ENV),
            |c| c.jql_query.clone(),
        ),
        github_token,
        paths,
    })
}

/// Resolve settings against the real filesystem and process environment.
pub fn resolve_settings(overrides: &ConfigOverrides, config_flag: Option<&Path>) -> Result<Settings> {
    let env = |name: &str| std::env::var(name).ok();
    let paths = ConfigPaths::discover(config_flag, &env);
    resolve_settings_with(overrides, paths, &env)
}

/// Store a token in state.kdl, keeping any other state.
pub fn store_token(paths: &ConfigPaths, token: &str) -> Result<PathBuf> {
    let path = paths
        .state
        .clone()
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    let mut state = J2gState::read(&path)?;
    state.github_token = Some(token.to_string());
    state.write(&path)?;
    tracing::info!(path = %path.display(), "Stored GitHub token");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        env: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                env: HashMap::new(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write(&self, name: &str, content: &str) {
            let path = self.path(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn set_env(&mut self, name: &str, value: &str) {
            self.env.insert(name.to_string(), value.to_string());
        }

        fn paths(&self) -> ConfigPaths {
            ConfigPaths {
                project: self.path("j2g.kdl"),
                project_required: false,
                system: Some(self.path("system/config.kdl")),
                state: Some(self.path("data/state.kdl")),
            }
        }

        fn resolve(&self, overrides: &ConfigOverrides) -> Result<Settings> {
            let env = |name: &str| self.env.get(name).cloned();
            resolve_settings_with(overrides, self.paths(), &env)
        }
    }

    // ==================== ValueSource Tests ====================

    #[test]
    fn test_value_source_display() {
        assert_eq!(ValueSource::CliFlag.to_string(), "cli");
        assert_eq!(
            ValueSource::EnvVar(JIRA_URL_ENV.to_string()).to_string(),
            "env:JIRA_MIGRATION_JIRA_URL"
        );
        assert_eq!(
            ValueSource::Project(PathBuf::from("j2g.kdl")).to_string(),
            "project:j2g.kdl"
        );
        assert_eq!(ValueSource::Default.to_string(), "default");
    }

    // ==================== Config Resolution Tests ====================

    #[test]
    fn test_resolve_defaults() {
        let fixture = Fixture::new();
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();

        assert!(settings.jira_project.is_none());
        assert_eq!(settings.done_status_category.value, "3");
        assert_eq!(settings.done_status_category.source, ValueSource::Default);
        assert_eq!(settings.source_name.value, "jira");
        assert!(settings.component_labels.value);
        assert_eq!(settings.missing_allow_list.value, MissingAllowList::DropAll);
        assert_eq!(settings.id_log.value, PathBuf::from(DEFAULT_ID_LOG));
        assert!(settings.xml_paths.value.is_empty());
        assert!(settings.placeholder_references.value);
        assert!(settings.github_token.is_none());
    }

    #[test]
    fn test_resolve_precedence_chain() {
        let mut fixture = Fixture::new();
        fixture.write(
            "system/config.kdl",
            "jira-project \"SYS\"\njira-url \"https://system.example.com\"\ngithub-account \"sys-acct\"\ngithub-repo \"sys-repo\"\n",
        );
        fixture.write(
            "j2g.kdl",
            "jira-project \"PRJ\"\njira-url \"https://project.example.com\"\ngithub-account \"prj-acct\"\n",
        );
        fixture.set_env(JIRA_PROJECT_ENV, "ENV");
        fixture.set_env(JIRA_URL_ENV, "https://env.example.com");

        let overrides = ConfigOverrides::new().with_jira_project("CLI");
        let settings = fixture.resolve(&overrides).unwrap();

        let project = settings.jira_project.unwrap();
        assert_eq!(project.value, "CLI");
        assert_eq!(project.source, ValueSource::CliFlag);

        let url = settings.jira_url.unwrap();
        assert_eq!(url.value, "https://env.example.com");
        assert_eq!(url.source, ValueSource::EnvVar(JIRA_URL_ENV.to_string()));

        let account = settings.github_account.unwrap();
        assert_eq!(account.value, "prj-acct");
        assert_eq!(account.source, ValueSource::Project(fixture.path("j2g.kdl")));

        let repo = settings.github_repo.unwrap();
        assert_eq!(repo.value, "sys-repo");
        assert_eq!(repo.source, ValueSource::System);
    }

    #[test]
    fn test_resolve_empty_env_is_unset() {
        let mut fixture = Fixture::new();
        fixture.write("j2g.kdl", "jira-project \"PRJ\"\n");
        fixture.set_env(JIRA_PROJECT_ENV, "  ");

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(settings.jira_project.unwrap().value, "PRJ");
    }

    #[test]
    fn test_resolve_file_paths_env_split() {
        let mut fixture = Fixture::new();
        fixture.set_env(FILE_PATHS_ENV, "a.xml;b.xml");

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(
            settings.xml_paths.value,
            vec![PathBuf::from("a.xml"), PathBuf::from("b.xml")]
        );
        assert_eq!(
            settings.xml_paths.source,
            ValueSource::EnvVar(FILE_PATHS_ENV.to_string())
        );
    }

    #[test]
    fn test_resolve_component_labels_env() {
        let mut fixture = Fixture::new();
        fixture.set_env(COMPONENT_LABELS_ENV, "False");
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert!(!settings.component_labels.value);

        fixture.set_env(COMPONENT_LABELS_ENV, "maybe");
        assert!(matches!(
            fixture.resolve(&ConfigOverrides::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_resolve_project_paths_relative_to_file() {
        let fixture = Fixture::new();
        fixture.write(
            "nested/j2g.kdl",
            "labels-mapping \"map.txt\"\nxml-paths \"export.xml\" \"/abs/other.xml\"\n",
        );
        let paths = ConfigPaths {
            project: fixture.path("nested/j2g.kdl"),
            project_required: true,
            ..fixture.paths()
        };

        let settings = resolve_settings_with(&ConfigOverrides::default(), paths, &|_| None).unwrap();
        assert_eq!(
            settings.labels_mapping.unwrap().value,
            fixture.path("nested/map.txt")
        );
        assert_eq!(
            settings.xml_paths.value,
            vec![fixture.path("nested/export.xml"), PathBuf::from("/abs/other.xml")]
        );
    }

    #[test]
    fn test_resolve_security_repo() {
        let mut fixture = Fixture::new();
        fixture.write(
            "j2g.kdl",
            "github-account \"acme\"\ngithub-repo \"widgets\"\nsecurity-repo \"vault\"\n",
        );

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        let repo = settings.security_repo().unwrap().unwrap();
        assert_eq!(repo.account, "acme");
        assert_eq!(repo.repo, "vault");
        assert_eq!(
            settings.security_id_log.value,
            PathBuf::from(DEFAULT_SECURITY_ID_LOG)
        );

        fixture.set_env(SECURITY_REPO_ENV, "restricted");
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(settings.security_repo().unwrap().unwrap().repo, "restricted");
    }

    #[test]
    fn test_resolve_without_security_repo() {
        let fixture = Fixture::new();
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert!(settings.security_repo().unwrap().is_none());
    }

    #[test]
    fn test_resolve_explicit_config_must_exist() {
        let fixture = Fixture::new();
        let paths = ConfigPaths {
            project_required: true,
            ..fixture.paths()
        };
        let err = resolve_settings_with(&ConfigOverrides::default(), paths, &|_| None).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_resolve_invalid_project_config() {
        let fixture = Fixture::new();
        fixture.write("j2g.kdl", "github-repo \"acme/widgets\"\n");
        assert!(fixture.resolve(&ConfigOverrides::default()).is_err());
    }

    // ==================== Token Resolution Tests ====================

    #[test]
    fn test_resolve_token_from_state() {
        let fixture = Fixture::new();
        fixture.write("data/state.kdl", "github-token \"ghp_state_token_1234\"\n");

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        let token = settings.github_token.as_ref().unwrap();
        assert_eq!(token.value, "ghp_state_token_1234");
        assert_eq!(token.source, ValueSource::State);
        assert_eq!(settings.masked_token().unwrap(), "ghp_...1234");
    }

    #[test]
    fn test_resolve_token_env_overrides_state() {
        let mut fixture = Fixture::new();
        fixture.write("data/state.kdl", "github-token \"ghp_state_token\"\n");
        fixture.set_env(GITHUB_TOKEN_ENV, "ghp_env_token_override");

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(settings.require_token().unwrap(), "ghp_env_token_override");
        assert_eq!(
            settings.github_token.unwrap().source,
            ValueSource::EnvVar(GITHUB_TOKEN_ENV.to_string())
        );
    }

    #[test]
    fn test_store_token_preserves_resolution() {
        let fixture = Fixture::new();
        let path = store_token(&fixture.paths(), "ghp_stored_token_value").unwrap();
        assert_eq!(path, fixture.path("data/state.kdl"));

        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        assert_eq!(settings.require_token().unwrap(), "ghp_stored_token_value");
    }

    // ==================== Settings Accessor Tests ====================

    #[test]
    fn test_require_reports_missing_key() {
        let fixture = Fixture::new();
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();

        let err = settings.require_project().unwrap_err();
        assert!(err.to_string().contains("jira-project is not set"));
        assert!(settings.require_repo().is_err());
        assert!(settings.require_token().is_err());
    }

    #[test]
    fn test_builder_config_from_settings() {
        let fixture = Fixture::new();
        fixture.write(
            "j2g.kdl",
            "jira-project \"PROJ\"\njira-url \"https://issues.example.com/\"\nsource-name \"apache\"\nunknown-type-label \"other\"\ncomponent-labels #false\n",
        );
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();
        let config = settings.builder_config().unwrap();

        assert_eq!(config.project, "PROJ");
        assert_eq!(config.jira_base_url, "https://issues.example.com");
        assert_eq!(config.source_name, "apache");
        assert!(!config.component_labels);
        assert_eq!(config.unknown_type_label.as_deref(), Some("other"));
    }

    #[test]
    fn test_entries_mask_token() {
        let mut fixture = Fixture::new();
        fixture.set_env(GITHUB_TOKEN_ENV, "ghp_abcdefghijklmnop");
        let settings = fixture.resolve(&ConfigOverrides::default()).unwrap();

        let entries = settings.entries();
        let token = entries.iter().find(|e| e.key == "github-token").unwrap();
        assert_eq!(token.value.as_deref(), Some("ghp_...mnop"));
        assert_eq!(
            token.source.as_deref(),
            Some("env:JIRA_MIGRATION_GITHUB_ACCESS_TOKEN")
        );

        let project = entries.iter().find(|e| e.key == "jira-project").unwrap();
        assert_eq!(project.value, None);
    }
}
