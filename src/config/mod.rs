//! Configuration and state management for jira2gh.
//!
//! This module defines KDL schemas for two distinct files:
//!
//! ## config.kdl - Migration preferences
//!
//! Located at:
//! - Project: `./j2g.kdl`, or the file passed with `-c/--config`
//! - System: `~/.config/jira2gh/config.kdl`
//!
//! Contains the Jira source (`jira-project`, `jira-url`,
//! `done-status-category`, `xml-paths`), the GitHub target (`github-account`,
//! `github-repo`) and the label policy (`labels-mapping`, `allowed-labels`,
//! `missing-allow-list`, `component-labels`).
//!
//! ## state.kdl - Secrets
//!
//! Located at `~/.local/share/jira2gh/state.kdl`. Contains `github-token`.
//!
//! ## Security
//!
//! **CRITICAL**: `state.kdl` MUST be created with 0600 permissions (owner read/write only)
//! because it contains the GitHub token.
//!
//! ## Precedence
//!
//! For tokens: env var > state.kdl
//! For preferences: CLI flag > env var > project config > system config > defaults
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, ConfigPaths, Resolved, SettingEntry, Settings, ValueSource,
    resolve_settings, resolve_settings_with, store_token,
};
pub use schema::{J2gConfig, J2gState, mask_token};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};
