//! Append-only log of migrated issues.
//!
//! One `<jira-key>:<github-number>` line is written per imported issue, right
//! after GitHub confirms the import. The file doubles as the lookup table for
//! the relink pass and as a record of how far a run got.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::Result;

/// Default log file name, relative to the working directory.
pub const DEFAULT_ID_LOG: &str = "jira-keys-to-github-id.txt";

/// Default log for issues imported into the security repository.
pub const DEFAULT_SECURITY_ID_LOG: &str = "jira-keys-to-github-id-security.txt";

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdLogEntry {
    pub key: String,
    pub number: u64,
}

/// Handle on the log file. The file is opened per write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdLog {
    path: PathBuf,
}

impl IdLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `key:number` line, creating the file if needed.
    pub fn append(&self, key: &str, number: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}:{}", key, number)?;
        Ok(())
    }

    /// All well-formed entries in file order. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<IdLogEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(
                    "Skipping malformed line {} in {}: '{}'",
                    line_no + 1,
                    self.path.display(),
                    line
                ),
            }
        }
        Ok(entries)
    }

    /// Key to GitHub number; later lines win.
    pub fn mapping(&self) -> Result<HashMap<String, u64>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| (e.key, e.number))
            .collect())
    }
}

fn parse_line(line: &str) -> Option<IdLogEntry> {
    let (key, number) = line.rsplit_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(IdLogEntry {
        key: key.to_string(),
        number: number.trim().parse().ok()?,
    })
}
