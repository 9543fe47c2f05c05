//! Resolve cross-issue placeholders in already imported comments.
//!
//! Comments are submitted before every referenced issue has a GitHub number,
//! so references travel as `@PSTART<KEY>@PEND` tokens. Once the id log is
//! complete this pass lists every comment of the repository and patches the
//! ones that still carry tokens.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{json, Value};

use crate::github::importer::PAGE_INTERVAL;
use crate::github::{ApiRequest, GithubRepo, Sleeper, Transport};
use crate::relationships::PLACEHOLDER_PREFIX;
use crate::{Error, Result};

/// An anchor `href` holding a placeholder token anywhere in its value.
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r#"href="[^"]*@PSTART([A-Za-z0-9_]+-\d+)@PEND[^"]*""#) {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"@PSTART([A-Za-z0-9_]+-\d+)@PEND") {
        Ok(re) => re,
        Err(_) => unreachable!("static regex pattern"),
    });

/// Outcome of a relink run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelinkSummary {
    pub scanned: usize,
    pub patched: usize,
    /// Keys without an id log entry, left as bare keys
    pub unresolved: Vec<String>,
}

/// Replace placeholder tokens in one comment body.
///
/// Anchors pointing at a known key link to the GitHub issue; every other
/// token becomes `#<number>` or, for unknown keys, the bare key. Returns the
/// new body and the unknown keys.
pub fn relink_body(
    body: &str,
    mapping: &HashMap<String, u64>,
    repo: &GithubRepo,
) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();

    let linked = HREF_RE.replace_all(body, |caps: &Captures<'_>| match mapping.get(&caps[1]) {
        Some(number) => format!(
            r#"href="https://github.com/{}/{}/issues/{}""#,
            repo.account, repo.repo, number
        ),
        None => caps[0].to_string(),
    });

    let resolved = TOKEN_RE.replace_all(&linked, |caps: &Captures<'_>| match mapping.get(&caps[1]) {
        Some(number) => format!("#{}", number),
        None => {
            unresolved.push(caps[1].to_string());
            caps[1].to_string()
        }
    });

    (resolved.into_owned(), unresolved)
}

/// Lists and patches repository comments.
pub struct Relinker<'a> {
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    repo: &'a GithubRepo,
    mapping: &'a HashMap<String, u64>,
}

impl<'a> Relinker<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        repo: &'a GithubRepo,
        mapping: &'a HashMap<String, u64>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            repo,
            mapping,
        }
    }

    /// Walk every comment page and patch bodies that still hold tokens.
    pub fn run(&self) -> Result<RelinkSummary> {
        let mut summary = RelinkSummary::default();
        let mut unresolved = BTreeSet::new();

        let mut next = Some(self.repo.url("/issues/comments?per_page=100"));
        let mut first_page = true;
        while let Some(url) = next.take() {
            if !first_page {
                self.sleeper.sleep(PAGE_INTERVAL);
            }
            first_page = false;

            tracing::info!("listing comments using {}", url);
            let response = self.transport.send(&ApiRequest::get(&url))?;
            if response.status != 200 {
                return Err(Error::UnexpectedStatus {
                    context: "Failed to list all comments".to_string(),
                    status: response.status,
                    body: response.body_text(),
                });
            }

            for comment in response.body.as_array().into_iter().flatten() {
                summary.scanned += 1;
                let body = comment.get("body").and_then(Value::as_str).unwrap_or_default();
                if !body.contains(PLACEHOLDER_PREFIX) {
                    continue;
                }
                let Some(comment_url) = comment.get("url").and_then(Value::as_str) else {
                    tracing::warn!("Comment without url holds placeholders, skipping");
                    continue;
                };

                let (new_body, missing) = relink_body(body, self.mapping, self.repo);
                unresolved.extend(missing);
                if new_body != body {
                    self.patch_comment(comment_url, &new_body)?;
                    summary.patched += 1;
                }
            }
            next = response.next_page;
        }

        summary.unresolved = unresolved.into_iter().collect();
        Ok(summary)
    }

    fn patch_comment(&self, url: &str, body: &str) -> Result<()> {
        tracing::info!("patching comment {}", url);
        let response = self
            .transport
            .send(&ApiRequest::patch(url, json!({ "body": body })))?;
        if response.status != 200 {
            return Err(Error::UnexpectedStatus {
                context: format!("Failed to patch comment {}", url),
                status: response.status,
                body: response.body_text(),
            });
        }
        Ok(())
    }
}
