//! Turn structured issue links into comments.
//!
//! GitHub's import API has no notion of issue links, so each relationship is
//! rendered as a trailing comment with a title-search link. Foreign keys go
//! through an [`IdRewriter`] first; the default [`PlaceholderRewriter`] wraps
//! same-project keys in `@PSTART`/`@PEND` tokens that the relink pass later
//! resolves to real GitHub issue numbers.

use regex::Regex;

use crate::models::{Comment, Issue, RelationKind};
use crate::{Error, Result};

/// Opening marker of a cross-issue reference placeholder.
pub const PLACEHOLDER_PREFIX: &str = "@PSTART";
/// Closing marker of a cross-issue reference placeholder.
pub const PLACEHOLDER_SUFFIX: &str = "@PEND";

/// Format a placeholder token for a Jira key.
pub fn placeholder(key: &str) -> String {
    format!("{}{}{}", PLACEHOLDER_PREFIX, key, PLACEHOLDER_SUFFIX)
}

/// Hook applied to every foreign key and comment body before submission.
pub trait IdRewriter {
    fn rewrite(&self, text: &str) -> String;
}

/// Leaves text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRewriter;

impl IdRewriter for IdentityRewriter {
    fn rewrite(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Replaces same-project Jira references with placeholder tokens.
#[derive(Debug, Clone)]
pub struct PlaceholderRewriter {
    browse_url: Option<Regex>,
    key: Regex,
}

impl PlaceholderRewriter {
    pub fn new(project: &str, jira_base_url: &str) -> Result<Self> {
        let project = regex::escape(project);
        let key = compile(&format!(r"\b{}-\d+\b", project))?;

        let base = jira_base_url.trim_end_matches('/');
        let browse_url = if base.is_empty() {
            None
        } else {
            Some(compile(&format!(
                r"{}/browse/({}-\d+)\b",
                regex::escape(base),
                project
            ))?)
        };

        Ok(Self { browse_url, key })
    }
}

impl IdRewriter for PlaceholderRewriter {
    fn rewrite(&self, text: &str) -> String {
        let replacement = format!("{}${{1}}{}", PLACEHOLDER_PREFIX, PLACEHOLDER_SUFFIX);
        let text = match &self.browse_url {
            Some(re) => re.replace_all(text, replacement.as_str()).into_owned(),
            None => text.to_string(),
        };
        // tokens are glued to the key, so \b never matches inside one again
        self.key
            .replace_all(&text, |caps: &regex::Captures<'_>| placeholder(&caps[0]))
            .into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidInput(format!("invalid pattern: {}", e)))
}

/// Renders an issue's relationships as comments.
pub struct RelationshipRewriter<'a> {
    account: &'a str,
    repo: &'a str,
    rewriter: &'a dyn IdRewriter,
}

impl<'a> RelationshipRewriter<'a> {
    pub fn new(account: &'a str, repo: &'a str, rewriter: &'a dyn IdRewriter) -> Self {
        Self {
            account,
            repo,
            rewriter,
        }
    }

    fn search_base(&self) -> String {
        format!(
            "https://github.com/{}/{}/issues?q=in%3Atitle%20",
            self.account, self.repo
        )
    }

    /// Append one comment per relationship and strip the structured fields.
    ///
    /// Returns the number of comments appended. Calling it again on the same
    /// issue appends nothing.
    pub fn convert(&self, issue: &mut Issue) -> usize {
        let Some(relationships) = issue.take_relationships() else {
            return 0;
        };

        let base = self.search_base();
        let before = issue.comments.len();

        for kind in RelationKind::ALL {
            for key in relationships.list(kind) {
                let reference = self.rewriter.rewrite(key);
                let body = format!(
                    r#"<i>[{}: <a href="{}{}">{}</a>]</i>"#,
                    caption(kind),
                    base,
                    reference,
                    reference
                );
                issue.comments.push(Comment::new(None, body));
            }
        }

        if let Some(epic) = relationships.epic_link.as_deref() {
            let reference = self.rewriter.rewrite(epic);
            let body = format!(
                r#"<i>[Epic: <a href="{}{}%20label%3Aepic">{}</a>]</i>"#,
                base, reference, reference
            );
            issue.comments.push(Comment::new(None, body));
        }

        issue.comments.len() - before
    }
}

fn caption(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Duplicates => "Duplicates",
        RelationKind::IsDuplicatedBy => "Originally duplicated by",
        RelationKind::IsRelatedTo => "Originally related to",
        RelationKind::DependsOn => "Originally depends on",
        RelationKind::Blocks => "Originally blocks",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_with(f: impl FnOnce(&mut crate::models::Relationships)) -> Issue {
        let mut issue = Issue::new("A-9", "[A-9] Title");
        if let Some(rels) = issue.relationships_mut() {
            f(rels);
        }
        issue
    }

    // ==================== RelationshipRewriter Tests ====================

    #[test]
    fn test_duplicates_become_trailing_comments() {
        let mut issue = issue_with(|r| {
            r.duplicates = vec!["A-1".to_string(), "A-2".to_string()];
        });
        issue.comments.push(Comment::new(None, "existing"));

        let rewriter = RelationshipRewriter::new("acme", "widgets", &IdentityRewriter);
        assert_eq!(rewriter.convert(&mut issue), 2);

        assert!(issue.relationships().is_none());
        assert_eq!(issue.comments.len(), 3);
        assert_eq!(
            issue.comments[1].body,
            r#"<i>[Duplicates: <a href="https://github.com/acme/widgets/issues?q=in%3Atitle%20A-1">A-1</a>]</i>"#
        );
        assert!(issue.comments[2].body.contains(">A-2</a>"));
        assert!(issue.comments[1].created_at.is_none());
    }

    #[test]
    fn test_fixed_order_with_epic_last() {
        let mut issue = issue_with(|r| {
            r.epic_link = Some("A-100".to_string());
            r.blocks = vec!["A-5".to_string()];
            r.depends_on = vec!["A-4".to_string()];
            r.is_related_to = vec!["A-3".to_string()];
            r.is_duplicated_by = vec!["A-2".to_string()];
            r.duplicates = vec!["A-1".to_string()];
        });

        let rewriter = RelationshipRewriter::new("acme", "widgets", &IdentityRewriter);
        rewriter.convert(&mut issue);

        let captions: Vec<&str> = issue
            .comments
            .iter()
            .map(|c| c.body.split(':').next().unwrap_or_default())
            .collect();
        assert_eq!(
            captions,
            vec![
                "<i>[Duplicates",
                "<i>[Originally duplicated by",
                "<i>[Originally related to",
                "<i>[Originally depends on",
                "<i>[Originally blocks",
                "<i>[Epic",
            ]
        );
        assert_eq!(
            issue.comments[5].body,
            r#"<i>[Epic: <a href="https://github.com/acme/widgets/issues?q=in%3Atitle%20A-100%20label%3Aepic">A-100</a>]</i>"#
        );
    }

    #[test]
    fn test_convert_twice_is_noop() {
        let mut issue = issue_with(|r| r.blocks = vec!["A-1".to_string()]);
        let rewriter = RelationshipRewriter::new("acme", "widgets", &IdentityRewriter);

        assert_eq!(rewriter.convert(&mut issue), 1);
        assert_eq!(rewriter.convert(&mut issue), 0);
        assert_eq!(issue.comments.len(), 1);
    }

    #[test]
    fn test_rewriter_applied_to_keys() {
        let mut issue = issue_with(|r| r.duplicates = vec!["A-1".to_string()]);
        let placeholders = PlaceholderRewriter::new("A", "https://jira.example.com").unwrap();
        let rewriter = RelationshipRewriter::new("acme", "widgets", &placeholders);
        rewriter.convert(&mut issue);

        assert_eq!(
            issue.comments[0].body,
            r#"<i>[Duplicates: <a href="https://github.com/acme/widgets/issues?q=in%3Atitle%20@PSTARTA-1@PEND">@PSTARTA-1@PEND</a>]</i>"#
        );
    }

    // ==================== PlaceholderRewriter Tests ====================

    #[test]
    fn test_placeholder_bare_keys() {
        let rewriter = PlaceholderRewriter::new("PROJ", "https://jira.example.com").unwrap();
        assert_eq!(
            rewriter.rewrite("See PROJ-12 and PROJ-3, not SUBPROJ-4 or OTHER-5"),
            "See @PSTARTPROJ-12@PEND and @PSTARTPROJ-3@PEND, not SUBPROJ-4 or OTHER-5"
        );
    }

    #[test]
    fn test_placeholder_browse_urls() {
        let rewriter = PlaceholderRewriter::new("PROJ", "https://jira.example.com/").unwrap();
        assert_eq!(
            rewriter.rewrite(r#"<a href="https://jira.example.com/browse/PROJ-7">PROJ-7</a>"#),
            r#"<a href="@PSTARTPROJ-7@PEND">@PSTARTPROJ-7@PEND</a>"#
        );
    }

    #[test]
    fn test_placeholder_is_idempotent() {
        let rewriter = PlaceholderRewriter::new("PROJ", "https://jira.example.com").unwrap();
        let once = rewriter.rewrite("PROJ-1 https://jira.example.com/browse/PROJ-2");
        assert_eq!(rewriter.rewrite(&once), once);
    }

    #[test]
    fn test_identity_rewriter() {
        assert_eq!(IdentityRewriter.rewrite("PROJ-1"), "PROJ-1");
    }
}
