//! Download Jira XML search results page by page.
//!
//! Jira's XML search view caps the number of items per request, so a JQL
//! query is first counted with a one-item request, then fetched in fixed-size pages.
//! Each page is written verbatim to `result-<start>.xml` in the output
//! directory, ready to be passed back to `j2g` as an input directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use super::xml::{parse_document, parse_items};
use crate::{Error, Result};

/// Items requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Path of the XML search view relative to the Jira base URL.
const SEARCH_PATH: &str = "/sr/jira.issueviews:searchrequest-xml/temp/SearchRequest.xml";

/// One page request against the XML search view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub jql: String,
    pub max_results: u64,
    pub start: u64,
}

/// Source of raw XML search pages.
pub trait SearchSource {
    /// Fetch one page of XML for the given request.
    fn search(&self, request: &SearchRequest) -> Result<String>;
}

/// Search source backed by a blocking HTTP GET against a Jira server.
pub struct UreqSearchSource {
    base_url: String,
    timeout: Duration,
}

impl UreqSearchSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl SearchSource for UreqSearchSource {
    fn search(&self, request: &SearchRequest) -> Result<String> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        tracing::debug!(%url, start = request.start, "Fetching Jira search page");

        let response = ureq::get(&url)
            .timeout(self.timeout)
            .query("jqlQuery", &request.jql)
            .query("tempMax", &request.max_results.to_string())
            .query("pager/start", &request.start.to_string())
            .call();

        match response {
            Ok(resp) => resp.into_string().map_err(Error::from),
            Err(ureq::Error::Status(code, resp)) => Err(Error::UnexpectedStatus {
                context: format!("Failed to fetch Jira search results from {}", url),
                status: code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}

/// Outcome of a fetch run.
#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub total: u64,
    pub pages: Vec<PathBuf>,
    /// Keys of issues that carry a security level
    pub secured: Vec<String>,
}

/// Read the `total` attribute of `channel/issue` from a search page.
pub fn parse_total(xml: &str) -> Result<u64> {
    let doc = parse_document(xml)?;
    let total = doc
        .descendants()
        .find(|n| n.has_tag_name("issue") && n.parent().is_some_and(|p| p.has_tag_name("channel")))
        .and_then(|n| n.attribute("total"))
        .ok_or_else(|| Error::Xml("search result has no <issue total=...> element".to_string()))?;

    total
        .parse()
        .map_err(|_| Error::Xml(format!("invalid issue total '{}'", total)))
}

/// Fetch every page of a JQL query into `out_dir`.
pub fn fetch_all(
    source: &dyn SearchSource,
    jql: &str,
    page_size: u64,
    out_dir: &Path,
) -> Result<FetchSummary> {
    if page_size == 0 {
        return Err(Error::InvalidInput("page size must be positive".to_string()));
    }

    let count_page = source.search(&SearchRequest {
        jql: jql.to_string(),
        max_results: 1,
        start: 0,
    })?;
    let total = parse_total(&count_page)?;
    let page_count = total.div_ceil(page_size);
    tracing::info!(total, pages = page_count, "Jira query matched issues");

    fs::create_dir_all(out_dir)?;

    let mut summary = FetchSummary {
        total,
        pages: Vec::new(),
        secured: Vec::new(),
    };

    let mut start = 0;
    while start < total {
        tracing::info!(
            "Fetching page {}, out of {}",
            start / page_size + 1,
            page_count
        );
        let page = source.search(&SearchRequest {
            jql: jql.to_string(),
            max_results: page_size,
            start,
        })?;

        for item in parse_items(&page)? {
            if let Some(level) = item.security.as_deref() {
                tracing::info!("Issue {} has a security level: {}", item.key, level);
                summary.secured.push(item.key);
            }
        }

        let path = out_dir.join(format!("result-{}.xml", start));
        fs::write(&path, page)?;
        summary.pages.push(path);
        start += page_size;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct ScriptedSource {
        total: u64,
        requests: RefCell<Vec<SearchRequest>>,
    }

    impl SearchSource for ScriptedSource {
        fn search(&self, request: &SearchRequest) -> Result<String> {
            self.requests.borrow_mut().push(request.clone());
            let security = if request.start == 2 {
                "<security>Internal</security>"
            } else {
                ""
            };
            Ok(format!(
                r#"<rss><channel><issue start="{}" end="{}" total="{}"/><item><key>PROJ-{}</key>{}</item></channel></rss>"#,
                request.start,
                request.start + request.max_results,
                self.total,
                request.start + 1,
                security
            ))
        }
    }

    #[test]
    fn test_parse_total() {
        let xml = r#"<rss><channel><issue start="0" end="1" total="2345"/></channel></rss>"#;
        assert_eq!(parse_total(xml).unwrap(), 2345);
    }

    #[test]
    fn test_parse_total_missing() {
        let xml = r#"<rss><channel></channel></rss>"#;
        assert!(matches!(parse_total(xml), Err(Error::Xml(_))));
    }

    #[test]
    fn test_fetch_all_pages() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            total: 5,
            requests: RefCell::new(Vec::new()),
        };

        let summary = fetch_all(&source, "project = PROJ", 2, dir.path()).unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.pages.len(), 3);
        assert!(dir.path().join("result-0.xml").exists());
        assert!(dir.path().join("result-2.xml").exists());
        assert!(dir.path().join("result-4.xml").exists());
        assert_eq!(summary.secured, vec!["PROJ-3"]);

        let starts: Vec<u64> = source.requests.borrow().iter().map(|r| r.start).collect();
        // count request first, then one per page
        assert_eq!(starts, vec![0, 0, 2, 4]);
        assert_eq!(source.requests.borrow()[0].max_results, 1);
    }

    #[test]
    fn test_fetch_all_empty_result() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            total: 0,
            requests: RefCell::new(Vec::new()),
        };

        let summary = fetch_all(&source, "project = NONE", 1000, dir.path()).unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.pages.is_empty());
        assert_eq!(source.requests.borrow().len(), 1);
    }

    #[test]
    fn test_fetch_all_rejects_zero_page_size() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            total: 1,
            requests: RefCell::new(Vec::new()),
        };
        assert!(fetch_all(&source, "x", 0, dir.path()).is_err());
    }
}
