//! GitHub REST API access.
//!
//! Every call goes through the [`Transport`] trait so the import state
//! machine can be driven by scripted responses in tests. [`UreqTransport`]
//! is the blocking production implementation:
//! - non-2xx statuses are returned as ordinary [`ApiResponse`]s, callers decide
//!   which ones are fatal
//! - only network and I/O failures become [`Error::Transport`]
//!
//! - `importer`: the milestone, label and issue import state machine

pub mod importer;

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// GitHub API base URL
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// User-Agent header required by GitHub API
const USER_AGENT: &str = "jira2gh-cli";

/// Media type that enables the issue import API
const IMPORT_ACCEPT: &str = "application/vnd.github.golden-comet-preview+json";

/// Per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// A single API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }

    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Patch,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Status, parsed body and pagination link of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; non-JSON text is kept as a string, an empty body is `null`
    pub body: Value,
    /// Target of the `rel="next"` link, if any
    pub next_page: Option<String>,
}

impl ApiResponse {
    /// Body rendered for error messages.
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// String field of a JSON object body.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }
}

/// Sends API requests.
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Blocks the current thread between polls and pages.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeps via `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Blocking transport authenticated with a personal access token.
pub struct UreqTransport {
    agent: ureq::Agent,
    token: String,
}

impl UreqTransport {
    pub fn new(token: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(DEFAULT_TIMEOUT).build(),
            token: token.to_string(),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "GitHub request");

        let call = self
            .agent
            .request(request.method.as_str(), &request.url)
            .set("Authorization", &format!("token {}", self.token))
            .set("Accept", IMPORT_ACCEPT)
            .set("User-Agent", USER_AGENT);

        let response = match &request.body {
            Some(body) => call.send_json(body.clone()),
            None => call.call(),
        };

        match response {
            Ok(resp) => into_api_response(resp),
            Err(ureq::Error::Status(_, resp)) => into_api_response(resp),
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}

fn into_api_response(resp: ureq::Response) -> Result<ApiResponse> {
    let status = resp.status();
    let next_page = resp.header("Link").and_then(parse_next_link);
    let text = resp
        .into_string()
        .map_err(|e| Error::Transport(e.to_string()))?;

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    Ok(ApiResponse {
        status,
        body,
        next_page,
    })
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// URL builder for one target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    pub account: String,
    pub repo: String,
    api_base: String,
}

impl GithubRepo {
    pub fn new(account: &str, repo: &str) -> Self {
        Self::with_api_base(GITHUB_API_BASE, account, repo)
    }

    pub fn with_api_base(api_base: &str, account: &str, repo: &str) -> Self {
        Self {
            account: account.to_string(),
            repo: repo.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// `{api}/repos/{account}/{repo}{path}`
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.account, self.repo, path
        )
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

/// Response from GitHub GET /user endpoint (only fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    /// GitHub login/username
    pub login: String,
    /// User ID
    pub id: u64,
    /// Display name (optional)
    pub name: Option<String>,
}

/// Validate the token behind `transport` via the GET /user endpoint.
///
/// Run before any mutating call so a bad token fails fast.
pub fn validate_github_user(transport: &dyn Transport, api_base: &str) -> Result<GitHubUser> {
    let url = format!("{}/user", api_base.trim_end_matches('/'));
    let response = transport.send(&ApiRequest::get(url))?;

    match response.status {
        200 => Ok(serde_json::from_value(response.body)?),
        401 => Err(Error::Unauthorized),
        403 => Err(Error::Forbidden),
        status => Err(Error::UnexpectedStatus {
            context: "Failed to validate GitHub token".to_string(),
            status,
            body: response.body_text(),
        }),
    }
}
