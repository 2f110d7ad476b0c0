//! GitHub REST v3 client.
//!
//! ureq is blocking, so each request runs on tokio's blocking pool. Pacing
//! sleeps happen on the async side, before the commit listing and before each
//! compare call. The pacing is per invocation, not a global rate limiter.

use std::time::Duration;

use daybook_core::config::GithubConfig;
use daybook_core::{BranchRef, CommitRecord, Config, ReportDate};
use tracing::{debug, error, warn};

use crate::filter::CommitFilter;
use crate::{merged_from_status, wire, SourceClient, SourceError};

const ACCEPT: &str = "application/vnd.github.v3+json";

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 403, treated as rate limiting.
    RateLimited,
    /// 404, e.g. a branch deleted mid-run.
    NotFound,
    Other,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        403 => StatusClass::RateLimited,
        404 => StatusClass::NotFound,
        _ => StatusClass::Other,
    }
}

/// A page holding exactly `per_page` items may have more behind it. Only the
/// first page is ever read.
pub fn is_full_page(count: usize, per_page: u32) -> bool {
    count >= per_page as usize
}

#[derive(Debug, Clone)]
struct ApiRequest {
    url: String,
    query: Vec<(String, String)>,
}

#[derive(Debug)]
struct ApiResponse {
    status: u16,
    body: String,
    rate_limit_reset: Option<String>,
}

#[derive(Clone)]
pub struct GitHubClient {
    agent: ureq::Agent,
    api_base: String,
    user: String,
    token: Option<String>,
    user_agent: String,
    per_page: u32,
    pacing: Duration,
}

impl GitHubClient {
    pub fn new(cfg: &GithubConfig, user: impl Into<String>, token: Option<String>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(cfg.timeout()))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            user: user.into(),
            token,
            user_agent: cfg.user_agent.clone(),
            per_page: cfg.per_page.max(1),
            pacing: cfg.pacing(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.github,
            config.registry.user.clone(),
            config.secrets.github_token.clone(),
        )
    }

    fn branches_request(&self, repo: &str) -> ApiRequest {
        ApiRequest {
            url: format!("{}/repos/{repo}/branches", self.api_base),
            query: vec![("per_page".into(), self.per_page.to_string())],
        }
    }

    fn compare_request(&self, repo: &str, base: &str, branch: &str) -> ApiRequest {
        ApiRequest {
            url: format!("{}/repos/{repo}/compare/{base}...{branch}", self.api_base),
            query: Vec::new(),
        }
    }

    fn commits_request(&self, repo: &str, branch: &str) -> ApiRequest {
        ApiRequest {
            url: format!("{}/repos/{repo}/commits", self.api_base),
            query: vec![
                ("sha".into(), branch.to_string()),
                ("per_page".into(), self.per_page.to_string()),
            ],
        }
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SourceError> {
        let agent = self.agent.clone();
        let user_agent = self.user_agent.clone();
        let token = self.token.clone();
        tokio::task::spawn_blocking(move || {
            execute_blocking(&agent, &request, &user_agent, token.as_deref())
        })
        .await
        .map_err(|e| SourceError::Join(e.to_string()))?
    }

    async fn compare_status(
        &self,
        repo: &str,
        base: &str,
        branch: &str,
    ) -> Result<Option<String>, SourceError> {
        let request = self.compare_request(repo, base, branch);
        let url = request.url.clone();
        let response = self.execute(request).await?;
        if classify_status(response.status) != StatusClass::Success {
            debug!(repo, base, branch, status = response.status, "compare returned no answer");
            return Ok(None);
        }
        let compare: wire::Compare = decode(&url, &response.body)?;
        Ok(Some(compare.status))
    }
}

fn execute_blocking(
    agent: &ureq::Agent,
    request: &ApiRequest,
    user_agent: &str,
    token: Option<&str>,
) -> Result<ApiResponse, SourceError> {
    let mut builder = agent
        .get(&request.url)
        .header("User-Agent", user_agent)
        .header("Accept", ACCEPT);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    let mut response = builder.call()?;
    let status = response.status().as_u16();
    let rate_limit_reset = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response.body_mut().read_to_string()?;
    Ok(ApiResponse {
        status,
        body,
        rate_limit_reset,
    })
}

fn decode<T: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|source| SourceError::Decode {
        url: url.to_string(),
        source,
    })
}

#[async_trait::async_trait]
impl SourceClient for GitHubClient {
    async fn list_branches(&self, repo: &str) -> Result<Vec<BranchRef>, SourceError> {
        let request = self.branches_request(repo);
        let url = request.url.clone();
        let response = self.execute(request).await?;
        if classify_status(response.status) != StatusClass::Success {
            error!(repo, status = response.status, "failed to list branches");
            return Ok(Vec::new());
        }
        let page: Vec<wire::Branch> = decode(&url, &response.body)?;
        if is_full_page(page.len(), self.per_page) {
            warn!(repo, per_page = self.per_page, "branch listing hit the page size, later pages are not read");
        }
        Ok(page
            .into_iter()
            .map(|b| BranchRef {
                name: b.name,
                head_sha: b.commit.map(|c| c.sha).unwrap_or_default(),
            })
            .collect())
    }

    async fn is_merged(&self, repo: &str, branch: &str, bases: &[String]) -> bool {
        for base in bases {
            tokio::time::sleep(self.pacing).await;
            match self.compare_status(repo, base, branch).await {
                Ok(Some(status)) if merged_from_status(&status) => return true,
                Ok(_) => {}
                Err(e) => warn!(repo, base, branch, error = %e, "compare failed, treating as not merged"),
            }
        }
        false
    }

    async fn list_commits(
        &self,
        repo: &str,
        branch: &str,
        date: ReportDate,
    ) -> Result<Vec<CommitRecord>, SourceError> {
        tokio::time::sleep(self.pacing).await;
        let request = self.commits_request(repo, branch);
        let url = request.url.clone();
        let response = self.execute(request).await?;
        match classify_status(response.status) {
            StatusClass::Success => {}
            StatusClass::RateLimited => {
                error!(
                    repo,
                    branch,
                    reset = response.rate_limit_reset.as_deref().unwrap_or("unknown"),
                    "rate limit exceeded"
                );
                return Ok(Vec::new());
            }
            StatusClass::NotFound => {
                debug!(repo, branch, "branch not found");
                return Ok(Vec::new());
            }
            StatusClass::Other => {
                error!(repo, branch, status = response.status, "error fetching commits");
                return Ok(Vec::new());
            }
        }
        let page: Vec<wire::Commit> = decode(&url, &response.body)?;
        if is_full_page(page.len(), self.per_page) {
            warn!(repo, branch, per_page = self.per_page, "commit listing hit the page size, older commits are not read");
        }
        Ok(CommitFilter::new(date, self.user.as_str()).apply(repo, branch, page))
    }
}
