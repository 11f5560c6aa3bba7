//! GitHub REST implementation of [`SourceSearch`].
//!
//! Uses the code-search endpoint for discovery and backfill, the contents
//! endpoint for README and source text, and the repository endpoint for
//! stars, language and the owner's avatar.
//!
//! Throttling (HTTP 403/429 with an exhausted quota or a `Retry-After`
//! header) is reported as [`SearchError::RateLimited`] carrying the reset
//! time from `X-RateLimit-Reset`; waiting is left to [`crate::retry`].

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use mcp_catalog_core::source::{
    CodeHit, CodeSearchPage, RepositoryInfo, SearchError, SourceSearch,
};

use crate::config::GithubConfig;

const PER_PAGE: u32 = 100;

pub struct GithubClient {
    http: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_url = Url::parse(&config.api_url)?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("github.api_url is not a base URL: {}", config.api_url);
        }
        Ok(Self {
            http,
            api_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Build the client, taking the token from `GITHUB_TOKEN` when set.
    pub fn from_env(config: &GithubConfig) -> anyhow::Result<Self> {
        Self::new(config, std::env::var("GITHUB_TOKEN").ok())
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, SearchError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Decode("api url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, SearchError> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("mcp-catalog/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if let Some(reset_at) = rate_limit_reset(status, response.headers(), Utc::now()) {
        return Err(SearchError::RateLimited { reset_at });
    }
    if status == StatusCode::NOT_FOUND {
        return Err(SearchError::NotFound);
    }
    let message = response.text().await.unwrap_or_default();
    Err(SearchError::Http {
        status: status.as_u16(),
        message,
    })
}

/// `Some(reset)` when the response is a throttling response.
fn rate_limit_reset(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<Option<DateTime<Utc>>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let retry_after = header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|secs| now + chrono::Duration::seconds(secs));
    let exhausted = header("x-ratelimit-remaining").map(str::trim) == Some("0");
    let reset = header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));

    if retry_after.is_some() {
        Some(retry_after)
    } else if exhausted || status == StatusCode::TOO_MANY_REQUESTS {
        Some(reset)
    } else {
        None
    }
}

/// Page number of the `rel="next"` entry in a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<u32> {
    static NEXT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NEXT
        .get_or_init(|| Regex::new(r#"[?&]page=(\d+)[^>]*>;\s*rel="next""#).ok())
        .as_ref()?;
    let link = headers.get("link")?.to_str().ok()?;
    link.split(',')
        .find_map(|part| re.captures(part.trim()))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
    repository: SearchRepo,
}

#[derive(Deserialize)]
struct SearchRepo {
    name: String,
    owner: Owner,
}

#[derive(Deserialize)]
struct Owner {
    login: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct RepoResponse {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    language: Option<String>,
    html_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    owner: Owner,
}

fn decode_content(body: ContentResponse) -> Result<String, SearchError> {
    let content = body
        .content
        .ok_or_else(|| SearchError::Decode("contents response has no content".to_string()))?;
    match body.encoding.as_deref() {
        Some("base64") | None => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| SearchError::Decode(format!("invalid base64 content: {}", e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Some(other) => Err(SearchError::Decode(format!(
            "unsupported content encoding: {}",
            other
        ))),
    }
}

#[async_trait]
impl SourceSearch for GithubClient {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage, SearchError> {
        let mut url = self.endpoint(["search", "code"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("per_page", &PER_PAGE.to_string())
            .append_pair("page", &page.to_string());
        debug!(query, page, "code search");

        let response = self.get(url).await?;
        let next_page = next_page(response.headers());
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        let hits = body
            .items
            .into_iter()
            .map(|item| CodeHit {
                owner: item.repository.owner.login,
                repo: item.repository.name,
                path: item.path,
            })
            .collect();
        Ok(CodeSearchPage { hits, next_page })
    }

    async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<String, SearchError> {
        let segments = ["repos", owner, repo, "contents"]
            .into_iter()
            .chain(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(segments)?;
        let body: ContentResponse = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        decode_content(body)
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<RepositoryInfo, SearchError> {
        let url = self.endpoint(["repos", owner, repo])?;
        let body: RepoResponse = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(RepositoryInfo {
            full_name: body.full_name,
            description: body.description.unwrap_or_default(),
            stars: body.stargazers_count,
            language: body.language.unwrap_or_default(),
            html_url: body.html_url,
            default_branch: body.default_branch.unwrap_or_else(|| "main".to_string()),
            owner_avatar_url: body.owner.avatar_url.unwrap_or_default(),
        })
    }
}
