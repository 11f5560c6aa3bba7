//! Port for the code-hosting search and content API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures from a [`SourceSearch`] call.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The provider throttled the call. `reset_at` is when the quota
    /// refills, if the provider said so.
    #[error("rate limited (resets at {reset_at:?})")]
    RateLimited { reset_at: Option<DateTime<Utc>> },
    #[error("not found")]
    NotFound,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("still rate limited after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// One file matched by a code search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHit {
    pub owner: String,
    pub repo: String,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct CodeSearchPage {
    pub hits: Vec<CodeHit>,
    /// Page number to request next; `None` on the last page.
    pub next_page: Option<u32>,
}

/// Repository details needed to build a catalog record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// `owner/repo`.
    pub full_name: String,
    pub description: String,
    pub stars: i64,
    pub language: String,
    pub html_url: String,
    pub default_branch: String,
    pub owner_avatar_url: String,
}

/// Paginated code search plus raw content fetch.
///
/// Implementations report throttling as [`SearchError::RateLimited`] and
/// leave waiting to the caller.
#[async_trait]
pub trait SourceSearch: Send + Sync {
    /// Run one page (1-based) of a code search.
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage, SearchError>;

    /// Raw text of a file on the default branch.
    async fn get_contents(&self, owner: &str, repo: &str, path: &str)
        -> Result<String, SearchError>;

    async fn get_repository(&self, owner: &str, repo: &str)
        -> Result<RepositoryInfo, SearchError>;
}
