use thiserror::Error;

use mcp_catalog_core::manifest::ManifestError;
use mcp_catalog_core::oracle::OracleError;
use mcp_catalog_core::source::SearchError;

/// Why one candidate did not produce a stored record.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("README has none of the manifest keywords")]
    NoManifestKeywords,
    #[error("no launch manifest found")]
    NoManifest,
    #[error("invalid repository name '{0}', expected owner/repo[/dir]")]
    InvalidName(String),
    #[error("repository {0} not found")]
    NotFound(String),
    #[error("fetching {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: SearchError,
    },
    #[error("extraction failed: {0}")]
    Extraction(#[from] OracleError),
    #[error("tool backfill failed: {0}")]
    Backfill(#[from] BackfillError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Which step of the tool backfill went wrong.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("search '{query}': {source}")]
    Search {
        query: String,
        #[source]
        source: SearchError,
    },
    #[error("fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: SearchError,
    },
    #[error("{0}")]
    Extraction(#[from] OracleError),
}

impl IngestError {
    /// A normal outcome for a candidate that simply is not an MCP server.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            IngestError::NoManifestKeywords | IngestError::NoManifest
        )
    }

    /// Whether the caller supplied something bad, as opposed to a
    /// downstream failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidName(_) | IngestError::NotFound(_)
        ) || matches!(self, IngestError::Manifest(ManifestError::NoPendingProposal))
    }

    pub(crate) fn fetch(what: impl Into<String>, source: SearchError) -> Self {
        IngestError::Fetch {
            what: what.into(),
            source,
        }
    }
}
