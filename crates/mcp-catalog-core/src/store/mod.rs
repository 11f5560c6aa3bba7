//! Storage abstraction for the catalog.
//!
//! The [`RepositoryStore`] trait is everything the ingestion pipeline and
//! the API need from persistence. Records are addressed by their unique
//! `full_name`; the numeric id is only a handle for curator operations.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::manifest::ManifestState;
use crate::metadata::Metadata;
use crate::models::RepositoryRecord;
use crate::tools::ToolCatalog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Stars,
    Name,
    Id,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Paginated listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Only records whose `categories` contain this tag.
    pub tag: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            tag: None,
            sort: SortKey::default(),
            order: SortOrder::default(),
            limit: 50,
            offset: 0,
        }
    }
}

/// Which text a free-text search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    /// Description and display name.
    Description,
    Readme,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](RepositoryStore::upsert) | Insert or fully update a record by `full_name` |
/// | [`update_icon`](RepositoryStore::update_icon) and friends | Partial single-field updates |
/// | [`list`](RepositoryStore::list) / [`count`](RepositoryStore::count) | Paginated browsing |
/// | [`search`](RepositoryStore::search) | Case-insensitive substring match |
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<RepositoryRecord>>;

    async fn get(&self, id: i64) -> Result<Option<RepositoryRecord>>;

    /// Insert `record` if its `full_name` is new, otherwise overwrite every
    /// derived field of the existing row. Returns the row id.
    async fn upsert(&self, record: &RepositoryRecord) -> Result<i64>;

    async fn update_icon(&self, id: i64, icon: &str) -> Result<()>;

    async fn update_metadata(&self, id: i64, metadata: &Metadata) -> Result<()>;

    /// Write both manifest columns.
    async fn update_manifest(&self, id: i64, manifest: &ManifestState) -> Result<()>;

    async fn update_tool_definitions(&self, id: i64, tools: &ToolCatalog) -> Result<()>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<RepositoryRecord>>;

    /// Total matching `list` ignoring pagination.
    async fn count(&self, tag: Option<&str>) -> Result<i64>;

    async fn search(
        &self,
        text: &str,
        field: SearchField,
        limit: i64,
    ) -> Result<Vec<RepositoryRecord>>;
}
