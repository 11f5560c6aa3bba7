//! The catalogued repository record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manifest::ManifestState;
use crate::metadata::Metadata;
use crate::tools::ToolCatalog;

/// One catalogued MCP server, keyed by `full_name`.
///
/// `full_name` is `owner/repo` with any subdirectory of the README appended,
/// so several servers living in one physical repository stay distinct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryRecord {
    /// Row id; `None` until the record has been persisted once.
    pub id: Option<i64>,
    pub full_name: String,
    /// README location inside the repository.
    pub path: String,
    pub display_name: String,
    pub description: String,
    pub url: String,
    pub stars: i64,
    pub language: String,
    pub icon: String,
    /// README text at the last fetch. Used to detect content changes.
    pub readme_content: String,
    pub manifest: ManifestState,
    pub tool_definitions: ToolCatalog,
    pub metadata: Metadata,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RepositoryRecord {
    pub fn new_for(full_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Serializable view of a record, as returned by the CLI and HTTP API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryView {
    pub id: Option<i64>,
    pub full_name: String,
    pub path: String,
    pub display_name: String,
    pub description: String,
    pub url: String,
    pub stars: i64,
    pub language: String,
    pub icon: String,
    pub manifest: serde_json::Value,
    pub proposed_manifest: serde_json::Value,
    pub tool_definitions: serde_json::Value,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme_content: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RepositoryView {
    pub fn from_record(record: &RepositoryRecord, include_readme: bool) -> Self {
        let to_value = |text: &str| {
            serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({}))
        };
        let accepted = record
            .manifest
            .accepted()
            .map(|m| m.to_json())
            .unwrap_or_else(|| "[]".to_string());
        let proposed = record
            .manifest
            .proposed()
            .map(|m| m.to_json())
            .unwrap_or_else(|| "{}".to_string());
        Self {
            id: record.id,
            full_name: record.full_name.clone(),
            path: record.path.clone(),
            display_name: record.display_name.clone(),
            description: record.description.clone(),
            url: record.url.clone(),
            stars: record.stars,
            language: record.language.clone(),
            icon: record.icon.clone(),
            manifest: to_value(&accepted),
            proposed_manifest: to_value(&proposed),
            tool_definitions: to_value(&record.tool_definitions.to_stored()),
            metadata: to_value(&record.metadata.to_stored()),
            readme_content: include_readme.then(|| record.readme_content.clone()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
