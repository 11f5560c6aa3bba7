//! SQLite-backed [`RepositoryStore`] implementation.
//!
//! JSON columns are decoded into the typed model as soon as a row is read
//! and encoded right before it is written.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use mcp_catalog_core::manifest::ManifestState;
use mcp_catalog_core::metadata::Metadata;
use mcp_catalog_core::models::RepositoryRecord;
use mcp_catalog_core::store::{
    ListQuery, RepositoryStore, SearchField, SortKey, SortOrder,
};
use mcp_catalog_core::tools::ToolCatalog;

/// SQLite implementation of the [`RepositoryStore`] trait over the
/// `repositories` table.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn touch(&self, id: i64, column: &'static str, value: &str) -> Result<()> {
        let sql = format!(
            "UPDATE repositories SET {} = ?, updated_at = ? WHERE id = ?",
            column
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("repository {} not found", id);
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, full_name, path, display_name, description, url, stars, language, \
    icon, readme_content, manifest, proposed_manifest, tool_definitions, metadata, \
    created_at, updated_at";

/// `LIKE` pattern that matches `text` literally anywhere.
fn contains_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Pattern matching one whole tag inside `,<categories>,`.
fn tag_pattern(tag: &str) -> String {
    contains_pattern(&format!(",{},", tag.trim()))
}

const TAG_CLAUSE: &str = "(',' || COALESCE(json_extract(metadata, '$.categories'), '') || ',') \
    LIKE ? ESCAPE '\\'";

fn from_ts(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn row_to_record(row: &SqliteRow) -> Result<RepositoryRecord> {
    let full_name: String = row.get("full_name");
    let manifest: Option<String> = row.get("manifest");
    let proposed: Option<String> = row.get("proposed_manifest");
    let tools: Option<String> = row.get("tool_definitions");
    let metadata: Option<String> = row.get("metadata");

    Ok(RepositoryRecord {
        id: Some(row.get("id")),
        path: row.get("path"),
        display_name: row.get("display_name"),
        description: row.get("description"),
        url: row.get("url"),
        stars: row.get("stars"),
        language: row.get("language"),
        icon: row.get("icon"),
        readme_content: row.get("readme_content"),
        manifest: ManifestState::from_columns(manifest.as_deref(), proposed.as_deref())
            .with_context(|| format!("{}: bad manifest column", full_name))?,
        tool_definitions: ToolCatalog::from_stored(tools.as_deref())
            .with_context(|| format!("{}: bad tool_definitions column", full_name))?,
        metadata: Metadata::from_stored(metadata.as_deref())
            .with_context(|| format!("{}: bad metadata column", full_name))?,
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
        full_name,
    })
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<RepositoryRecord>> {
        let sql = format!("SELECT {} FROM repositories WHERE full_name = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn get(&self, id: i64) -> Result<Option<RepositoryRecord>> {
        let sql = format!("SELECT {} FROM repositories WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn upsert(&self, record: &RepositoryRecord) -> Result<i64> {
        if record.full_name.is_empty() {
            anyhow::bail!("cannot store a repository without a full name");
        }
        let now = Utc::now().timestamp();
        let (manifest, proposed) = record.manifest.to_columns();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO repositories (full_name, path, display_name, description, url, stars,
                                      language, icon, readme_content, manifest,
                                      proposed_manifest, tool_definitions, metadata,
                                      created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(full_name) DO UPDATE SET
                path = excluded.path,
                display_name = excluded.display_name,
                description = excluded.description,
                url = excluded.url,
                stars = excluded.stars,
                language = excluded.language,
                icon = excluded.icon,
                readme_content = excluded.readme_content,
                manifest = excluded.manifest,
                proposed_manifest = excluded.proposed_manifest,
                tool_definitions = excluded.tool_definitions,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&record.full_name)
        .bind(&record.path)
        .bind(&record.display_name)
        .bind(&record.description)
        .bind(&record.url)
        .bind(record.stars)
        .bind(&record.language)
        .bind(&record.icon)
        .bind(&record.readme_content)
        .bind(manifest)
        .bind(proposed)
        .bind(record.tool_definitions.to_stored())
        .bind(record.metadata.to_stored())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_icon(&self, id: i64, icon: &str) -> Result<()> {
        self.touch(id, "icon", icon).await
    }

    async fn update_metadata(&self, id: i64, metadata: &Metadata) -> Result<()> {
        self.touch(id, "metadata", &metadata.to_stored()).await
    }

    async fn update_manifest(&self, id: i64, manifest: &ManifestState) -> Result<()> {
        let (accepted, proposed) = manifest.to_columns();
        let result = sqlx::query(
            "UPDATE repositories SET manifest = ?, proposed_manifest = ?, updated_at = ? WHERE id = ?",
        )
        .bind(accepted)
        .bind(proposed)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("repository {} not found", id);
        }
        Ok(())
    }

    async fn update_tool_definitions(&self, id: i64, tools: &ToolCatalog) -> Result<()> {
        self.touch(id, "tool_definitions", &tools.to_stored()).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<RepositoryRecord>> {
        let sort = match query.sort {
            SortKey::Stars => "stars",
            SortKey::Name => "display_name COLLATE NOCASE",
            SortKey::Id => "id",
        };
        let order = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let filter = if query.tag.is_some() {
            format!("WHERE {}", TAG_CLAUSE)
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT {} FROM repositories {} ORDER BY {} {}, id {} LIMIT ? OFFSET ?",
            COLUMNS, filter, sort, order, order
        );

        let mut q = sqlx::query(&sql);
        if let Some(tag) = &query.tag {
            q = q.bind(tag_pattern(tag));
        }
        let rows = q
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self, tag: Option<&str>) -> Result<i64> {
        let count = match tag {
            Some(tag) => {
                let sql = format!("SELECT COUNT(*) FROM repositories WHERE {}", TAG_CLAUSE);
                sqlx::query_scalar(&sql)
                    .bind(tag_pattern(tag))
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn search(
        &self,
        text: &str,
        field: SearchField,
        limit: i64,
    ) -> Result<Vec<RepositoryRecord>> {
        let pattern = contains_pattern(text);
        let rows = match field {
            SearchField::Description => {
                let sql = format!(
                    "SELECT {} FROM repositories \
                     WHERE description LIKE ?1 ESCAPE '\\' OR display_name LIKE ?1 ESCAPE '\\' \
                     ORDER BY stars DESC LIMIT ?2",
                    COLUMNS
                );
                sqlx::query(&sql)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            SearchField::Readme => {
                let sql = format!(
                    "SELECT {} FROM repositories WHERE readme_content LIKE ?1 ESCAPE '\\' \
                     ORDER BY stars DESC LIMIT ?2",
                    COLUMNS
                );
                sqlx::query(&sql)
                    .bind(&pattern)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_record).collect()
    }
}
