//! In-memory [`RepositoryStore`] implementation for tests.
//!
//! Records live in a `BTreeMap` keyed by id behind `std::sync::RwLock`.
//! Sorting and tag filtering mirror the SQLite backend.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::manifest::ManifestState;
use crate::metadata::Metadata;
use crate::models::RepositoryRecord;
use crate::tools::ToolCatalog;

use super::{ListQuery, RepositoryStore, SearchField, SortKey, SortOrder};

#[derive(Default)]
struct Rows {
    next_id: i64,
    by_id: BTreeMap<i64, RepositoryRecord>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<Rows>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Rows>> {
        self.rows.read().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows>> {
        self.rows.write().map_err(|_| anyhow!("store lock poisoned"))
    }

    fn update<F>(&self, id: i64, f: F) -> Result<()>
    where
        F: FnOnce(&mut RepositoryRecord),
    {
        let mut rows = self.write()?;
        let record = rows
            .by_id
            .get_mut(&id)
            .ok_or_else(|| anyhow!("repository {} not found", id))?;
        f(record);
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    fn filtered(&self, tag: Option<&str>) -> Result<Vec<RepositoryRecord>> {
        let rows = self.read()?;
        Ok(rows
            .by_id
            .values()
            .filter(|r| tag.map_or(true, |t| r.metadata.has_tag(t)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RepositoryStore for InMemoryStore {
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<RepositoryRecord>> {
        let rows = self.read()?;
        Ok(rows
            .by_id
            .values()
            .find(|r| r.full_name == full_name)
            .cloned())
    }

    async fn get(&self, id: i64) -> Result<Option<RepositoryRecord>> {
        Ok(self.read()?.by_id.get(&id).cloned())
    }

    async fn upsert(&self, record: &RepositoryRecord) -> Result<i64> {
        if record.full_name.is_empty() {
            bail!("cannot store a repository without a full name");
        }
        let mut rows = self.write()?;
        let now = Utc::now();
        let existing = rows
            .by_id
            .values()
            .find(|r| r.full_name == record.full_name)
            .map(|r| (r.id, r.created_at));
        let (id, created_at) = match existing {
            Some((Some(id), created_at)) => (id, created_at),
            _ => {
                rows.next_id += 1;
                (rows.next_id, Some(now))
            }
        };
        let mut stored = record.clone();
        stored.id = Some(id);
        stored.created_at = created_at;
        stored.updated_at = Some(now);
        rows.by_id.insert(id, stored);
        Ok(id)
    }

    async fn update_icon(&self, id: i64, icon: &str) -> Result<()> {
        self.update(id, |r| r.icon = icon.to_string())
    }

    async fn update_metadata(&self, id: i64, metadata: &Metadata) -> Result<()> {
        self.update(id, |r| r.metadata = metadata.clone())
    }

    async fn update_manifest(&self, id: i64, manifest: &ManifestState) -> Result<()> {
        self.update(id, |r| r.manifest = manifest.clone())
    }

    async fn update_tool_definitions(&self, id: i64, tools: &ToolCatalog) -> Result<()> {
        self.update(id, |r| r.tool_definitions = tools.clone())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<RepositoryRecord>> {
        let mut records = self.filtered(query.tag.as_deref())?;
        records.sort_by(|a, b| {
            let ord = match query.sort {
                SortKey::Stars => a.stars.cmp(&b.stars),
                SortKey::Name => a
                    .display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
                SortKey::Id => a.id.cmp(&b.id),
            };
            let ord = ord.then_with(|| a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(records
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, tag: Option<&str>) -> Result<i64> {
        Ok(self.filtered(tag)?.len() as i64)
    }

    async fn search(
        &self,
        text: &str,
        field: SearchField,
        limit: i64,
    ) -> Result<Vec<RepositoryRecord>> {
        let needle = text.to_lowercase();
        let rows = self.read()?;
        let mut hits: Vec<&RepositoryRecord> = rows
            .by_id
            .values()
            .filter(|r| match field {
                SearchField::Description => {
                    r.description.to_lowercase().contains(&needle)
                        || r.display_name.to_lowercase().contains(&needle)
                }
                SearchField::Readme => r.readme_content.to_lowercase().contains(&needle),
            })
            .collect();
        hits.sort_by(|a, b| b.stars.cmp(&a.stars));
        Ok(hits
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
