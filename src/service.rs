//! The catalog service: collection runs plus the curator operations the
//! CLI and HTTP API expose.
//!
//! All clients are constructed once and injected, so tests can swap in
//! fakes for the code-hosting API, the extraction service and the store.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use mcp_catalog_core::manifest::{select_preferred, Manifest, ManifestState};
use mcp_catalog_core::metadata::Metadata;
use mcp_catalog_core::models::RepositoryRecord;
use mcp_catalog_core::oracle::ExtractionOracle;
use mcp_catalog_core::source::SourceSearch;
use mcp_catalog_core::store::RepositoryStore;

use crate::backfill::ToolBackfill;
use crate::config::Config;
use crate::discovery::Discovery;
use crate::error::IngestError;
use crate::github::GithubClient;
use crate::ingest::{IngestOutcome, Ingestor};
use crate::oracle::OpenAiOracle;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Totals for one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub run_id: String,
    pub candidates: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CollectionReport {
    fn record(&mut self, result: &Result<IngestOutcome, IngestError>) {
        match result {
            Ok(IngestOutcome::Created { .. }) => self.created += 1,
            Ok(IngestOutcome::Updated { .. }) => self.updated += 1,
            Ok(IngestOutcome::Unchanged { .. }) => self.unchanged += 1,
            Err(e) if e.is_skip() => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct CatalogService {
    store: Arc<dyn RepositoryStore>,
    ingestor: Ingestor,
    discovery: Discovery,
}

impl CatalogService {
    pub fn new(
        config: &Config,
        source: Arc<dyn SourceSearch>,
        oracle: Arc<dyn ExtractionOracle>,
        store: Arc<dyn RepositoryStore>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        let backfill = ToolBackfill::new(
            source.clone(),
            oracle.clone(),
            config.backfill.clone(),
            policy,
        );
        let ingestor = Ingestor::new(
            source.clone(),
            oracle,
            store.clone(),
            backfill,
            config.ingest.manifest_keywords.clone(),
            config.discovery.filename.clone(),
            policy,
        );
        let discovery = Discovery::new(source, config.discovery.clone(), policy);
        Self {
            store,
            ingestor,
            discovery,
        }
    }

    /// Open the database and build the GitHub and OpenAI clients.
    ///
    /// Any failure here is fatal: the service cannot run without its store.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn RepositoryStore> = Arc::new(SqliteStore::new(pool));
        let source: Arc<dyn SourceSearch> = Arc::new(GithubClient::from_env(&config.github)?);
        let oracle: Arc<dyn ExtractionOracle> = Arc::new(OpenAiOracle::from_env(&config.oracle)?);
        Ok(Self::new(config, source, oracle, store))
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    /// Discover candidates and ingest each one in discovery order.
    pub async fn collect(&self, force: bool, limit: Option<usize>) -> CollectionReport {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("collect", run_id = %run_id, force);
        self.collect_inner(run_id, force, limit).instrument(span).await
    }

    async fn collect_inner(
        &self,
        run_id: String,
        force: bool,
        limit: Option<usize>,
    ) -> CollectionReport {
        let mut report = CollectionReport {
            run_id,
            ..CollectionReport::default()
        };

        let candidates = self.discovery.discover(limit).await;
        report.candidates = candidates.len();
        info!(candidates = report.candidates, "collection started");

        for candidate in &candidates {
            let result = self.ingestor.add_repo(candidate, force).await;
            match &result {
                Ok(_) => {}
                Err(e) if e.is_skip() => {
                    info!(repo = %candidate.repository(), path = %candidate.path, reason = %e, "skipped")
                }
                Err(e) => {
                    warn!(repo = %candidate.repository(), path = %candidate.path, error = %e, "ingestion failed")
                }
            }
            report.record(&result);
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "collection finished"
        );
        report
    }

    pub async fn add_repository(
        &self,
        full_name: &str,
        force: bool,
    ) -> Result<IngestOutcome, IngestError> {
        self.ingestor.add_by_name(full_name, force).await
    }

    pub async fn reanalyze(&self, id: i64, force: bool) -> Result<IngestOutcome, IngestError> {
        self.ingestor.reanalyze(id, force).await
    }

    async fn load(&self, id: i64) -> Result<RepositoryRecord, IngestError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("repository {}", id)))
    }

    /// Promote the pending proposal to the accepted manifest.
    pub async fn approve(&self, id: i64) -> Result<RepositoryRecord, IngestError> {
        let mut record = self.load(id).await?;
        let state = std::mem::take(&mut record.manifest).approve()?;
        self.store.update_manifest(id, &state).await?;
        info!(id, full_name = %record.full_name, "proposed manifest approved");
        record.manifest = state;
        Ok(record)
    }

    /// Curator edit of the accepted manifest. A pending proposal stays
    /// pending.
    pub async fn set_manifest(
        &self,
        id: i64,
        manifest: Manifest,
    ) -> Result<RepositoryRecord, IngestError> {
        let mut record = self.load(id).await?;
        let mut configs = manifest.configs().to_vec();
        if configs.iter().filter(|c| c.preferred).count() > 1 {
            select_preferred(&mut configs);
        }
        let proposed = record.manifest.proposed().cloned().unwrap_or_default();
        let state = ManifestState::from_parts(Manifest::new(configs), proposed);
        self.store.update_manifest(id, &state).await?;
        info!(id, full_name = %record.full_name, "manifest edited");
        record.manifest = state;
        Ok(record)
    }

    /// Replace the metadata map, keeping a `categories` key present.
    pub async fn set_metadata(
        &self,
        id: i64,
        mut metadata: Metadata,
    ) -> Result<RepositoryRecord, IngestError> {
        let mut record = self.load(id).await?;
        metadata.ensure_categories();
        self.store.update_metadata(id, &metadata).await?;
        info!(id, full_name = %record.full_name, "metadata edited");
        record.metadata = metadata;
        Ok(record)
    }
}
