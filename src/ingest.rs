//! Ingestion of a single candidate README.
//!
//! For one `(owner, repo, path)` the [`Ingestor`]:
//!
//! 1. fetches repository details and the README,
//! 2. rejects READMEs without any manifest keyword,
//! 3. derives the catalog name and URL (README directory appended),
//! 4. short-circuits when the stored README is identical and `force` is off
//!    (only an empty icon is filled in),
//! 5. asks the extraction service for launch configs, picks the preferred
//!    one and merges categories,
//! 6. runs the tool backfill when warranted,
//! 7. writes the record once.
//!
//! Nothing is written when any step before the final upsert fails, so a
//! failed backfill never leaves a half-refreshed record behind.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mcp_catalog_core::candidate::{
    candidate_for_full_name, contains_manifest_keyword, Candidate, RepoLocation,
};
use mcp_catalog_core::manifest::ManifestTarget;
use mcp_catalog_core::models::RepositoryRecord;
use mcp_catalog_core::oracle::{ExtractionOracle, OracleError};
use mcp_catalog_core::source::{SearchError, SourceSearch};
use mcp_catalog_core::store::RepositoryStore;
use mcp_catalog_core::tools::{BackfillDecision, ToolCatalog};

use crate::analysis::{manifest_prompt, parse_analysis};
use crate::backfill::ToolBackfill;
use crate::error::IngestError;
use crate::retry::{with_rate_limit, RetryPolicy};

/// What an ingestion did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created {
        id: i64,
        target: ManifestTarget,
        tools_refreshed: bool,
    },
    Updated {
        id: i64,
        target: ManifestTarget,
        tools_refreshed: bool,
    },
    /// README unchanged; at most the icon was filled in.
    Unchanged { id: i64, icon_filled: bool },
}

impl IngestOutcome {
    pub fn id(&self) -> i64 {
        match self {
            IngestOutcome::Created { id, .. }
            | IngestOutcome::Updated { id, .. }
            | IngestOutcome::Unchanged { id, .. } => *id,
        }
    }
}

struct AnalysisSummary {
    target: ManifestTarget,
    tools_refreshed: bool,
}

pub struct Ingestor {
    source: Arc<dyn SourceSearch>,
    oracle: Arc<dyn ExtractionOracle>,
    store: Arc<dyn RepositoryStore>,
    backfill: ToolBackfill,
    manifest_keywords: Vec<String>,
    readme_name: String,
    policy: RetryPolicy,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn SourceSearch>,
        oracle: Arc<dyn ExtractionOracle>,
        store: Arc<dyn RepositoryStore>,
        backfill: ToolBackfill,
        manifest_keywords: Vec<String>,
        readme_name: String,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            oracle,
            store,
            backfill,
            manifest_keywords,
            readme_name,
            policy,
        }
    }

    /// Ingest the README at `candidate.path`.
    pub async fn add_repo(
        &self,
        candidate: &Candidate,
        force: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let repository = candidate.repository();
        let source = &self.source;
        let (owner, repo, path) = (
            candidate.owner.as_str(),
            candidate.repo.as_str(),
            candidate.path.as_str(),
        );

        let info = with_rate_limit(&self.policy, "repository", move || {
            source.get_repository(owner, repo)
        })
        .await
        .map_err(|e| match e {
            SearchError::NotFound => IngestError::NotFound(repository.clone()),
            other => IngestError::fetch(format!("repository {}", repository), other),
        })?;

        let readme = with_rate_limit(&self.policy, "readme", move || {
            source.get_contents(owner, repo, path)
        })
        .await
        .map_err(|e| match e {
            SearchError::NotFound => {
                IngestError::NotFound(format!("{}/{}", repository, candidate.path))
            }
            other => IngestError::fetch(format!("{}/{}", repository, candidate.path), other),
        })?;

        if !contains_manifest_keyword(&readme, &self.manifest_keywords) {
            return Err(IngestError::NoManifestKeywords);
        }

        let base_name = if info.full_name.is_empty() {
            repository.as_str()
        } else {
            info.full_name.as_str()
        };
        let location =
            RepoLocation::derive(base_name, &info.html_url, &info.default_branch, &candidate.path);

        let existing = self.store.find_by_full_name(&location.full_name).await?;

        if let Some(stored) = &existing {
            if stored.readme_content == readme && !force {
                return self.fill_icon(stored, &info.owner_avatar_url).await;
            }
        }

        let is_new = existing.is_none();
        let mut record = existing
            .unwrap_or_else(|| RepositoryRecord::new_for(&location.full_name, &candidate.path));
        record.path = candidate.path.clone();
        record.url = location.url;
        record.stars = info.stars;
        record.language = info.language;
        record.readme_content = readme;
        if !info.owner_avatar_url.is_empty() {
            record.icon = info.owner_avatar_url;
        }
        if record.description.is_empty() {
            record.description = info.description;
        }

        let summary = self.analyze(&mut record, candidate, force).await?;
        let id = self.store.upsert(&record).await?;

        info!(
            full_name = %record.full_name,
            id,
            target = %summary.target,
            tools_refreshed = summary.tools_refreshed,
            created = is_new,
            "repository ingested"
        );

        Ok(if is_new {
            IngestOutcome::Created {
                id,
                target: summary.target,
                tools_refreshed: summary.tools_refreshed,
            }
        } else {
            IngestOutcome::Updated {
                id,
                target: summary.target,
                tools_refreshed: summary.tools_refreshed,
            }
        })
    }

    /// Ingest by catalog name `owner/repo[/dir...]`.
    pub async fn add_by_name(
        &self,
        full_name: &str,
        force: bool,
    ) -> Result<IngestOutcome, IngestError> {
        let candidate = candidate_for_full_name(full_name, &self.readme_name)
            .ok_or_else(|| IngestError::InvalidName(full_name.to_string()))?;
        self.add_repo(&candidate, force).await
    }

    /// Re-run extraction over the stored README without refetching it.
    pub async fn reanalyze(&self, id: i64, force: bool) -> Result<IngestOutcome, IngestError> {
        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("repository {}", id)))?;

        if !contains_manifest_keyword(&record.readme_content, &self.manifest_keywords) {
            return Err(IngestError::NoManifestKeywords);
        }

        let physical = candidate_for_full_name(&record.full_name, &self.readme_name)
            .ok_or_else(|| IngestError::InvalidName(record.full_name.clone()))?;
        let candidate = Candidate::new(physical.owner, physical.repo, record.path.clone());

        let summary = self.analyze(&mut record, &candidate, force).await?;
        let id = self.store.upsert(&record).await?;

        info!(
            full_name = %record.full_name,
            id,
            target = %summary.target,
            tools_refreshed = summary.tools_refreshed,
            "repository re-analyzed"
        );
        Ok(IngestOutcome::Updated {
            id,
            target: summary.target,
            tools_refreshed: summary.tools_refreshed,
        })
    }

    async fn fill_icon(
        &self,
        stored: &RepositoryRecord,
        avatar_url: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let id = stored
            .id
            .ok_or_else(|| IngestError::Store(anyhow::anyhow!("stored record has no id")))?;
        let icon_filled = stored.icon.is_empty() && !avatar_url.is_empty();
        if icon_filled {
            self.store.update_icon(id, avatar_url).await?;
        }
        debug!(full_name = %stored.full_name, icon_filled, "README unchanged");
        Ok(IngestOutcome::Unchanged { id, icon_filled })
    }

    /// Extraction, preferred selection, category merge and backfill, all
    /// applied to `record` in memory.
    async fn analyze(
        &self,
        record: &mut RepositoryRecord,
        candidate: &Candidate,
        force: bool,
    ) -> Result<AnalysisSummary, IngestError> {
        let target = record.manifest.target(force);
        let prior = record.manifest.accepted().map(|m| m.to_json());
        let prompt = manifest_prompt(&record.full_name, &record.readme_content, prior.as_deref());

        let analysis = match self.oracle.complete_json(&prompt).await {
            Ok(reply) => parse_analysis(&reply),
            Err(e) => Err(e),
        };
        let mut analysis = match analysis {
            Ok(a) => a,
            Err(e @ (OracleError::Malformed(_) | OracleError::EmptyResponse)) => {
                warn!(full_name = %record.full_name, error = %e, "unusable extraction reply");
                return Err(IngestError::NoManifest);
            }
            Err(e) => return Err(IngestError::Extraction(e)),
        };

        if analysis.configs.is_empty() {
            return Err(IngestError::NoManifest);
        }

        let has_preferred = analysis.configs.mark_preferred().is_some();
        record.metadata.merge_categories(&analysis.category);
        if !analysis.description.is_empty() {
            record.description = analysis.description;
        }
        if !analysis.name.is_empty() {
            record.display_name = analysis.name;
        } else if record.display_name.is_empty() {
            record.display_name = candidate.repo.clone();
        }

        let decision = BackfillDecision::decide(has_preferred, &record.tool_definitions, force);
        let tools_refreshed = decision.is_required();
        if tools_refreshed {
            let tools = self
                .backfill
                .run(
                    &candidate.owner,
                    &candidate.repo,
                    &candidate.path,
                    &record.readme_content,
                )
                .await?;
            record.tool_definitions = ToolCatalog::Scanned(tools);
        } else {
            debug!(full_name = %record.full_name, ?decision, "tool backfill skipped");
        }

        let state = std::mem::take(&mut record.manifest);
        record.manifest = state.apply(target, analysis.configs);

        Ok(AnalysisSummary {
            target,
            tools_refreshed,
        })
    }
}
