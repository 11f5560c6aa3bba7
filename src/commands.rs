//! CLI command implementations. Results go to stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{bail, Result};

use mcp_catalog_core::models::{RepositoryRecord, RepositoryView};
use mcp_catalog_core::store::{ListQuery, RepositoryStore, SearchField, SortKey, SortOrder};

use crate::config::Config;
use crate::error::IngestError;
use crate::ingest::IngestOutcome;
use crate::service::CatalogService;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Open the store alone. Read-only commands need no API credentials.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    Ok(SqliteStore::new(pool))
}

fn print_row(record: &RepositoryRecord) {
    let tags = record.metadata.categories().join(",");
    let pending = if record.manifest.proposed().is_some() {
        " [proposal pending]"
    } else {
        ""
    };
    println!(
        "{:>6}  {:>7}  {}  ({}){}",
        record.id.unwrap_or_default(),
        record.stars,
        record.full_name,
        tags,
        pending
    );
}

fn describe(outcome: &IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Created {
            id,
            target,
            tools_refreshed,
        } => format!(
            "created repository {} (manifest: {}, tools refreshed: {})",
            id, target, tools_refreshed
        ),
        IngestOutcome::Updated {
            id,
            target,
            tools_refreshed,
        } => format!(
            "updated repository {} (manifest: {}, tools refreshed: {})",
            id, target, tools_refreshed
        ),
        IngestOutcome::Unchanged { id, icon_filled } => format!(
            "repository {} unchanged{}",
            id,
            if *icon_filled { " (icon filled)" } else { "" }
        ),
    }
}

fn report_ingest(result: Result<IngestOutcome, IngestError>) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!("{}", describe(&outcome));
            Ok(())
        }
        Err(e) if e.is_skip() => {
            println!("skipped: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_collect(config: &Config, force: bool, limit: Option<usize>) -> Result<()> {
    let service = CatalogService::from_config(config).await?;
    let report = service.collect(force, limit).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn run_add(config: &Config, full_name: &str, force: bool) -> Result<()> {
    let service = CatalogService::from_config(config).await?;
    report_ingest(service.add_repository(full_name, force).await)
}

pub async fn run_reanalyze(config: &Config, id: i64, force: bool) -> Result<()> {
    let service = CatalogService::from_config(config).await?;
    report_ingest(service.reanalyze(id, force).await)
}

pub async fn run_approve(config: &Config, id: i64) -> Result<()> {
    let service = CatalogService::from_config(config).await?;
    let record = service.approve(id).await?;
    println!("approved proposed manifest for {}", record.full_name);
    Ok(())
}

pub struct ListArgs {
    pub tag: Option<String>,
    pub sort: String,
    pub desc: bool,
    pub limit: i64,
    pub offset: i64,
}

pub async fn run_list(config: &Config, args: ListArgs) -> Result<()> {
    let sort = match args.sort.as_str() {
        "stars" => SortKey::Stars,
        "name" => SortKey::Name,
        "id" => SortKey::Id,
        other => bail!("Unknown sort key: '{}'. Must be stars, name, or id.", other),
    };
    let query = ListQuery {
        tag: args.tag,
        sort,
        order: if args.desc {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        },
        limit: args.limit,
        offset: args.offset,
    };

    let store = open_store(config).await?;
    let records = store.list(&query).await?;
    let total = store.count(query.tag.as_deref()).await?;

    if records.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }
    for record in &records {
        print_row(record);
    }
    println!("{} of {} repositories", records.len(), total);
    Ok(())
}

pub async fn run_search(config: &Config, text: &str, readme: bool, limit: i64) -> Result<()> {
    if text.trim().is_empty() {
        bail!("search text must not be empty");
    }
    let field = if readme {
        SearchField::Readme
    } else {
        SearchField::Description
    };
    let store = open_store(config).await?;
    let records = store.search(text.trim(), field, limit).await?;
    if records.is_empty() {
        println!("No results.");
    }
    for record in &records {
        print_row(record);
    }
    Ok(())
}

pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let store = open_store(config).await?;
    let record = store
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("repository {} not found", id))?;
    let view = RepositoryView::from_record(&record, false);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

pub async fn run_serve(config: &Config) -> Result<()> {
    let service = Arc::new(CatalogService::from_config(config).await?);
    if config.schedule.enabled {
        crate::scheduler::spawn_daily(service.clone(), config.schedule.hour_utc);
    }
    crate::server::run_server(config, service).await
}
