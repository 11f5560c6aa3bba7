//! End-to-end pipeline tests against fake search and extraction services
//! and the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mcp_catalog::config::Config;
use mcp_catalog::discovery::Discovery;
use mcp_catalog::error::{BackfillError, IngestError};
use mcp_catalog::ingest::IngestOutcome;
use mcp_catalog::retry::RetryPolicy;
use mcp_catalog::service::CatalogService;
use mcp_catalog_core::manifest::{Launch, Manifest, ManifestState, ManifestTarget, ServerConfig};
use mcp_catalog_core::metadata::{Metadata, CATEGORIES_KEY};
use mcp_catalog_core::models::RepositoryRecord;
use mcp_catalog_core::oracle::{ExtractionOracle, OracleError};
use mcp_catalog_core::source::{
    CodeHit, CodeSearchPage, RepositoryInfo, SearchError, SourceSearch,
};
use mcp_catalog_core::store::memory::InMemoryStore;
use mcp_catalog_core::store::RepositoryStore;
use mcp_catalog_core::tools::ToolCatalog;

// ============ Fakes ============

#[derive(Default)]
struct FakeSource {
    repos: Mutex<HashMap<String, RepositoryInfo>>,
    files: Mutex<HashMap<String, String>>,
    /// Result pages per query, page 1 first.
    searches: Mutex<HashMap<String, Vec<Vec<CodeHit>>>>,
    /// `(query, page)` pairs that answer with a server error.
    failing: Mutex<HashSet<(String, u32)>>,
    /// Number of upcoming `search_code` calls that report throttling.
    throttle: AtomicU32,
    search_calls: AtomicU32,
    search_log: Mutex<Vec<(String, u32)>>,
}

fn hits_of(hits: &[(&str, &str)]) -> Vec<CodeHit> {
    hits.iter()
        .map(|(repo, path)| {
            let (owner, name) = repo.split_once('/').unwrap();
            CodeHit {
                owner: owner.to_string(),
                repo: name.to_string(),
                path: path.to_string(),
            }
        })
        .collect()
}

impl FakeSource {
    fn repo(&self, full_name: &str) {
        let (owner, _) = full_name.split_once('/').unwrap();
        self.repos.lock().unwrap().insert(
            full_name.to_lowercase(),
            RepositoryInfo {
                full_name: full_name.to_string(),
                description: format!("{} from GitHub", full_name),
                stars: 42,
                language: "TypeScript".to_string(),
                html_url: format!("https://github.com/{}", full_name),
                default_branch: "main".to_string(),
                owner_avatar_url: format!("https://avatars.example/{}", owner),
            },
        );
    }

    fn file(&self, full_name: &str, path: &str, text: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(format!("{}/{}", full_name.to_lowercase(), path), text.to_string());
    }

    fn search(&self, query: &str, hits: &[(&str, &str)]) {
        self.paged_search(query, &[hits]);
    }

    fn paged_search(&self, query: &str, pages: &[&[(&str, &str)]]) {
        let pages = pages.iter().map(|hits| hits_of(hits)).collect();
        self.searches.lock().unwrap().insert(query.to_string(), pages);
    }

    fn fail_search(&self, query: &str, page: u32) {
        self.failing
            .lock()
            .unwrap()
            .insert((query.to_string(), page));
    }

    fn search_log(&self) -> Vec<(String, u32)> {
        self.search_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceSearch for FakeSource {
    async fn search_code(&self, query: &str, page: u32) -> Result<CodeSearchPage, SearchError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.search_log
            .lock()
            .unwrap()
            .push((query.to_string(), page));
        if self
            .throttle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SearchError::RateLimited { reset_at: None });
        }
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&(query.to_string(), page))
        {
            return Err(SearchError::Http {
                status: 500,
                message: "server error".to_string(),
            });
        }
        let pages = self
            .searches
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        let index = page.saturating_sub(1) as usize;
        Ok(CodeSearchPage {
            hits: pages.get(index).cloned().unwrap_or_default(),
            next_page: (index + 1 < pages.len()).then_some(page + 1),
        })
    }

    async fn get_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<String, SearchError> {
        let key = format!("{}/{}/{}", owner, repo, path).to_lowercase();
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k.to_lowercase() == key)
            .map(|(_, v)| v.clone())
            .ok_or(SearchError::NotFound)
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<RepositoryInfo, SearchError> {
        self.repos
            .lock()
            .unwrap()
            .get(&format!("{}/{}", owner, repo).to_lowercase())
            .cloned()
            .ok_or(SearchError::NotFound)
    }
}

const TOOLS_PROMPT_START: &str = "You extract MCP tool definitions";

struct FakeOracle {
    manifest_reply: Mutex<String>,
    tools_reply: Mutex<String>,
    manifest_calls: AtomicU32,
    tools_calls: AtomicU32,
    last_tools_prompt: Mutex<String>,
}

impl FakeOracle {
    fn new(manifest_reply: &str, tools_reply: &str) -> Self {
        Self {
            manifest_reply: Mutex::new(manifest_reply.to_string()),
            tools_reply: Mutex::new(tools_reply.to_string()),
            manifest_calls: AtomicU32::new(0),
            tools_calls: AtomicU32::new(0),
            last_tools_prompt: Mutex::new(String::new()),
        }
    }

    fn set_manifest_reply(&self, reply: &str) {
        *self.manifest_reply.lock().unwrap() = reply.to_string();
    }

    fn set_tools_reply(&self, reply: &str) {
        *self.tools_reply.lock().unwrap() = reply.to_string();
    }

    fn manifest_calls(&self) -> u32 {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    fn tools_calls(&self) -> u32 {
        self.tools_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionOracle for FakeOracle {
    async fn complete_json(&self, prompt: &str) -> Result<String, OracleError> {
        if prompt.starts_with(TOOLS_PROMPT_START) {
            self.tools_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_tools_prompt.lock().unwrap() = prompt.to_string();
            Ok(self.tools_reply.lock().unwrap().clone())
        } else {
            self.manifest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.manifest_reply.lock().unwrap().clone())
        }
    }
}

// ============ Fixtures ============

const README_NPX: &str = r#"# Server A

```json
"mcpServers": {"server-a": {"command": "npx", "args": ["x"]}}
```
"#;

const NPX_REPLY: &str = r#"{
  "name": "Server A",
  "description": "Does A things",
  "category": "Developer Tools, TypeScript",
  "configs": [{"command": "npx", "args": ["x"], "env": []}]
}"#;

const DOCKER_AND_NPX_REPLY: &str = r#"{
  "name": "Server A",
  "description": "Does A things, now in Docker",
  "category": "Developer Tools",
  "configs": [
    {"command": "docker", "args": ["run", "-i", "acme/a"], "env": []},
    {"command": "npx", "args": ["-y", "server-a"], "env": []}
  ]
}"#;

const ONE_TOOL_REPLY: &str = r#"{"tools": [{"name": "echo", "description": "Echo text",
  "inputSchema": {"properties": {"text": {"type": "string", "description": "Text", "required": true}}}}]}"#;

struct Harness {
    source: Arc<FakeSource>,
    oracle: Arc<FakeOracle>,
    store: Arc<InMemoryStore>,
    service: CatalogService,
}

fn test_config() -> Config {
    let mut config = Config::with_db_path("unused.sqlite");
    config.discovery.seed_repos = vec!["seed/list".to_string()];
    config.discovery.batch_delay_secs = 0;
    config.discovery.page_delay_secs = 0;
    config.discovery.max_pages = 10;
    config.retry.max_attempts = 3;
    config.retry.max_wait_secs = 0;
    config.retry.fallback_backoff_secs = 0;
    config
}

fn harness(manifest_reply: &str, tools_reply: &str) -> Harness {
    let source = Arc::new(FakeSource::default());
    let oracle = Arc::new(FakeOracle::new(manifest_reply, tools_reply));
    let store = Arc::new(InMemoryStore::new());
    let service = CatalogService::new(
        &test_config(),
        source.clone(),
        oracle.clone(),
        store.clone(),
    );
    Harness {
        source,
        oracle,
        store,
        service,
    }
}

impl Harness {
    async fn record(&self, full_name: &str) -> RepositoryRecord {
        self.store
            .find_by_full_name(full_name)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("{} not stored", full_name))
    }
}

fn command_of(config: &ServerConfig) -> &str {
    match &config.launch {
        Launch::Command { command, .. } => command,
        Launch::Remote { .. } => "",
    }
}

// ============ Ingestion ============

#[tokio::test]
async fn test_fresh_candidate_is_accepted_directly() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    let outcome = h.service.add_repository("acme/server-a", false).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Created {
            target: ManifestTarget::Accepted,
            tools_refreshed: true,
            ..
        }
    ));

    let record = h.record("acme/server-a").await;
    let accepted = record.manifest.accepted().expect("accepted manifest");
    assert_eq!(accepted.len(), 1);
    let preferred = accepted.preferred().expect("preferred config");
    assert_eq!(command_of(preferred), "npx");
    assert!(record.manifest.proposed().is_none());
    assert_eq!(
        record.metadata.get(CATEGORIES_KEY),
        Some("Developer Tools,TypeScript")
    );
    assert_eq!(record.display_name, "Server A");
    assert_eq!(record.description, "Does A things");
    assert_eq!(record.icon, "https://avatars.example/acme");
    assert_eq!(record.url, "https://github.com/acme/server-a");
    assert_eq!(record.tool_definitions.tools()[0].name, "echo");
}

#[tokio::test]
async fn test_unchanged_readme_is_a_no_op() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    h.service.add_repository("acme/server-a", false).await.unwrap();
    let before = h.record("acme/server-a").await;
    let calls = (h.oracle.manifest_calls(), h.oracle.tools_calls());

    let outcome = h.service.add_repository("acme/server-a", false).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Unchanged {
            icon_filled: false,
            ..
        }
    ));
    assert_eq!(h.record("acme/server-a").await, before);
    assert_eq!((h.oracle.manifest_calls(), h.oracle.tools_calls()), calls);
}

#[tokio::test]
async fn test_unchanged_readme_fills_missing_icon() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    let mut record = RepositoryRecord::new_for("acme/server-a", "README.md");
    record.readme_content = README_NPX.to_string();
    record.manifest = ManifestState::Accepted(Manifest::new(vec![ServerConfig::command(
        "npx",
        vec!["x".to_string()],
        Vec::new(),
    )]));
    h.store.upsert(&record).await.unwrap();

    let outcome = h.service.add_repository("acme/server-a", false).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Unchanged {
            icon_filled: true,
            ..
        }
    ));
    let stored = h.record("acme/server-a").await;
    assert_eq!(stored.icon, "https://avatars.example/acme");
    assert_eq!(stored.manifest, record.manifest);
    assert_eq!(h.oracle.manifest_calls(), 0);
}

#[tokio::test]
async fn test_changed_readme_is_proposed_not_overwritten() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.service.add_repository("acme/server-a", false).await.unwrap();
    let before = h.record("acme/server-a").await;
    let accepted_before = before.manifest.accepted().unwrap().to_json();

    h.source.file(
        "acme/server-a",
        "README.md",
        &format!("{}\nAlso available via docker.", README_NPX),
    );
    h.oracle.set_manifest_reply(DOCKER_AND_NPX_REPLY);

    let outcome = h.service.add_repository("acme/server-a", false).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Updated {
            target: ManifestTarget::Proposed,
            ..
        }
    ));

    let after = h.record("acme/server-a").await;
    assert_eq!(after.manifest.accepted().unwrap().to_json(), accepted_before);
    let proposed = after.manifest.proposed().expect("proposal");
    assert_eq!(proposed.len(), 2);
    assert!(!proposed.configs()[0].preferred);
    assert!(proposed.configs()[1].preferred);
    assert_eq!(command_of(&proposed.configs()[1]), "npx");
}

#[tokio::test]
async fn test_force_writes_accepted_and_rescans_tools() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.service.add_repository("acme/server-a", false).await.unwrap();

    h.oracle.set_manifest_reply(DOCKER_AND_NPX_REPLY);
    h.oracle.set_tools_reply(r#"{"tools": []}"#);
    let outcome = h.service.add_repository("acme/server-a", true).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Updated {
            target: ManifestTarget::Accepted,
            tools_refreshed: true,
            ..
        }
    ));

    let record = h.record("acme/server-a").await;
    assert_eq!(record.manifest.accepted().unwrap().len(), 2);
    assert!(record.manifest.proposed().is_none());
    assert_eq!(record.tool_definitions, ToolCatalog::Scanned(Vec::new()));
    assert_eq!(h.oracle.tools_calls(), 2);
}

#[tokio::test]
async fn test_catalogued_tools_are_not_rescanned_without_force() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.service.add_repository("acme/server-a", false).await.unwrap();

    h.source.file("acme/server-a", "README.md", &format!("{}\nv2", README_NPX));
    h.service.add_repository("acme/server-a", false).await.unwrap();
    assert_eq!(h.oracle.tools_calls(), 1);
    assert_eq!(h.oracle.manifest_calls(), 2);
}

#[tokio::test]
async fn test_verified_tag_survives_reanalysis() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    let outcome = h.service.add_repository("acme/server-a", false).await.unwrap();

    let mut metadata = Metadata::new();
    metadata.insert(CATEGORIES_KEY, "Featured,Verified");
    metadata.insert("maintainer", "acme");
    h.service.set_metadata(outcome.id(), metadata).await.unwrap();

    h.oracle
        .set_manifest_reply(&NPX_REPLY.replace("Developer Tools, TypeScript", "Productivity"));
    h.service.reanalyze(outcome.id(), true).await.unwrap();

    let record = h.record("acme/server-a").await;
    assert_eq!(record.metadata.get(CATEGORIES_KEY), Some("Productivity,Verified"));
    assert_eq!(record.metadata.get("maintainer"), Some("acme"));
}

#[tokio::test]
async fn test_readme_without_keywords_is_rejected() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/library");
    h.source
        .file("acme/library", "README.md", "# A library\n\nJust a library.");

    let err = h
        .service
        .add_repository("acme/library", false)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NoManifestKeywords));
    assert!(err.is_skip());
    assert_eq!(h.store.count(None).await.unwrap(), 0);
    assert_eq!(h.oracle.manifest_calls(), 0);
}

#[tokio::test]
async fn test_rejected_readme_leaves_existing_record_untouched() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.service.add_repository("acme/server-a", false).await.unwrap();
    let before = h.record("acme/server-a").await;

    h.source
        .file("acme/server-a", "README.md", "# Archived\n\nMoved elsewhere.");
    let err = h
        .service
        .add_repository("acme/server-a", true)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NoManifestKeywords));
    assert_eq!(h.record("acme/server-a").await, before);
}

#[tokio::test]
async fn test_empty_extraction_is_not_persisted() {
    let h = harness("{}", ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    let err = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NoManifest));
    assert_eq!(h.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_extraction_is_not_persisted() {
    let h = harness("this is not json", ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    let err = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap_err();
    assert!(err.is_skip());
    assert_eq!(h.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_failure_persists_nothing() {
    let h = harness(NPX_REPLY, "{ not json");
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    let err = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Backfill(BackfillError::Extraction(OracleError::Malformed(_)))
    ));
    assert!(!err.is_skip());
    assert_eq!(h.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_search_failure_keeps_error_chain() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    let query = test_config().backfill.queries[0].replace("{repo}", "acme/server-a");
    h.source.fail_search(&query, 1);

    let err = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap_err();
    match &err {
        IngestError::Backfill(BackfillError::Search { query: failed, source }) => {
            assert_eq!(failed, &query);
            assert!(matches!(source, SearchError::Http { status: 500, .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let backfill = std::error::Error::source(&err).expect("backfill source");
    let search = backfill.source().expect("search source");
    assert_eq!(search.to_string(), "HTTP 500: server error");
    assert_eq!(h.store.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_backfill_failure_keeps_previous_manifest() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.service.add_repository("acme/server-a", false).await.unwrap();
    let before = h.record("acme/server-a").await;

    h.oracle.set_manifest_reply(DOCKER_AND_NPX_REPLY);
    h.oracle.set_tools_reply("garbage");
    let err = h
        .service
        .add_repository("acme/server-a", true)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Backfill(_)));
    assert_eq!(h.record("acme/server-a").await, before);
}

#[tokio::test]
async fn test_no_tools_found_stores_empty_list() {
    let h = harness(NPX_REPLY, r#"{"tools": []}"#);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);

    h.service.add_repository("acme/server-a", false).await.unwrap();
    let record = h.record("acme/server-a").await;
    assert_eq!(record.tool_definitions, ToolCatalog::Scanned(Vec::new()));
    assert_eq!(record.tool_definitions.to_stored(), "[]");
}

#[tokio::test]
async fn test_remote_only_manifest_skips_backfill() {
    let reply = r#"{"name": "Hosted", "description": "Hosted server", "category": "Cloud Platforms",
        "configs": [{"url": "https://mcp.example.com/sse", "urlDescription": "Hosted endpoint"}]}"#;
    let h = harness(reply, ONE_TOOL_REPLY);
    h.source.repo("acme/hosted");
    h.source
        .file("acme/hosted", "README.md", "Add to mcpServers with the url.");

    let outcome = h.service.add_repository("acme/hosted", false).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Created {
            tools_refreshed: false,
            ..
        }
    ));
    let record = h.record("acme/hosted").await;
    assert_eq!(record.tool_definitions, ToolCatalog::Unscanned);
    assert!(record.manifest.accepted().unwrap().preferred().is_none());
    assert_eq!(h.oracle.tools_calls(), 0);
}

#[tokio::test]
async fn test_same_full_name_yields_one_record() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("Acme/Server-A");
    h.source.file("Acme/Server-A", "README.md", README_NPX);

    h.service.add_repository("acme/server-a", false).await.unwrap();
    h.service.add_repository("ACME/SERVER-A", true).await.unwrap();
    assert_eq!(h.store.count(None).await.unwrap(), 1);
    h.record("Acme/Server-A").await;
}

#[tokio::test]
async fn test_subdirectory_readme_gets_its_own_record() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/monorepo");
    h.source.file("acme/monorepo", "servers/a/README.md", README_NPX);
    h.source.file("acme/monorepo", "servers/b/README.md", README_NPX);
    h.source.file("acme/monorepo", "servers/a/src/index.ts", "server.tool('a_tool')");
    h.source.file("acme/monorepo", "servers/b/src/index.ts", "server.tool('b_tool')");
    h.source.search(
        "tool extension:ts repo:acme/monorepo",
        &[
            ("acme/monorepo", "servers/a/src/index.ts"),
            ("acme/monorepo", "servers/b/src/index.ts"),
            ("acme/monorepo", "servers/a/src/index.ts"),
        ],
    );

    h.service
        .add_repository("acme/monorepo/servers/a", false)
        .await
        .unwrap();
    let prompt = h.oracle.last_tools_prompt.lock().unwrap().clone();
    assert!(prompt.contains("a_tool"));
    assert!(!prompt.contains("b_tool"));
    assert_eq!(prompt.matches("// File: servers/a/src/index.ts").count(), 1);

    h.service
        .add_repository("acme/monorepo/servers/b", false)
        .await
        .unwrap();

    let a = h.record("acme/monorepo/servers/a").await;
    assert_eq!(a.path, "servers/a/README.md");
    assert_eq!(a.url, "https://github.com/acme/monorepo/tree/main/servers/a");
    h.record("acme/monorepo/servers/b").await;
    assert_eq!(h.store.count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_invalid_and_missing_names() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    let err = h.service.add_repository("justone", false).await.unwrap_err();
    assert!(matches!(err, IngestError::InvalidName(_)));
    assert!(err.is_client_error());

    let err = h.service.add_repository("acme/ghost", false).await.unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));
}

// ============ Curator operations ============

#[tokio::test]
async fn test_approve_promotes_proposal() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    let id = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap()
        .id();

    h.oracle.set_manifest_reply(DOCKER_AND_NPX_REPLY);
    h.service.reanalyze(id, false).await.unwrap();
    assert!(h.record("acme/server-a").await.manifest.proposed().is_some());

    let approved = h.service.approve(id).await.unwrap();
    assert_eq!(approved.manifest.accepted().unwrap().len(), 2);
    let stored = h.record("acme/server-a").await;
    assert!(stored.manifest.proposed().is_none());
    assert_eq!(stored.manifest.accepted().unwrap().len(), 2);

    let err = h.service.approve(id).await.unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_manual_manifest_edit_is_accepted() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    let id = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap()
        .id();

    let manifest: Manifest = serde_json::from_str(
        r#"[{"command": "uvx", "args": ["server-a"], "preferred": true},
            {"command": "docker", "args": ["run"], "preferred": true}]"#,
    )
    .unwrap();
    h.service.set_manifest(id, manifest).await.unwrap();

    let record = h.record("acme/server-a").await;
    let accepted = record.manifest.accepted().unwrap();
    assert_eq!(accepted.configs().iter().filter(|c| c.preferred).count(), 1);
    assert_eq!(command_of(accepted.preferred().unwrap()), "uvx");
}

#[tokio::test]
async fn test_metadata_edit_keeps_categories_key() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    let id = h
        .service
        .add_repository("acme/server-a", false)
        .await
        .unwrap()
        .id();

    let mut metadata = Metadata::new();
    metadata.insert("note", "x");
    h.service.set_metadata(id, metadata).await.unwrap();
    let record = h.record("acme/server-a").await;
    assert_eq!(record.metadata.get(CATEGORIES_KEY), Some(""));
    assert_eq!(record.metadata.get("note"), Some("x"));
}

// ============ Collection ============

#[tokio::test]
async fn test_collect_discovers_dedups_and_ingests() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.file(
        "seed/list",
        "README.md",
        "- [A](https://github.com/acme/server-a)\n- [Lib](https://github.com/acme/library)\n\
         - [A again](https://github.com/acme/server-a)",
    );
    h.source.search(
        "repo:acme/server-a repo:acme/library mcpServers filename:README.md",
        &[
            ("acme/server-a", "README.md"),
            ("acme/library", "README.md"),
            ("acme/server-a", "README.md"),
        ],
    );
    h.source.search(
        "mcpServers filename:README.md",
        &[("acme/server-a", "README.md"), ("acme/server-b", "README.md")],
    );
    for name in ["acme/server-a", "acme/server-b", "acme/library"] {
        h.source.repo(name);
    }
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.source.file("acme/server-b", "README.md", README_NPX);
    h.source.file("acme/library", "README.md", "Plain library.");

    let report = h.service.collect(false, None).await;
    assert_eq!(report.candidates, 3);
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.run_id.is_empty());

    let again = h.service.collect(false, None).await;
    assert_eq!(again.unchanged, 2);
    assert_eq!(again.created, 0);
    assert_eq!(h.store.count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_collect_waits_out_rate_limits() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.search(
        "mcpServers filename:README.md",
        &[("acme/server-a", "README.md")],
    );
    h.source.repo("acme/server-a");
    h.source.file("acme/server-a", "README.md", README_NPX);
    h.source.throttle.store(2, Ordering::SeqCst);

    let report = h.service.collect(false, None).await;
    assert_eq!(report.candidates, 1);
    assert_eq!(report.created, 1);
    assert!(h.source.search_calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_collect_respects_limit() {
    let h = harness(NPX_REPLY, ONE_TOOL_REPLY);
    h.source.search(
        "mcpServers filename:README.md",
        &[
            ("acme/a", "README.md"),
            ("acme/b", "README.md"),
            ("acme/c", "README.md"),
        ],
    );
    let report = h.service.collect(false, Some(2)).await;
    assert_eq!(report.candidates, 2);
    assert_eq!(report.failed, 2);
}

// ============ Discovery ============

const GLOBAL_QUERY: &str = "mcpServers filename:README.md";

fn discovery(source: &Arc<FakeSource>, config: &Config) -> Discovery {
    Discovery::new(
        source.clone(),
        config.discovery.clone(),
        RetryPolicy::from_config(&config.retry),
    )
}

fn repositories(candidates: &[mcp_catalog_core::candidate::Candidate]) -> Vec<String> {
    let mut names: Vec<String> = candidates.iter().map(|c| c.repository()).collect();
    names.sort();
    names
}

fn calls(log: &[(&str, u32)]) -> Vec<(String, u32)> {
    log.iter().map(|(q, p)| (q.to_string(), *p)).collect()
}

#[tokio::test]
async fn test_discovery_follows_next_page() {
    let source = Arc::new(FakeSource::default());
    source.paged_search(
        GLOBAL_QUERY,
        &[
            &[("acme/a", "README.md")],
            &[("acme/b", "README.md")],
            &[("acme/c", "README.md")],
        ],
    );

    let found = discovery(&source, &test_config()).discover(None).await;
    assert_eq!(repositories(&found), vec!["acme/a", "acme/b", "acme/c"]);
    assert_eq!(
        source.search_log(),
        calls(&[(GLOBAL_QUERY, 1), (GLOBAL_QUERY, 2), (GLOBAL_QUERY, 3)])
    );
}

#[tokio::test]
async fn test_discovery_stops_at_max_pages() {
    let source = Arc::new(FakeSource::default());
    source.paged_search(
        GLOBAL_QUERY,
        &[&[("acme/a", "README.md")], &[("acme/b", "README.md")]],
    );
    let mut config = test_config();
    config.discovery.max_pages = 1;

    let found = discovery(&source, &config).discover(None).await;
    assert_eq!(repositories(&found), vec!["acme/a"]);
    assert_eq!(source.search_log(), calls(&[(GLOBAL_QUERY, 1)]));
}

#[tokio::test]
async fn test_discovery_skips_announced_page_that_fails() {
    let source = Arc::new(FakeSource::default());
    source.paged_search(
        GLOBAL_QUERY,
        &[
            &[("acme/a", "README.md")],
            &[("acme/b", "README.md")],
            &[("acme/c", "README.md")],
        ],
    );
    source.fail_search(GLOBAL_QUERY, 2);

    let found = discovery(&source, &test_config()).discover(None).await;
    assert_eq!(repositories(&found), vec!["acme/a", "acme/c"]);
    assert_eq!(
        source.search_log(),
        calls(&[(GLOBAL_QUERY, 1), (GLOBAL_QUERY, 2), (GLOBAL_QUERY, 3)])
    );
}

#[tokio::test]
async fn test_discovery_drops_batch_after_failed_first_page() {
    let source = Arc::new(FakeSource::default());
    source.file(
        "seed/list",
        "README.md",
        "- https://github.com/bad/one\n- https://github.com/good/two",
    );
    let bad = "repo:bad/one mcpServers filename:README.md";
    let good = "repo:good/two mcpServers filename:README.md";
    source.search(bad, &[("bad/one", "README.md")]);
    source.fail_search(bad, 1);
    source.search(good, &[("good/two", "README.md")]);
    source.search(GLOBAL_QUERY, &[("acme/global", "README.md")]);
    let mut config = test_config();
    config.discovery.batch_size = 1;

    let found = discovery(&source, &config).discover(None).await;
    assert_eq!(repositories(&found), vec!["acme/global", "good/two"]);
    assert_eq!(
        source.search_log(),
        calls(&[(bad, 1), (good, 1), (GLOBAL_QUERY, 1)])
    );
}

#[tokio::test]
async fn test_discovery_skips_unreadable_seed() {
    let source = Arc::new(FakeSource::default());
    source.file("seed/list", "README.md", "- https://github.com/good/two");
    let good = "repo:good/two mcpServers filename:README.md";
    source.search(good, &[("good/two", "README.md")]);
    let mut config = test_config();
    config.discovery.seed_repos = vec!["seed/missing".to_string(), "seed/list".to_string()];

    let found = discovery(&source, &config).discover(None).await;
    assert_eq!(repositories(&found), vec!["good/two"]);
    assert_eq!(source.search_log(), calls(&[(good, 1), (GLOBAL_QUERY, 1)]));
}
