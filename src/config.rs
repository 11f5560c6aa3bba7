//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. Secrets never live in the file; they are read from the
//! environment (`GITHUB_TOKEN`, `OPENAI_API_KEY`, `CATALOG_ACCESS_TOKEN`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: default_oracle_api_url(),
            model: default_model(),
            timeout_secs: default_oracle_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_oracle_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-4.1".to_string()
}
fn default_oracle_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Aggregator repositories whose READMEs link to MCP servers.
    #[serde(default = "default_seed_repos")]
    pub seed_repos: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_delay_secs")]
    pub batch_delay_secs: u64,
    #[serde(default = "default_delay_secs")]
    pub page_delay_secs: u64,
    /// Stop collecting once this many candidates are known.
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default = "default_filename")]
    pub filename: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seed_repos: default_seed_repos(),
            batch_size: default_batch_size(),
            batch_delay_secs: default_delay_secs(),
            page_delay_secs: default_delay_secs(),
            limit: default_limit(),
            max_pages: default_max_pages(),
            keyword: default_keyword(),
            filename: default_filename(),
        }
    }
}

fn default_seed_repos() -> Vec<String> {
    vec![
        "modelcontextprotocol/servers".to_string(),
        "awslabs/mcp".to_string(),
        "punkpeye/awesome-mcp-servers".to_string(),
    ]
}
fn default_batch_size() -> usize {
    15
}
fn default_delay_secs() -> u64 {
    5
}
fn default_limit() -> usize {
    4000
}
fn default_max_pages() -> u32 {
    10
}
fn default_keyword() -> String {
    "mcpServers".to_string()
}
fn default_filename() -> String {
    "README.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// A README must contain at least one of these to be analyzed.
    #[serde(default = "default_manifest_keywords")]
    pub manifest_keywords: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            manifest_keywords: default_manifest_keywords(),
        }
    }
}

fn default_manifest_keywords() -> Vec<String> {
    ["mcpServers", "npx", "docker", "uv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackfillConfig {
    /// Code-search queries; `{repo}` is replaced by `owner/name`.
    #[serde(default = "default_backfill_queries")]
    pub queries: Vec<String>,
    /// Cap on concatenated source sent to the extraction service.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            queries: default_backfill_queries(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

fn default_backfill_queries() -> Vec<String> {
    vec![
        "tool extension:ts repo:{repo}".to_string(),
        "mcp.tool extension:py repo:{repo}".to_string(),
    ]
}
fn default_max_source_bytes() -> usize {
    200_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_fallback_backoff_secs")]
    pub fallback_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_wait_secs: default_max_wait_secs(),
            fallback_backoff_secs: default_fallback_backoff_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_max_wait_secs() -> u64 {
    3600
}
fn default_fallback_backoff_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origin: default_cors_origin(),
            cookie_name: default_cookie_name(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_cors_origin() -> String {
    "http://localhost:5175".to_string()
}
fn default_cookie_name() -> String {
    "catalog_token".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hour of day (UTC) at which the daily collection starts.
    #[serde(default)]
    pub hour_utc: u32,
}

impl Config {
    /// Defaults with the database at `db_path`. Used by tests.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            github: GithubConfig::default(),
            oracle: OracleConfig::default(),
            discovery: DiscoveryConfig::default(),
            ingest: IngestConfig::default(),
            backfill: BackfillConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.discovery.batch_size == 0 {
        anyhow::bail!("discovery.batch_size must be > 0");
    }
    if config.discovery.limit == 0 {
        anyhow::bail!("discovery.limit must be > 0");
    }
    if config.discovery.keyword.trim().is_empty() {
        anyhow::bail!("discovery.keyword must not be empty");
    }
    if config.discovery.filename.trim().is_empty() {
        anyhow::bail!("discovery.filename must not be empty");
    }
    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if config.schedule.hour_utc > 23 {
        anyhow::bail!("schedule.hour_utc must be in [0, 23]");
    }
    for query in &config.backfill.queries {
        if !query.contains("{repo}") {
            anyhow::bail!(
                "backfill query '{}' must contain the {{repo}} placeholder",
                query
            );
        }
    }
    Ok(())
}
