//! Candidate discovery.
//!
//! Two sources feed the candidate list:
//!
//! - **Seeds**: aggregator READMEs are scanned for `github.com/owner/repo`
//!   links. The linked repositories are searched in batches with one
//!   `repo:` scoped query per batch.
//! - **Global search**: an unscoped query for the manifest keyword in
//!   README files, paged until exhausted.
//!
//! Collection stops once `limit` distinct `(repository, path)` pairs are
//! known. Search failures other than throttling are logged; the query is
//! dropped unless an earlier page announced the failed one.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use mcp_catalog_core::candidate::{dedup_candidates, Candidate};
use mcp_catalog_core::source::SourceSearch;

use crate::config::DiscoveryConfig;
use crate::retry::{with_rate_limit, RetryPolicy};

fn link_pattern() -> Option<&'static Regex> {
    static LINK: OnceLock<Option<Regex>> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"github\.com/([^\s/()]+)/([^\s/()]+)").ok())
        .as_ref()
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Clean the repository part of a link: cut anchors, queries and trailing
/// markup, then drop a `.git` suffix and trailing dots.
fn clean_repo_name(raw: &str) -> &str {
    let end = raw
        .find(|c: char| matches!(c, '#' | '?' | ']' | '[' | '"' | '\'' | '<' | '>' | '`' | ',' | '*' | '|'))
        .unwrap_or(raw.len());
    let name = raw[..end].trim_end_matches('.');
    name.strip_suffix(".git").unwrap_or(name)
}

/// Distinct `owner/repo` names linked from `text`, in first-seen order.
pub fn extract_repo_links(text: &str) -> Vec<String> {
    let Some(re) = link_pattern() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut repos = Vec::new();
    for caps in re.captures_iter(text) {
        let owner = caps.get(1).map_or("", |m| m.as_str());
        let repo = caps.get(2).map_or("", |m| clean_repo_name(m.as_str()));
        if !valid_name(owner) || !valid_name(repo) {
            continue;
        }
        let full_name = format!("{}/{}", owner, repo);
        if seen.insert(full_name.to_lowercase()) {
            repos.push(full_name);
        }
    }
    repos
}

/// Scoped query for one batch of repositories.
pub fn batch_query(repos: &[String], keyword: &str, filename: &str) -> String {
    let scopes = repos
        .iter()
        .map(|r| format!("repo:{}", r))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {} filename:{}", scopes, keyword, filename)
}

pub struct Discovery {
    source: Arc<dyn SourceSearch>,
    config: DiscoveryConfig,
    policy: RetryPolicy,
}

/// Candidates collected so far, deduplicated on insert.
struct Collected {
    seen: HashSet<(String, String)>,
    candidates: Vec<Candidate>,
    limit: usize,
}

impl Collected {
    fn new(limit: usize) -> Self {
        Self {
            seen: HashSet::new(),
            candidates: Vec::new(),
            limit,
        }
    }

    fn push(&mut self, candidate: Candidate) {
        if !self.is_full() && self.seen.insert(candidate.key()) {
            self.candidates.push(candidate);
        }
    }

    fn is_full(&self) -> bool {
        self.candidates.len() >= self.limit
    }
}

impl Discovery {
    pub fn new(source: Arc<dyn SourceSearch>, config: DiscoveryConfig, policy: RetryPolicy) -> Self {
        Self {
            source,
            config,
            policy,
        }
    }

    /// Run seed harvesting, batched search and global search.
    /// `limit` overrides the configured candidate limit.
    pub async fn discover(&self, limit: Option<usize>) -> Vec<Candidate> {
        let limit = limit.unwrap_or(self.config.limit).max(1);
        let mut collected = Collected::new(limit);

        let seeds = self.harvest_seeds().await;
        info!(repositories = seeds.len(), "seed links harvested");

        for (i, batch) in seeds.chunks(self.config.batch_size.max(1)).enumerate() {
            if collected.is_full() {
                break;
            }
            if i > 0 {
                self.pause(self.config.batch_delay_secs).await;
            }
            let query = batch_query(batch, &self.config.keyword, &self.config.filename);
            self.search_pages(&query, &mut collected).await;
        }
        info!(candidates = collected.candidates.len(), "seed search finished");

        if !collected.is_full() {
            let query = format!(
                "{} filename:{}",
                self.config.keyword, self.config.filename
            );
            self.search_pages(&query, &mut collected).await;
        }

        let candidates = dedup_candidates(collected.candidates);
        info!(candidates = candidates.len(), "discovery finished");
        candidates
    }

    /// Linked repositories from every seed README, deduplicated.
    pub async fn harvest_seeds(&self) -> Vec<String> {
        let source = &self.source;
        let filename = self.config.filename.as_str();
        let mut seen = HashSet::new();
        let mut repos = Vec::new();

        for seed in &self.config.seed_repos {
            let Some((owner, repo)) = seed.split_once('/') else {
                warn!(seed = %seed, "seed is not owner/repo, skipping");
                continue;
            };
            let readme = with_rate_limit(&self.policy, "seed readme", move || {
                source.get_contents(owner, repo, filename)
            })
            .await;
            match readme {
                Ok(text) => {
                    for linked in extract_repo_links(&text) {
                        if seen.insert(linked.to_lowercase()) {
                            repos.push(linked);
                        }
                    }
                }
                Err(e) => warn!(seed = %seed, error = %e, "failed to fetch seed README"),
            }
        }
        repos
    }

    /// Page through one query. A failed page is skipped only when an
    /// earlier page announced it; otherwise the whole query is dropped.
    async fn search_pages(&self, query: &str, collected: &mut Collected) {
        let source = &self.source;
        let mut page = 1;
        let mut requested = 0;
        let mut announced = false;

        while requested < self.config.max_pages && !collected.is_full() {
            if requested > 0 {
                self.pause(self.config.page_delay_secs).await;
            }
            requested += 1;

            let current = page;
            let result = with_rate_limit(&self.policy, "code search", move || {
                source.search_code(query, current)
            })
            .await;

            match result {
                Ok(found) => {
                    debug!(query, page, hits = found.hits.len(), "search page");
                    for hit in found.hits {
                        collected.push(Candidate::new(hit.owner, hit.repo, hit.path));
                    }
                    match found.next_page {
                        Some(next) if next > page => {
                            page = next;
                            announced = true;
                        }
                        _ => break,
                    }
                }
                Err(e) if announced => {
                    warn!(query, page, error = %e, "search failed, skipping page");
                    page += 1;
                    announced = false;
                }
                Err(e) => {
                    warn!(query, page, error = %e, "search failed, skipping query");
                    break;
                }
            }
        }
    }

    async fn pause(&self, secs: u64) {
        if secs > 0 {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }
}
