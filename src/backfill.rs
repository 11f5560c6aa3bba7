//! Tool-definition backfill.
//!
//! Searches the repository for files that register MCP tools, keeps the
//! ones under the README's directory, and asks the extraction service to
//! turn the concatenated source into a tool list.

use std::sync::Arc;

use tracing::{debug, info};

use mcp_catalog_core::candidate::{dedup_candidates, directory_prefix, is_under, Candidate};
use mcp_catalog_core::oracle::ExtractionOracle;
use mcp_catalog_core::source::SourceSearch;
use mcp_catalog_core::tools::ToolDescriptor;

use crate::analysis::{parse_tools, tools_prompt};
use crate::config::BackfillConfig;
use crate::error::{BackfillError, IngestError};
use crate::retry::{with_rate_limit, RetryPolicy};

pub struct ToolBackfill {
    source: Arc<dyn SourceSearch>,
    oracle: Arc<dyn ExtractionOracle>,
    config: BackfillConfig,
    policy: RetryPolicy,
}

impl ToolBackfill {
    pub fn new(
        source: Arc<dyn SourceSearch>,
        oracle: Arc<dyn ExtractionOracle>,
        config: BackfillConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            oracle,
            config,
            policy,
        }
    }

    /// Source files in `owner/repo` that look like tool registrations and
    /// live under the directory of `readme_path`.
    pub async fn find_tool_files(
        &self,
        owner: &str,
        repo: &str,
        readme_path: &str,
    ) -> Result<Vec<Candidate>, IngestError> {
        let repository = format!("{}/{}", owner, repo);
        let source = &self.source;
        let mut found = Vec::new();
        for template in &self.config.queries {
            let query = template.replace("{repo}", &repository);
            let q = query.as_str();
            let page = with_rate_limit(&self.policy, "tool search", move || {
                source.search_code(q, 1)
            })
            .await
            .map_err(|source| BackfillError::Search {
                query: query.clone(),
                source,
            })?;
            found.extend(
                page.hits
                    .into_iter()
                    .map(|hit| Candidate::new(hit.owner, hit.repo, hit.path)),
            );
        }

        let prefix = directory_prefix(readme_path);
        Ok(dedup_candidates(found)
            .into_iter()
            .filter(|c| c.repository().eq_ignore_ascii_case(&repository))
            .filter(|c| is_under(&c.path, prefix))
            .collect())
    }

    /// Recover the tool catalog. An empty list is a valid result.
    pub async fn run(
        &self,
        owner: &str,
        repo: &str,
        readme_path: &str,
        readme: &str,
    ) -> Result<Vec<ToolDescriptor>, IngestError> {
        let files = self.find_tool_files(owner, repo, readme_path).await?;
        debug!(repo = %format!("{}/{}", owner, repo), files = files.len(), "tool files found");

        let client = &self.source;
        let mut source = String::new();
        for file in &files {
            let text = with_rate_limit(&self.policy, "tool source", move || {
                client.get_contents(&file.owner, &file.repo, &file.path)
            })
            .await
            .map_err(|source| BackfillError::Fetch {
                path: file.path.clone(),
                source,
            })?;
            source.push_str(&format!("// File: {}\n{}\n\n", file.path, text));
            if source.len() >= self.config.max_source_bytes {
                break;
            }
        }
        truncate_at_char_boundary(&mut source, self.config.max_source_bytes);

        let reply = self
            .oracle
            .complete_json(&tools_prompt(&source, readme))
            .await
            .map_err(BackfillError::from)?;
        let tools = parse_tools(&reply).map_err(BackfillError::from)?;

        info!(
            repo = %format!("{}/{}", owner, repo),
            path = readme_path,
            tools = tools.len(),
            "tool definitions extracted"
        );
        Ok(tools)
    }
}

fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
