//! OpenAI chat-completions implementation of [`ExtractionOracle`].
//!
//! Every request asks for `response_format: json_object`, so the returned
//! message content should be a single JSON object. Callers still validate it.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use mcp_catalog_core::oracle::{ExtractionOracle, OracleError};

use crate::config::OracleConfig;

pub struct OpenAiOracle {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig, api_key: String) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("OPENAI_API_KEY must not be empty");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// Build the oracle from `OPENAI_API_KEY`.
    pub fn from_env(config: &OracleConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::new(config, api_key)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn message_content(json: &serde_json::Value) -> Result<String, OracleError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(content.to_string())
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn complete_json(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| OracleError::Malformed(e.to_string()))?;
                        debug!(model = %self.model, attempt, "extraction completed");
                        return message_content(&json);
                    }

                    let message = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 {
                        warn!(attempt, "extraction service rate limited");
                        last_err = Some(OracleError::RateLimited);
                        continue;
                    }
                    if status.is_server_error() {
                        warn!(attempt, status = status.as_u16(), "extraction service error");
                        last_err = Some(OracleError::Api {
                            status: status.as_u16(),
                            message,
                        });
                        continue;
                    }

                    return Err(OracleError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "extraction request failed");
                    last_err = Some(OracleError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or(OracleError::EmptyResponse))
    }
}
