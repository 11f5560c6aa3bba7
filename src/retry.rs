//! Bounded rate-limit retry for code-hosting calls.
//!
//! A throttled call sleeps until the provider's reset time (clamped to
//! `max_wait_secs`) or, when no reset time was reported, an exponential
//! backoff. After `max_attempts` throttled attempts the call fails with
//! [`SearchError::RetriesExhausted`]. Any other error returns immediately.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use mcp_catalog_core::source::SearchError;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_wait: Duration,
    pub fallback_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            max_wait: Duration::from_secs(config.max_wait_secs),
            fallback_backoff: Duration::from_secs(config.fallback_backoff_secs),
        }
    }

    /// How long to wait before retry number `attempt` (1-based).
    pub fn wait_for(
        &self,
        reset_at: Option<DateTime<Utc>>,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Duration {
        let wait = match reset_at {
            // One extra second so the quota has actually refilled.
            Some(reset) => (reset - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .saturating_add(Duration::from_secs(1)),
            None => self
                .fallback_backoff
                .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(10)),
        };
        wait.min(self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op` until it stops being rate limited or the policy gives up.
pub async fn with_rate_limit<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, SearchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(SearchError::RateLimited { reset_at }) => {
                if attempt >= policy.max_attempts {
                    return Err(SearchError::RetriesExhausted { attempts: attempt });
                }
                let wait = policy.wait_for(reset_at, attempt, Utc::now());
                warn!(
                    call = what,
                    attempt,
                    wait_secs = wait.as_secs(),
                    "rate limited, waiting for reset"
                );
                tokio::time::sleep(wait).await;
            }
            other => return other,
        }
    }
}
