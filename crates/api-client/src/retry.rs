use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Retry policy for task-creation POST requests. Streaming requests are
/// never retried here; reconnecting a stream is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: usize,
    /// Delay in seconds before each retry.
    pub delays: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![1, 2, 4],
        }
    }
}

impl RetryConfig {
    /// Exponential backoff (1s, 2s, 4s, ...) with `max_retries` retries.
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            delays: (0..max_retries).map(|i| 1u64 << i.min(6)).collect(),
        }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delays: Vec::new(),
        }
    }

    fn delay_for(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        self.delays.get(attempt).map(|secs| Duration::from_secs(*secs))
    }
}

/// POST `body` as JSON, retrying network errors and 5xx responses.
///
/// Returns immediately on success or 4xx. The last 5xx response is returned
/// as-is once retries run out.
pub async fn retry_post(
    client: &reqwest::Client,
    url: &str,
    auth_token: Option<&str>,
    body: &serde_json::Value,
    config: &RetryConfig,
) -> Result<reqwest::Response> {
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        let mut req = client.post(url).header("Content-Type", "application/json");
        if let Some(token) = auth_token {
            req = req.bearer_auth(token);
        }

        let result = req.json(body).send().await;
        let delay = config.delay_for(attempt);
        match (result, delay) {
            (Ok(resp), Some(delay)) if resp.status().is_server_error() => {
                warn!(
                    "POST attempt {}/{} failed (HTTP {}), retrying in {}s",
                    attempt + 1,
                    max_attempts,
                    resp.status(),
                    delay.as_secs(),
                );
                tokio::time::sleep(delay).await;
            }
            (Ok(resp), _) => return Ok(resp),
            (Err(e), Some(delay)) => {
                warn!(
                    "POST attempt {}/{} failed ({}), retrying in {}s",
                    attempt + 1,
                    max_attempts,
                    e,
                    delay.as_secs(),
                );
                tokio::time::sleep(delay).await;
            }
            (Err(e), None) => {
                return Err(e).context(format!("Failed to reach {url} after {attempt} retries"));
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::RetryConfig;
    use std::time::Duration;

    #[test]
    fn backoff_doubles() {
        let config = RetryConfig::with_max_retries(4);
        assert_eq!(config.delays, vec![1, 2, 4, 8]);
        assert_eq!(config.delay_for(3), Some(Duration::from_secs(8)));
        assert_eq!(config.delay_for(4), None);
    }

    #[test]
    fn none_never_retries() {
        assert_eq!(RetryConfig::none().delay_for(0), None);
    }
}
