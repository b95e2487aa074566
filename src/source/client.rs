//! HTTP block source with bounded retries and exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::collector::BlockSource;
use crate::source::SourceError;
use crate::source::parser::parse_block;
use crate::storage::Block;

/// Default per-attempt request timeout (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total attempts per fetch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base; the delay after attempt `n` is `base * 2^n`.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default health probe timeout (5 seconds).
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_USER_AGENT: &str = concat!("blockwatch/", env!("CARGO_PKG_VERSION"));

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base() -> Duration {
    DEFAULT_BACKOFF_BASE
}

fn default_health_timeout() -> Duration {
    DEFAULT_HEALTH_TIMEOUT
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Configuration for the block source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Endpoint returning the latest block as JSON.
    pub url: String,
    /// Timeout for each attempt (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Total attempts before giving up (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base (default: 1s, giving 2s, 4s, ... between attempts).
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    /// Health probe timeout (default: 5s).
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SourceConfig {
    /// Create a source configuration with default timing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff base.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Failure of a single attempt.
enum AttemptError {
    /// Worth retrying: transport error, timeout or non-2xx status.
    Transient(String),
    /// Not worth retrying: the payload itself is unusable.
    Parse(SourceError),
}

/// HTTP client fetching the latest block from the configured endpoint.
pub struct SourceClient {
    config: SourceConfig,
    client: Client,
}

impl std::fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SourceClient {
    /// Create a new source client.
    ///
    /// # Errors
    /// Returns `SourceError::Client` if the HTTP client cannot be built.
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Client(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Fetch and parse the latest block.
    ///
    /// Transport failures and non-2xx responses are retried up to
    /// `max_attempts` total, sleeping `backoff_base * 2^attempt` between
    /// attempts. A payload that parses as JSON but carries no recognizable
    /// block is returned as [`SourceError::Parse`] immediately.
    pub async fn fetch_latest(&self) -> Result<Block, SourceError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            tracing::debug!(
                url = %self.config.url,
                attempt,
                max_attempts,
                "Fetching latest block"
            );

            match self.fetch_once().await {
                Ok(block) => {
                    tracing::debug!(block_number = block.block_number, "Fetched block");
                    return Ok(block);
                }
                // Not retried: the same payload would fail to parse again.
                Err(AttemptError::Parse(e)) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Unrecognized source payload");
                    return Err(e);
                }
                Err(AttemptError::Transient(e)) => {
                    tracing::warn!(url = %self.config.url, attempt, error = %e, "Fetch attempt failed");
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                let delay = self.config.backoff_delay(attempt);
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            url = %self.config.url,
            attempts = max_attempts,
            error = %last_error,
            "All fetch attempts failed"
        );
        Err(SourceError::Unreachable {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Best-effort reachability probe: true iff the endpoint answers 200.
    pub async fn check_health(&self) -> bool {
        let request = self.client.get(&self.config.url).send();
        match timeout(self.config.health_timeout, request).await {
            Ok(Ok(response)) => response.status() == reqwest::StatusCode::OK,
            Ok(Err(e)) => {
                tracing::warn!(url = %self.config.url, error = %e, "Source health check failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    url = %self.config.url,
                    timeout_ms = self.config.health_timeout.as_millis() as u64,
                    "Source health check timed out"
                );
                false
            }
        }
    }

    async fn fetch_once(&self) -> Result<Block, AttemptError> {
        let request = self
            .client
            .get(&self.config.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send();

        let response = match timeout(self.config.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AttemptError::Transient(e.to_string())),
            Err(_) => {
                return Err(AttemptError::Transient(format!(
                    "request timed out after {:?}",
                    self.config.timeout
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Transient(format!("HTTP status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            AttemptError::Parse(SourceError::Parse(format!("response is not JSON: {e}")))
        })?;

        parse_block(&payload, Utc::now().timestamp()).map_err(AttemptError::Parse)
    }
}

#[async_trait]
impl BlockSource for SourceClient {
    async fn fetch_latest(&self) -> Result<Block, SourceError> {
        SourceClient::fetch_latest(self).await
    }

    async fn check_health(&self) -> bool {
        SourceClient::check_health(self).await
    }
}
