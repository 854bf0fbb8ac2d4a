use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use confcloud_core::{AppConfig, SourceConfig};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, ScienceError};

// ─── SourceTag ────────────────────────────────────────────────────────────────

/// External services the engine talks to. Each tag owns one rate limiter,
/// shared by every adapter and task that calls that service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceTag {
    OpenReview,
    OpenAlex,
    SemanticScholar,
    Proceedings,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenReview => "openreview",
            Self::OpenAlex => "openalex",
            Self::SemanticScholar => "semantic_scholar",
            Self::Proceedings => "proceedings",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── RequestPolicy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPolicy {
    pub min_interval: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RequestPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Exponential backoff before retry `attempt` (1-based): base, 2·base, 4·base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(factor)
    }

    /// Wait before retry `attempt`. A server's `Retry-After` can stretch the
    /// backoff but never past `timeout × max_retries`.
    pub fn retry_wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        let ceiling = self
            .timeout
            .saturating_mul(self.max_retries.max(1))
            .max(backoff);
        retry_after.map_or(backoff, |ra| ra.max(backoff)).min(ceiling)
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

// ─── RateLimiter ──────────────────────────────────────────────────────────────

/// Minimum spacing between the *starts* of consecutive calls. A caller that
/// arrives after the interval has already elapsed proceeds immediately.
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

struct SourceLane {
    policy: RequestPolicy,
    limiter: RateLimiter,
}

pub struct RateLimitedClient {
    client: reqwest::Client,
    lanes: HashMap<SourceTag, SourceLane>,
}

impl RateLimitedClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            lanes: HashMap::new(),
        })
    }

    /// Client with one lane per configured source.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let sources = &config.sources;
        Ok(Self::new(&config.enrichment.user_agent)?
            .with_source(
                SourceTag::OpenReview,
                RequestPolicy::from_config(&sources.openreview),
            )
            .with_source(
                SourceTag::OpenAlex,
                RequestPolicy::from_config(&sources.openalex),
            )
            .with_source(
                SourceTag::SemanticScholar,
                RequestPolicy::from_config(&sources.semantic_scholar),
            )
            .with_source(
                SourceTag::Proceedings,
                RequestPolicy::from_config(&sources.proceedings),
            ))
    }

    pub fn with_source(mut self, tag: SourceTag, policy: RequestPolicy) -> Self {
        let limiter = RateLimiter::new(policy.min_interval);
        self.lanes.insert(tag, SourceLane { policy, limiter });
        self
    }

    pub fn policy(&self, tag: SourceTag) -> Option<&RequestPolicy> {
        self.lanes.get(&tag).map(|lane| &lane.policy)
    }

    pub async fn get(&self, tag: SourceTag, url: &str) -> Result<String> {
        self.get_with_headers(tag, url, HeaderMap::new()).await
    }

    /// GET through the source's limiter, retrying timeouts, 5xx and 429 with
    /// backoff. 404 comes back as [`ScienceError::NotFound`] without retry.
    pub async fn get_with_headers(
        &self,
        tag: SourceTag,
        url: &str,
        headers: HeaderMap,
    ) -> Result<String> {
        let lane = self.lanes.get(&tag).ok_or_else(|| {
            ScienceError::Configuration(format!("no request policy registered for {tag}"))
        })?;

        let mut attempt = 0u32;
        loop {
            lane.limiter.acquire().await;
            let resp = self
                .client
                .get(url)
                .headers(headers.clone())
                .timeout(lane.policy.timeout)
                .send()
                .await;

            let mut retry_after = None;
            let err = match resp {
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(ScienceError::NotFound(url.to_string()));
                }
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    retry_after = wait.map(Duration::from_secs);
                    ScienceError::RateLimit(tag.to_string(), wait.unwrap_or(0))
                }
                Ok(r) if r.status().is_server_error() => {
                    ScienceError::Transient(format!("HTTP {} from {url}", r.status().as_u16()))
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => match r.text().await {
                    Ok(text) => return Ok(text),
                    Err(e) => ScienceError::from_request(url, e),
                },
                Err(e) => ScienceError::from_request(url, e),
            };

            if !err.is_retryable() || attempt >= lane.policy.max_retries {
                return Err(err);
            }
            attempt += 1;
            let wait = lane.policy.retry_wait(attempt, retry_after);
            debug!(
                "{tag}: attempt {attempt}/{} failed: {err}, retrying in {wait:?}",
                lane.policy.max_retries
            );
            sleep(wait).await;
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, tag: SourceTag, url: &str) -> Result<T> {
        let text = self.get(tag, url).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn test_policy() -> RequestPolicy {
    RequestPolicy {
        min_interval: Duration::ZERO,
        timeout: Duration::from_secs(5),
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
    }
}
