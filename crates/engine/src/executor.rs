//! Resilient query execution.
//!
//! [`QueryExecutor`] wraps a [`Transport`] with:
//!
//! - a per-attempt deadline ([`ExecutorConfig::timeout`]);
//! - a bounded retry budget for transient failures, with exponential
//!   back-off capped at [`MAX_BACKOFF`] plus up to 10% jitter;
//! - unbounded, server-directed waits for rate limits (these never consume
//!   the retry budget; callers needing a ceiling wrap `execute` in
//!   `tokio::time::timeout`);
//! - read-through caching of requests marked cacheable;
//! - optional outcome recording into a [`SessionManager`].
//!
//! Every retry and every rate-limit wait is logged at `warn` before the
//! executor sleeps.

use std::sync::Arc;
use std::time::Duration;

use protocol::{ExecutorConfig, Request, Response, RetryPolicy, ToolkitError, Transport};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::cache::ResponseCache;
use crate::session::SessionManager;

/// Upper bound on the back-off delay between bounded attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter, as a fraction of the exponential delay.
const JITTER_FRACTION: f64 = 0.1;

/// Executes GraphQL requests with retry, rate-limit handling and caching.
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<ResponseCache>>,
    session: Option<Arc<SessionManager>>,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl QueryExecutor {
    /// Creates an executor with no cache and no session attached.
    pub fn new(config: &ExecutorConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            session: None,
            timeout: config.timeout,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        }
    }

    /// Serves cacheable requests from `cache` and stores their results in it.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Records every `execute` outcome in `session`.
    #[must_use]
    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    /// Returns the attached cache.
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Returns the attached session.
    pub fn session(&self) -> Option<&Arc<SessionManager>> {
        self.session.as_ref()
    }

    /// Executes `request`.
    ///
    /// Cacheable requests with a live cache entry return without touching the
    /// transport. Otherwise the transport is called until it succeeds, a
    /// non-retryable error occurs, or `retry_attempts + 1` bounded attempts
    /// have failed, in which case the last error is returned. A 2xx envelope
    /// with `errors` fails immediately with one aggregated
    /// [`ToolkitError::GraphQl`].
    #[instrument(skip_all, fields(operation = %request.operation_name()))]
    pub async fn execute(&self, request: &Request) -> Result<Response, ToolkitError> {
        let started = Instant::now();
        let result = self.execute_cached(request).await;
        if let Some(session) = &self.session {
            session.record_operation(
                request.operation_name().clone(),
                result.is_ok(),
                started.elapsed(),
            );
        }
        result
    }

    /// Drops the cached result of `request`, returning `true` if one existed.
    pub fn invalidate(&self, request: &Request) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|cache| cache.invalidate(&request.cache_key()))
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    async fn execute_cached(&self, request: &Request) -> Result<Response, ToolkitError> {
        let cache = self.cache.as_ref().filter(|_| request.is_cacheable());
        let Some(cache) = cache else {
            return self.send_with_retry(request).await;
        };

        let key = request.cache_key();
        if let Some(hit) = cache.get(&key) {
            debug!("served from cache");
            return Ok(hit);
        }
        let response = self.send_with_retry(request).await?;
        cache.insert(key, response.clone());
        Ok(response)
    }

    async fn send_with_retry(&self, request: &Request) -> Result<Response, ToolkitError> {
        let max_attempts = self.retry_attempts.saturating_add(1);
        let mut attempt: u32 = 0;
        let mut last_error: Option<ToolkitError> = None;

        while attempt < max_attempts {
            let err = match self.send_once(request).await {
                Ok(response) => return response.into_result(),
                Err(err) => err,
            };

            match err.retry_policy() {
                RetryPolicy::Retryable { after: Some(wait) } => {
                    warn!(
                        attempt = attempt + 1,
                        retry_after_secs = wait.as_secs(),
                        "rate limited; waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                RetryPolicy::Retryable { after: None } => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        error!(attempts = attempt, error = %err, "retry budget exhausted");
                        last_error = Some(err);
                        break;
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient failure; retrying"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
                RetryPolicy::NonRetryable => {
                    warn!(error = %err, "non-retryable failure");
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ToolkitError::Internal {
            message: "retry loop ended without a response or an error".to_string(),
        }))
    }

    async fn send_once(&self, request: &Request) -> Result<Response, ToolkitError> {
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ToolkitError::Timeout {
                timeout: self.timeout,
            }),
        }
    }

    /// `min(retry_delay * 2^attempt + jitter, MAX_BACKOFF)` for the zero-based
    /// `attempt` that just failed.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .retry_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF);
        let jitter = exponential.mul_f64(rand::rng().random_range(0.0..=JITTER_FRACTION));
        exponential.saturating_add(jitter).min(MAX_BACKOFF)
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl Transport for NeverCalled {
        async fn send(&self, _: &Request) -> Result<Response, ToolkitError> {
            unreachable!("transport must not be called")
        }
    }

    fn executor(retry_delay: Duration) -> QueryExecutor {
        let mut config = ExecutorConfig::new("key", "http://localhost/graphql");
        config.retry_delay = retry_delay;
        QueryExecutor::new(&config, Arc::new(NeverCalled))
    }

    #[test]
    fn backoff_doubles_within_jitter_bounds() {
        let executor = executor(Duration::from_millis(1000));
        for (attempt, base_ms) in [(0u32, 1000u64), (1, 2000), (2, 4000), (3, 8000)] {
            let delay = executor.backoff_delay(attempt);
            let base = Duration::from_millis(base_ms);
            assert!(delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
            assert!(
                delay <= base.mul_f64(1.0 + JITTER_FRACTION),
                "attempt {attempt}: {delay:?} exceeds jitter bound"
            );
        }
    }

    #[test]
    fn backoff_is_capped() {
        let executor = executor(Duration::from_secs(10));
        assert_eq!(executor.backoff_delay(5), MAX_BACKOFF);
        assert_eq!(executor.backoff_delay(40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn cache_hit_skips_transport() {
        let cache = Arc::new(ResponseCache::default());
        let executor = executor(Duration::from_millis(1)).with_cache(cache.clone());
        let request = Request::new("query Viewer { viewer { id } }").cacheable();
        cache.insert(request.cache_key(), Response::from_data(serde_json::json!({"id": 1})));

        let response = executor.execute(&request).await.unwrap();
        assert_eq!(response.data, Some(serde_json::json!({"id": 1})));

        assert!(executor.invalidate(&request));
        assert!(cache.is_empty());
    }
}
