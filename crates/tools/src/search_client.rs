//! Search Client — caching, retrying wrapper around a [`SearchBackend`].
//!
//! Results are cached by normalized query text for the configured TTL. A
//! cache hit never reaches the backend, and concurrent searches for the
//! same key share one backend load. Failures are never cached.

use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use touchline_config::SearchConfig;
use touchline_core::error::{SearchError, SearchErrorKind};
use touchline_core::grounding::Source;
use tracing::{debug, info};

use crate::google_search::SearchBackend;
use crate::retry::{RetryPolicy, retry_async};

/// The result of one logical search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query: String,
    pub sources: Vec<Source>,
    /// Served from cache, or from another caller's in-flight load, without
    /// calling the backend
    pub cache_hit: bool,
    /// Backend attempts made by this call (0 on a cache hit)
    pub attempts: u32,
}

pub struct SearchClient {
    backend: Arc<dyn SearchBackend>,
    cache: Cache<String, Arc<Vec<Source>>>,
    retry: RetryPolicy,
    /// Bound on each backend attempt, whatever the backend's own client does
    attempt_timeout: Duration,
    max_results: usize,
    upstream_calls: AtomicU64,
}

impl SearchClient {
    pub fn new(backend: Arc<dyn SearchBackend>, config: &SearchConfig) -> Self {
        Self {
            backend,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .max_capacity(config.cache_capacity)
                .build(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.initial_backoff_ms),
                Duration::from_millis(config.max_backoff_ms),
            ),
            attempt_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_results: config.max_results,
            upstream_calls: AtomicU64::new(0),
        }
    }

    /// Cache key for a query: lower-cased with whitespace collapsed.
    pub fn normalize_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Total backend calls made, including retries.
    pub fn upstream_calls(&self) -> u64 {
        self.upstream_calls.load(Ordering::Relaxed)
    }

    pub async fn search(&self, query: &str) -> Result<SearchOutcome, SearchError> {
        let key = Self::normalize_query(query);
        if key.is_empty() {
            return Err(SearchError::new(SearchErrorKind::MalformedQuery, "empty query"));
        }

        let attempts = AtomicU32::new(0);
        let entry = self
            .cache
            .entry(key.clone())
            .or_try_insert_with(async {
                if !self.backend.is_configured() {
                    return Err(SearchError::new(
                        SearchErrorKind::NotConfigured,
                        "search credentials are not configured",
                    ));
                }
                let (sources, made) = retry_async(&self.retry, |_| {
                    self.upstream_calls.fetch_add(1, Ordering::Relaxed);
                    self.attempt(&key)
                })
                .await?;
                attempts.store(made, Ordering::Relaxed);
                Ok::<_, SearchError>(Arc::new(sources))
            })
            .await
            .map_err(Arc::unwrap_or_clone)?;

        let cache_hit = !entry.is_fresh();
        let attempts = attempts.load(Ordering::Relaxed);
        let sources = entry.into_value().as_ref().clone();
        if cache_hit {
            debug!(query = %key, cache = "hit", results = sources.len(), "Search served from cache");
        } else {
            info!(query = %key, cache = "miss", results = sources.len(), attempts, "Search completed");
        }

        Ok(SearchOutcome {
            query: key,
            sources,
            cache_hit,
            attempts,
        })
    }

    async fn attempt(&self, key: &str) -> Result<Vec<Source>, SearchError> {
        match tokio::time::timeout(self.attempt_timeout, self.backend.search(key, self.max_results)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::new(
                SearchErrorKind::Timeout,
                format!("no response within {}s", self.attempt_timeout.as_secs()),
            )),
        }
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}
