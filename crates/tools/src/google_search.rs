//! Web search backends.
//!
//! [`SearchBackend`] is one raw call to a search provider, with no caching
//! or retry. [`GoogleSearchBackend`] speaks the Google Custom Search JSON API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use touchline_config::SearchConfig;
use touchline_core::error::{SearchError, SearchErrorKind};
use touchline_core::grounding::Source;
use tracing::debug;

/// A single-shot web search call.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool {
        true
    }

    /// Return up to `num` results for `query`. An empty list is not an error.
    async fn search(&self, query: &str, num: usize) -> Result<Vec<Source>, SearchError>;
}

/// Google Custom Search JSON API.
pub struct GoogleSearchBackend {
    endpoint: String,
    api_key: Option<String>,
    engine_id: Option<String>,
    safe_search: bool,
    client: reqwest::Client,
}

impl GoogleSearchBackend {
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                SearchError::new(
                    SearchErrorKind::Network,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            safe_search: config.safe_search,
            client,
        })
    }
}

/// Map an HTTP status from the search provider to an error kind.
fn classify_status(status: u16) -> SearchErrorKind {
    match status {
        401 | 403 => SearchErrorKind::Authentication,
        429 => SearchErrorKind::RateLimited,
        400 | 404 | 413 | 414 => SearchErrorKind::MalformedQuery,
        500..=599 => SearchErrorKind::Upstream5xx,
        _ => SearchErrorKind::Decode,
    }
}

fn classify_send_error(e: &reqwest::Error) -> SearchErrorKind {
    if e.is_timeout() {
        SearchErrorKind::Timeout
    } else {
        SearchErrorKind::Network
    }
}

#[async_trait]
impl SearchBackend for GoogleSearchBackend {
    fn name(&self) -> &str {
        "google_custom_search"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }

    async fn search(&self, query: &str, num: usize) -> Result<Vec<Source>, SearchError> {
        let (Some(key), Some(cx)) = (&self.api_key, &self.engine_id) else {
            return Err(SearchError::new(
                SearchErrorKind::NotConfigured,
                "search API key or engine id is not set",
            ));
        };
        if query.trim().is_empty() {
            return Err(SearchError::new(SearchErrorKind::MalformedQuery, "empty query"));
        }

        let num = num.clamp(1, 10).to_string();
        let mut params = vec![
            ("key", key.as_str()),
            ("cx", cx.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ];
        if self.safe_search {
            params.push(("safe", "active"));
        }

        debug!(query, "Calling Google Custom Search");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| SearchError::new(classify_send_error(&e), e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(SearchError::rate_limited(retry_after));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::new(
                classify_status(status),
                format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            ));
        }

        let parsed: CseResponse = response
            .json()
            .await
            .map_err(|e| SearchError::new(SearchErrorKind::Decode, e.to_string()))?;

        Ok(parsed.into_sources())
    }
}

// --- Custom Search API types (internal) ---

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    display_link: String,
}

impl CseResponse {
    fn into_sources(self) -> Vec<Source> {
        self.items
            .into_iter()
            .filter(|i| !i.link.is_empty())
            .map(|i| Source {
                title: i.title,
                snippet: i.snippet.replace('\n', " "),
                link: i.link,
                display_link: i.display_link,
            })
            .collect()
    }
}
