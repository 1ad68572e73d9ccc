//! Scripted search backend for tests across the workspace.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use touchline_core::error::{SearchError, SearchErrorKind};
use touchline_core::grounding::Source;

use crate::google_search::SearchBackend;

/// A [`SearchBackend`] that replays scripted results and counts calls.
///
/// Scripted entries are consumed in order; once the script is empty every
/// call returns the fallback.
pub struct ScriptedSearchBackend {
    script: Mutex<VecDeque<Result<Vec<Source>, SearchError>>>,
    fallback: Result<Vec<Source>, SearchError>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
    configured: bool,
}

impl ScriptedSearchBackend {
    fn build(
        script: Vec<Result<Vec<Source>, SearchError>>,
        fallback: Result<Vec<Source>, SearchError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            delay: None,
            configured: true,
        }
    }

    /// Always return `sources`.
    pub fn returning(sources: Vec<Source>) -> Self {
        Self::build(Vec::new(), Ok(sources))
    }

    /// Always fail with `kind`.
    pub fn failing(kind: SearchErrorKind) -> Self {
        Self::build(Vec::new(), Err(SearchError::new(kind, "scripted failure")))
    }

    /// Replay `script`, then return no results.
    pub fn with_script(script: Vec<Result<Vec<Source>, SearchError>>) -> Self {
        Self::build(script, Ok(Vec::new()))
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report missing credentials.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearchBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn search(&self, query: &str, num: usize) -> Result<Vec<Source>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push(query.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        next.map(|mut sources| {
            sources.truncate(num);
            sources
        })
    }
}

/// A small mixed-tier result set.
pub fn sample_sources() -> Vec<Source> {
    vec![
        Source {
            title: "Transfer rumours roundup".into(),
            snippet: "All the latest gossip.".into(),
            link: "https://www.football-blog.example/rumours".into(),
            display_link: "www.football-blog.example".into(),
        },
        Source {
            title: "Arsenal fixtures 2025/26".into(),
            snippet: "Upcoming Arsenal matches.".into(),
            link: "https://www.bbc.co.uk/sport/football/teams/arsenal/scores-fixtures".into(),
            display_link: "www.bbc.co.uk".into(),
        },
        Source {
            title: "Premier League fixtures".into(),
            snippet: "Official fixture list.".into(),
            link: "https://www.premierleague.com/fixtures".into(),
            display_link: "www.premierleague.com".into(),
        },
    ]
}
