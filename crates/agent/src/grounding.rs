//! Grounding Engine — decides from an agent's draft whether to search, and
//! synthesizes the final reply when it does.
//!
//! Phase A looks only at the *draft*: an explicit admission of missing or
//! out-of-date knowledge. Dates or words like "latest" in the user's own
//! question never trigger a search.
//!
//! Phase B builds a query, calls the [`SearchClient`], ranks and deduplicates
//! the sources, and appends them to the draft. Search failure never fails
//! the turn: the draft is returned with a short note instead.

use std::sync::Arc;
use touchline_core::conversation::{ContextSlots, slots};
use touchline_core::error::{SearchError, SearchErrorKind};
use touchline_core::event::{Event, EventKind};
use touchline_core::grounding::{GroundingDecision, GroundingReason, Source};
use touchline_core::text::{contains_phrase, first_match, normalize};
use touchline_tools::{SearchClient, SearchOutcome};
use tracing::{info, warn};

/// Phrases in a draft that admit the agent lacks current information.
pub const ADMISSIONS: &[&str] = &[
    "i don't have information about",
    "i do not have information about",
    "i don't have access to",
    "i don't have current",
    "i don't have up to date",
    "i don't have recent",
    "i don't have real time",
    "i don't have the latest",
    "i don't know",
    "i cannot provide",
    "i'm unable to provide current",
    "as of my knowledge cutoff",
    "as of my last update",
    "my knowledge cutoff",
    "not available in my training data",
];

pub const UNAVAILABLE_NOTE: &str = "(Note: Unable to fetch the latest information at this time.)";
pub const BUSY_NOTE: &str =
    "(Note: Live search is busy right now, so this may not include the latest information.)";
pub const SOURCES_HEADING: &str = "Latest from the web:";

/// Tier 0: official competition, governing-body, and club sites.
const OFFICIAL_HOSTS: &[&str] = &[
    "premierleague.com",
    "efl.com",
    "thefa.com",
    "englandfootball.com",
    "wbcboxing.com",
    "boxrec.com",
];
const OFFICIAL_SUFFIXES: &[&str] = &["fc.com", "fc.co.uk"];

/// Tier 1: major sports outlets.
const MAJOR_OUTLETS: &[&str] = &[
    "bbc.co.uk",
    "bbc.com",
    "skysports.com",
    "theguardian.com",
    "espn.co.uk",
    "espn.com",
    "telegraph.co.uk",
    "independent.co.uk",
];

/// Phrases standing in for the user's team.
const TEAM_REFERENCES: &[&str] = &[
    "my favourite team",
    "my favorite team",
    "my team",
    "my club",
];
const PRONOUNS: &[&str] = &["they", "them", "their", "he", "him", "his"];

const SNIPPET_CHARS: usize = 160;

/// The admission phrase in `draft`, if any.
pub fn find_admission(draft: &str) -> Option<&'static str> {
    first_match(&normalize(draft), ADMISSIONS.iter().copied())
}

/// Host of a URL, lower-cased, without `www.` or a port.
fn host_of(link: &str) -> String {
    let rest = link.split_once("://").map_or(link, |(_, r)| r);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default().to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Ranking tier for a source link: 0 official, 1 major outlet, 2 anything else.
pub fn source_tier(link: &str) -> u8 {
    let host = host_of(link);
    if OFFICIAL_HOSTS.iter().any(|d| host_matches(&host, d))
        || OFFICIAL_SUFFIXES.iter().any(|s| host.ends_with(s))
    {
        0
    } else if MAJOR_OUTLETS.iter().any(|d| host_matches(&host, d)) {
        1
    } else {
        2
    }
}

/// Canonical form of a link for deduplication: lower-cased scheme and host,
/// `www.` stripped, fragment and `utm_*` parameters removed, no trailing `/`.
pub fn normalize_link(link: &str) -> String {
    let link = link.trim();
    let without_fragment = link.split('#').next().unwrap_or_default();
    let (base, query) = match without_fragment.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (without_fragment, None),
    };

    let (scheme, rest) = match base.split_once("://") {
        Some((s, r)) => (s.to_lowercase(), r),
        None => (String::new(), base),
    };
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut out = if scheme.is_empty() {
        format!("{host}{path}")
    } else {
        format!("{scheme}://{host}{path}")
    };

    let kept: Vec<&str> = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter(|p| !p.is_empty() && !p.to_lowercase().starts_with("utm_"))
        .collect();
    while out.ends_with('/') {
        out.pop();
    }
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    out
}

/// Stable sort by tier, drop duplicate links (the higher-ranked copy wins),
/// and keep at most `limit`.
pub fn rank_sources(sources: Vec<Source>, limit: usize) -> Vec<Source> {
    let mut ranked = sources;
    ranked.sort_by_key(|s| source_tier(&s.link));
    let mut seen = std::collections::HashSet::new();
    ranked
        .into_iter()
        .filter(|s| seen.insert(normalize_link(&s.link)))
        .take(limit)
        .collect()
}

fn one_line(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}

/// The draft followed by a compact list of sources.
pub fn synthesize(draft: &str, sources: &[Source]) -> String {
    let mut reply = format!("{}\n\n{SOURCES_HEADING}", draft.trim_end());
    for (i, source) in sources.iter().enumerate() {
        reply.push_str(&format!(
            "\n{}. {} - {} ({})",
            i + 1,
            source.title.trim(),
            one_line(&source.snippet),
            source.link
        ));
    }
    reply
}

/// The subject of an admission, e.g. "future fixtures" from
/// "I don't have information about future fixtures."
fn admission_subject(draft: &str, admission: &str) -> Option<String> {
    let normalized = normalize(draft);
    let start = normalized.find(admission)? + admission.len();
    let subject: Vec<&str> = normalized[start..].split(' ').filter(|w| !w.is_empty()).take(6).collect();
    (!subject.is_empty()).then(|| subject.join(" "))
}

/// Inputs to one grounding pass.
#[derive(Debug, Clone, Copy)]
pub struct GroundingRequest<'a> {
    pub agent: &'a str,
    pub draft: &'a str,
    pub user_text: &'a str,
    pub context: &'a ContextSlots,
}

#[derive(Debug, Clone)]
pub struct GroundingOutcome {
    pub reply: String,
    pub decision: GroundingDecision,
    /// Events to append, in order
    pub events: Vec<Event>,
}

pub struct GroundingEngine {
    search: Arc<SearchClient>,
    default_agent: String,
    max_sources: usize,
}

impl GroundingEngine {
    pub fn new(search: Arc<SearchClient>, default_agent: impl Into<String>) -> Self {
        let max_sources = search.max_results();
        Self {
            search,
            default_agent: default_agent.into(),
            max_sources,
        }
    }

    pub fn search_client(&self) -> &SearchClient {
        &self.search
    }

    /// Build the search query from the user's text, resolving references to
    /// the user's team from context and scoping it to the agent's topic.
    pub fn build_query(&self, request: &GroundingRequest<'_>, admission: &str) -> String {
        let mut query = request
            .user_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end_matches(['?', '!', '.'])
            .to_string();
        let mut normalized = normalize(&query);

        if let Some(team) = request.context.get(slots::FAVORITE_TEAM) {
            if let Some(reference) = first_match(&normalized, TEAM_REFERENCES.iter().copied()) {
                let at = query.to_lowercase().find(reference);
                if let Some(at) = at.filter(|&at| {
                    query
                        .get(at..at + reference.len())
                        .is_some_and(|s| s.eq_ignore_ascii_case(reference))
                }) {
                    query.replace_range(at..at + reference.len(), team);
                }
            } else if !contains_phrase(&normalized, &team.to_lowercase())
                && first_match(&normalized, PRONOUNS.iter().copied()).is_some()
            {
                query.push(' ');
                query.push_str(team);
            }
            normalized = normalize(&query);
        }

        if normalized.split(' ').filter(|w| !w.is_empty()).count() < 3 {
            if let Some(subject) = admission_subject(request.draft, admission) {
                query.push(' ');
                query.push_str(&subject);
                normalized = normalize(&query);
            }
        }

        if !self.is_default(request.agent) && !contains_phrase(&normalized, &normalize(request.agent)) {
            query.push(' ');
            query.push_str(request.agent);
        }
        query
    }

    fn is_default(&self, agent: &str) -> bool {
        agent == self.default_agent
    }

    pub async fn ground(&self, request: GroundingRequest<'_>) -> GroundingOutcome {
        if self.is_default(request.agent) {
            return Self::skip(request, GroundingReason::TriageAgent);
        }
        let Some(admission) = find_admission(request.draft) else {
            return Self::skip(request, GroundingReason::NoAdmission);
        };

        let query = self.build_query(&request, admission);
        info!(agent = %request.agent, %admission, %query, "Grounding triggered");
        let mut events = vec![
            Event::new(
                EventKind::GroundingTriggered,
                request.agent,
                format!("Draft admitted \"{admission}\"; searching for \"{query}\""),
            )
            .with_metadata(serde_json::json!({
                "reason": format!("admission:{admission}"),
                "query": query,
            })),
        ];

        let result = self.search.search(&query).await;
        events.push(Self::search_event(request.agent, &query, &result));

        match result {
            Ok(outcome) if !outcome.sources.is_empty() => {
                let sources = rank_sources(outcome.sources, self.max_sources);
                GroundingOutcome {
                    reply: synthesize(request.draft, &sources),
                    decision: GroundingDecision {
                        triggered: true,
                        reason: GroundingReason::Grounded {
                            admission: admission.to_string(),
                        },
                        query: Some(query),
                        sources,
                        cache_hit: outcome.cache_hit,
                    },
                    events,
                }
            }
            other => {
                let (note, cache_hit) = match &other {
                    Err(SearchError {
                        kind: SearchErrorKind::RateLimited,
                        ..
                    }) => (BUSY_NOTE, false),
                    Ok(outcome) => (UNAVAILABLE_NOTE, outcome.cache_hit),
                    Err(_) => (UNAVAILABLE_NOTE, false),
                };
                GroundingOutcome {
                    reply: format!("{}\n\n{note}", request.draft.trim_end()),
                    decision: GroundingDecision {
                        triggered: true,
                        reason: GroundingReason::SearchUnavailable {
                            admission: admission.to_string(),
                        },
                        query: Some(query),
                        sources: Vec::new(),
                        cache_hit,
                    },
                    events,
                }
            }
        }
    }

    fn skip(request: GroundingRequest<'_>, reason: GroundingReason) -> GroundingOutcome {
        let event = Event::new(
            EventKind::GroundingSkipped,
            request.agent,
            format!("Grounding skipped: {}", reason.code()),
        )
        .with_metadata(serde_json::json!({ "reason": reason.code() }));
        GroundingOutcome {
            reply: request.draft.to_string(),
            decision: GroundingDecision::skipped(reason),
            events: vec![event],
        }
    }

    /// A `web_search` tool event. `cache` is "hit" or "miss" for completed
    /// searches; failed searches carry the error kind instead.
    fn search_event(
        agent: &str,
        query: &str,
        result: &Result<SearchOutcome, SearchError>,
    ) -> Event {
        match result {
            Ok(outcome) => Event::new(
                EventKind::ToolCalled,
                agent,
                format!("web_search: {} result(s) for \"{query}\"", outcome.sources.len()),
            )
            .with_metadata(serde_json::json!({
                "tool": "web_search",
                "query": query,
                "cache": if outcome.cache_hit { "hit" } else { "miss" },
                "results": outcome.sources.len(),
                "attempts": outcome.attempts,
            })),
            Err(e) => {
                warn!(%agent, %query, kind = %e.kind, "Web search failed");
                Event::new(EventKind::ToolCalled, agent, format!("web_search failed: {e}"))
                    .with_metadata(serde_json::json!({
                        "tool": "web_search",
                        "query": query,
                        "error": e.kind.as_str(),
                        "results": 0,
                    }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchline_config::SearchConfig;
    use touchline_tools::testing::{ScriptedSearchBackend, sample_sources};

    fn config() -> SearchConfig {
        SearchConfig {
            api_key: Some("k".into()),
            engine_id: Some("cx".into()),
            ..SearchConfig::default()
        }
    }

    fn engine(backend: Arc<ScriptedSearchBackend>) -> GroundingEngine {
        GroundingEngine::new(Arc::new(SearchClient::new(backend, &config())), "Triage")
    }

    fn request<'a>(agent: &'a str, draft: &'a str, user_text: &'a str, context: &'a ContextSlots) -> GroundingRequest<'a> {
        GroundingRequest {
            agent,
            draft,
            user_text,
            context,
        }
    }

    #[test]
    fn admission_detection_reads_the_draft_only() {
        assert_eq!(
            find_admission("Sorry, I don't have information about future fixtures."),
            Some("i don't have information about")
        );
        assert_eq!(
            find_admission("As of my knowledge cutoff, Fury was unbeaten."),
            Some("as of my knowledge cutoff")
        );
        assert!(find_admission("Arsenal play Chelsea on Saturday.").is_none());
        // Curly apostrophes count too
        assert!(find_admission("I don’t know the latest score").is_some());
    }

    #[test]
    fn tiers_rank_official_then_major_outlets() {
        assert_eq!(source_tier("https://www.premierleague.com/fixtures"), 0);
        assert_eq!(source_tier("https://www.arsenalfc.com/news"), 0);
        assert_eq!(source_tier("https://www.bbc.co.uk/sport"), 1);
        assert_eq!(source_tier("https://sport.bbc.co.uk/x"), 1);
        assert_eq!(source_tier("https://notbbc.co.uk/x"), 2);
        assert_eq!(source_tier("https://blog.example/post"), 2);
    }

    #[test]
    fn link_normalization() {
        assert_eq!(
            normalize_link("HTTPS://WWW.BBC.co.uk/Sport/?utm_source=x&id=7#top"),
            "https://bbc.co.uk/Sport?id=7"
        );
        assert_eq!(normalize_link("https://efl.com/"), "https://efl.com");
    }

    #[test]
    fn ranking_dedups_and_limits() {
        let mut sources = sample_sources();
        let mut dup = sources[2].clone();
        dup.link = "https://premierleague.com/fixtures/?utm_medium=feed".into();
        dup.title = "duplicate".into();
        sources.push(dup);

        let ranked = rank_sources(sources, 5);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].display_link, "www.premierleague.com");
        assert_eq!(ranked[1].display_link, "www.bbc.co.uk");
        assert!(ranked.iter().all(|s| s.title != "duplicate"));

        assert_eq!(rank_sources(sample_sources(), 2).len(), 2);
    }

    #[test]
    fn synthesis_keeps_the_draft() {
        let draft = "I don't have information about future fixtures.";
        let reply = synthesize(draft, &rank_sources(sample_sources(), 5));
        assert!(reply.starts_with(draft));
        assert!(reply.contains(SOURCES_HEADING));
        assert!(reply.contains("1. Premier League fixtures - Official fixture list. (https://www.premierleague.com/fixtures)"));
    }

    #[test]
    fn query_resolves_team_references() {
        let engine = engine(Arc::new(ScriptedSearchBackend::returning(vec![])));
        let mut context = ContextSlots::initial();
        context.set(slots::FAVORITE_TEAM, "Arsenal");

        let q = engine.build_query(
            &request("Premier League", "I don't know", "When do my team play next?", &context),
            "i don't know",
        );
        assert_eq!(q, "When do Arsenal play next Premier League");

        let q = engine.build_query(
            &request("Premier League", "I don't know", "when do they play", &context),
            "i don't know",
        );
        assert!(q.contains("Arsenal"));
    }

    #[test]
    fn vague_query_borrows_admission_subject() {
        let engine = engine(Arc::new(ScriptedSearchBackend::returning(vec![])));
        let context = ContextSlots::initial();
        let draft = "I don't have information about future fixtures for Leeds.";
        let q = engine.build_query(
            &request("Championship", draft, "And next?", &context),
            "i don't have information about",
        );
        assert_eq!(q, "And next future fixtures for leeds Championship");
    }

    #[tokio::test]
    async fn no_admission_skips_search_even_for_time_sensitive_questions() {
        let backend = Arc::new(ScriptedSearchBackend::returning(sample_sources()));
        let engine = engine(backend.clone());
        let context = ContextSlots::initial();
        let outcome = engine
            .ground(request("Premier League", "Arsenal are top of the table.", "latest 2025 standings today", &context))
            .await;

        assert!(!outcome.decision.triggered);
        assert_eq!(outcome.decision.reason, GroundingReason::NoAdmission);
        assert_eq!(outcome.reply, "Arsenal are top of the table.");
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].kind, EventKind::GroundingSkipped);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn triage_is_never_grounded() {
        let backend = Arc::new(ScriptedSearchBackend::returning(sample_sources()));
        let engine = engine(backend.clone());
        let context = ContextSlots::initial();
        let outcome = engine
            .ground(request("Triage", "I don't know, which sport?", "hi", &context))
            .await;
        assert_eq!(outcome.decision.reason, GroundingReason::TriageAgent);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn admission_triggers_search_and_synthesis() {
        let backend = Arc::new(ScriptedSearchBackend::returning(sample_sources()));
        let engine = engine(backend.clone());
        let context = ContextSlots::initial();
        let draft = "I don't have information about future fixtures.";
        let outcome = engine
            .ground(request("Premier League", draft, "When do Arsenal play next?", &context))
            .await;

        assert!(outcome.decision.triggered);
        assert_eq!(outcome.decision.reason.code(), "grounded");
        assert_eq!(outcome.decision.sources.len(), 3);
        assert_eq!(outcome.decision.sources[0].display_link, "www.premierleague.com");
        assert!(outcome.reply.starts_with(draft));
        assert_eq!(backend.calls(), 1);

        let kinds: Vec<_> = outcome.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::GroundingTriggered, EventKind::ToolCalled]);
        assert_eq!(outcome.events[1].meta_str("cache"), Some("miss"));
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let backend = Arc::new(ScriptedSearchBackend::returning(sample_sources()));
        let engine = engine(backend.clone());
        let context = ContextSlots::initial();
        let req = request("Boxing", "I don't have recent results.", "Fury next fight", &context);

        let first = engine.ground(req).await;
        let second = engine.ground(req).await;
        assert_eq!(first.events[1].meta_str("cache"), Some("miss"));
        assert_eq!(second.events[1].meta_str("cache"), Some("hit"));
        assert!(second.decision.cache_hit);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_search_is_search_unavailable() {
        let backend = Arc::new(ScriptedSearchBackend::failing(SearchErrorKind::Timeout));
        let engine = engine(backend.clone());
        let context = ContextSlots::initial();
        let draft = "I don't have information about future fixtures.";
        let outcome = engine
            .ground(request("Premier League", draft, "Arsenal fixtures", &context))
            .await;

        assert!(outcome.decision.triggered);
        assert_eq!(outcome.decision.reason.code(), "search_unavailable");
        assert!(outcome.reply.starts_with(draft));
        assert!(outcome.reply.ends_with(UNAVAILABLE_NOTE));
        assert_eq!(outcome.events[1].meta_str("error"), Some("timeout"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn empty_results_are_search_unavailable() {
        let engine = engine(Arc::new(ScriptedSearchBackend::returning(vec![])));
        let context = ContextSlots::initial();
        let outcome = engine
            .ground(request("Boxing", "I don't know.", "Usyk next fight date", &context))
            .await;
        assert_eq!(outcome.decision.reason.code(), "search_unavailable");
        assert!(outcome.decision.sources.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_search_gets_distinct_note() {
        let backend = Arc::new(ScriptedSearchBackend::with_script(vec![Err(SearchError::rate_limited(None)); 3]));
        let engine = engine(backend);
        let context = ContextSlots::initial();
        let outcome = engine
            .ground(request("Boxing", "I don't know.", "Usyk next fight date", &context))
            .await;
        assert!(outcome.reply.ends_with(BUSY_NOTE));
    }
}
