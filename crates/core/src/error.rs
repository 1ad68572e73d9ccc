//! Error types for the Touchline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! carries the turn-level taxonomy the orchestrator and gateway act on.

use thiserror::Error;

use crate::guardrail::Direction;

/// The top-level error type for all Touchline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any agent runs.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Input or output blocked by a guardrail.
    #[error("Guardrail violation ({direction}): {checks}")]
    GuardrailViolation { direction: Direction, checks: String },

    /// Language model or search failed after exhausting retries.
    #[error("Upstream error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Rate limit exhausted: {0}")]
    RateLimited(String),

    /// An agent tried to hand off to a target it does not declare.
    #[error("Unknown handoff target: '{from}' cannot hand off to '{to}'")]
    UnknownAgent { from: String, to: String },

    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a server fault rather than something the
    /// conversation can recover from with a well-formed reply.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Error::UnknownConversation(_) | Error::Internal(_) | Error::Session(_)
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Language-model failures.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Classification of a search failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchErrorKind {
    Timeout,
    Upstream5xx,
    RateLimited,
    Network,
    Authentication,
    MalformedQuery,
    NotConfigured,
    Decode,
    NoResults,
}

impl SearchErrorKind {
    /// Transient failures are retried with backoff; everything else surfaces immediately.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            SearchErrorKind::Timeout
                | SearchErrorKind::Upstream5xx
                | SearchErrorKind::RateLimited
                | SearchErrorKind::Network
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchErrorKind::Timeout => "timeout",
            SearchErrorKind::Upstream5xx => "upstream_5xx",
            SearchErrorKind::RateLimited => "rate_limited",
            SearchErrorKind::Network => "network",
            SearchErrorKind::Authentication => "authentication",
            SearchErrorKind::MalformedQuery => "malformed_query",
            SearchErrorKind::NotConfigured => "not_configured",
            SearchErrorKind::Decode => "decode",
            SearchErrorKind::NoResults => "no_results",
        }
    }
}

impl std::fmt::Display for SearchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed web search.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SearchError {
    pub kind: SearchErrorKind,
    pub message: String,
    /// Server-provided hint for rate-limit responses.
    pub retry_after_secs: Option<u64>,
}

impl SearchError {
    pub fn new(kind: SearchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: SearchErrorKind::RateLimited,
            message: "search quota exceeded".into(),
            retry_after_secs,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error("Store not initialised: {0}")]
    NotInitialised(String),
}

/// Tool failures, reported back to the model rather than aborting a turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
