//! Configuration loading, validation, and management for Touchline.
//!
//! Loads configuration from `~/.touchline/config.toml` with environment
//! variable overrides. Validates all settings at startup. Missing
//! credentials are not an error: the process starts and degrades.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.touchline/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search settings used by grounding
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub guardrails: GuardrailConfig,

    /// Conversation storage and retention
    #[serde(default)]
    pub session: SessionConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("llm", &self.llm)
            .field("search", &self.search)
            .field("guardrails", &self.guardrails)
            .field("session", &self.session)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Bound on a single completion, including the tool loop
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_max_tool_rounds() -> usize {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom search engine identifier (`cx`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,

    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Sources kept per grounded reply (provider caps a page at 10)
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_true")]
    pub safe_search: bool,
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_max_results() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_cache_capacity() -> u64 {
    512
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    8000
}
fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            safe_search: true,
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("engine_id", &redact(&self.engine_id))
            .field("endpoint", &self.endpoint)
            .field("max_results", &self.max_results)
            .field("timeout_secs", &self.timeout_secs)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("safe_search", &self.safe_search)
            .finish()
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Whole-word terms that block a message in either direction
    #[serde(default = "default_blocked_terms")]
    pub blocked_terms: Vec<String>,

    /// Vocabulary that marks a message as on-topic
    #[serde(default = "default_domain_keywords")]
    pub domain_keywords: Vec<String>,
}

fn default_max_input_chars() -> usize {
    1000
}
fn default_max_output_chars() -> usize {
    8000
}
fn default_blocked_terms() -> Vec<String> {
    ["porn", "pornography", "terrorism", "self-harm", "nazi"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_domain_keywords() -> Vec<String> {
    [
        "football", "soccer", "premier league", "championship", "league", "efl", "fa cup",
        "cup", "club", "team", "player", "manager", "coach", "match", "fixture", "fixtures",
        "game", "goal", "goals", "score", "table", "standings", "season", "transfer",
        "signing", "stadium", "derby", "promotion", "relegation", "playoff", "boxing",
        "boxer", "fight", "fighter", "bout", "knockout", "heavyweight", "title", "belt",
        "champion", "sport", "sports", "news", "injury", "striker", "keeper", "midfielder",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            max_output_chars: default_max_output_chars(),
            blocked_terms: default_blocked_terms(),
            domain_keywords: default_domain_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Idle conversations older than this are evicted
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,
}

fn default_session_backend() -> String {
    "memory".into()
}
fn default_database_path() -> PathBuf {
    AppConfig::config_dir().join("conversations.db")
}
fn default_retention_hours() -> u64 {
    24
}
fn default_eviction_interval() -> u64 {
    600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            database_path: default_database_path(),
            retention_hours: default_retention_hours(),
            eviction_interval_secs: default_eviction_interval(),
        }
    }
}

impl SessionConfig {
    pub fn retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.touchline/config.toml).
    ///
    /// Environment variables override the file:
    /// - `GOOGLE_API_KEY` — language model credential
    /// - `GOOGLE_CUSTOM_SEARCH_API_KEY`, `GOOGLE_CUSTOM_SEARCH_ENGINE_ID`
    /// - `TOUCHLINE_PROVIDER`, `TOUCHLINE_MODEL`, `TOUCHLINE_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = non_empty("GOOGLE_CUSTOM_SEARCH_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(cx) = non_empty("GOOGLE_CUSTOM_SEARCH_ENGINE_ID") {
            self.search.engine_id = Some(cx);
        }
        if let Some(provider) = non_empty("TOUCHLINE_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = non_empty("TOUCHLINE_MODEL") {
            self.llm.model = model;
        }
        if let Some(port) = non_empty("TOUCHLINE_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("TOUCHLINE_PORT is not a port number: {port}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".touchline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.search.max_results == 0 || self.search.max_results > 10 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be between 1 and 10".into(),
            ));
        }

        if self.search.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_attempts must be at least 1".into(),
            ));
        }

        if self.session.retention_hours == 0 {
            return Err(ConfigError::ValidationError(
                "session.retention_hours must be at least 1".into(),
            ));
        }

        if !matches!(self.session.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "session.backend must be \"memory\" or \"sqlite\", got \"{}\"",
                self.session.backend
            )));
        }

        Ok(())
    }

    /// Required credentials that are absent. Not an error: the affected
    /// features answer "service unavailable" instead.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.llm.api_key.is_none() {
            missing.push("GOOGLE_API_KEY");
        }
        if self.search.api_key.is_none() {
            missing.push("GOOGLE_CUSTOM_SEARCH_API_KEY");
        }
        if self.search.engine_id.is_none() {
            missing.push("GOOGLE_CUSTOM_SEARCH_ENGINE_ID");
        }
        missing
    }

    /// Render the effective configuration as TOML with secrets masked.
    pub fn to_redacted_toml(&self) -> String {
        let mut masked = self.clone();
        let mask = |s: &mut Option<String>| {
            if s.is_some() {
                *s = Some("[REDACTED]".into());
            }
        };
        mask(&mut masked.llm.api_key);
        mask(&mut masked.search.api_key);
        mask(&mut masked.search.engine_id);
        toml::to_string_pretty(&masked).unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for touchline_core::Error {
    fn from(e: ConfigError) -> Self {
        touchline_core::Error::Config {
            message: e.to_string(),
        }
    }
}
