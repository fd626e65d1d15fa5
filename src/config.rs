//! Service configuration loaded from the environment

use crate::error::ChatError;
use crate::memory::StoreFailurePolicy;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CHAT_MODEL: &str = "groq:qwen/qwen3-32b";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// API keys for the market data and search providers.
///
/// A missing key disables the corresponding adapter; the adapter then returns
/// its failure shape instead of calling out.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub finnhub: Option<String>,
    pub marketaux: Option<String>,
    pub alphavantage: Option<String>,
    pub serpapi: Option<String>,
    pub tavily: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    /// Secret used to verify the signed `user_session` cookie.
    pub session_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub default_chat_model: String,
    pub providers: ProviderKeys,
    /// Number of past turns fed back to the agent.
    pub history_turns: usize,
    pub store_failure_policy: StoreFailurePolicy,
    pub resolver_retries: u32,
    pub resolver_backoff: Duration,
    pub provider_timeout: Duration,
    pub max_tool_rounds: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            session_secret: String::new(),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            default_chat_model: DEFAULT_CHAT_MODEL.to_string(),
            providers: ProviderKeys::default(),
            history_turns: 3,
            store_failure_policy: StoreFailurePolicy::Skip,
            resolver_retries: 3,
            resolver_backoff: Duration::from_millis(500),
            provider_timeout: Duration::from_secs(10),
            max_tool_rounds: 8,
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables.
    ///
    /// Call `dotenv::dotenv()` beforehand to pick up a local `.env` file.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match parse_var::<u16>("PORT")? {
            Some(port) => port,
            None => parse_var::<u16>("API_PORT")?.unwrap_or(defaults.port),
        };

        Ok(Self {
            port,
            database_url: non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL")),
            session_secret: non_empty("SESSION_SECRET").unwrap_or_default(),
            gemini_api_key: non_empty("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            default_chat_model: non_empty("DEFAULT_CHAT_MODEL")
                .unwrap_or(defaults.default_chat_model),
            providers: ProviderKeys {
                finnhub: non_empty("FINNHUB_API_KEY"),
                marketaux: non_empty("MARKETAUX_API_KEY"),
                alphavantage: non_empty("ALPHAVANTAGE_API_KEY"),
                serpapi: non_empty("SERPAPI_API_KEY"),
                tavily: non_empty("TAVILY_API_KEY"),
            },
            history_turns: parse_var("HISTORY_TURNS")?.unwrap_or(defaults.history_turns),
            store_failure_policy: parse_var("STORE_FAILURE_POLICY")?
                .unwrap_or(defaults.store_failure_policy),
            resolver_retries: parse_var("RESOLVER_RETRIES")?.unwrap_or(defaults.resolver_retries),
            resolver_backoff: parse_var("RESOLVER_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.resolver_backoff),
            provider_timeout: parse_var("PROVIDER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            max_tool_rounds: parse_var("MAX_TOOL_ROUNDS")?.unwrap_or(defaults.max_tool_rounds),
        })
    }

    /// The session secret, which the HTTP server cannot run without.
    pub fn require_session_secret(&self) -> Result<&str> {
        if self.session_secret.is_empty() {
            return Err(ChatError::Config(
                "SESSION_SECRET must be set to verify user sessions".to_string(),
            ));
        }
        Ok(&self.session_secret)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ChatError::Config(format!("Invalid {}='{}': {}", key, raw, e))),
        None => Ok(None),
    }
}
