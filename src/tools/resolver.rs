//! Company name / ticker query to exchange symbol
//!
//! Static overrides first, then a remote quote search with a bounded number of
//! attempts and a fixed delay between them. Results are never cached.

use crate::error::ChatError;
use crate::models::{ToolInput, ToolOutput};
use crate::tools::{ensure_object_parameters, require_str, Tool};
use crate::Result;
use lazy_static::lazy_static;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const YAHOO_SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const PREFERRED_SUFFIX: &str = ".NS";

lazy_static! {
    /// Authoritative overrides, keyed by lowercased query.
    static ref SYMBOL_OVERRIDES: HashMap<&'static str, &'static str> = HashMap::from([
        ("airtel", "BHARTIARTL.NS"),
        ("jio", "RELIANCE.NS"),
        ("reliance", "RELIANCE.NS"),
        ("google", "GOOGL"),
        ("amazon", "AMZN"),
        ("apple", "AAPL"),
        ("tesla", "TSLA"),
        ("microsoft", "MSFT"),
        ("tatamotors", "TMCV.NS"),
        ("hdfc", "HDFCBANK.NS"),
    ]);
}

/// One search hit from the remote quote search.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuoteCandidate {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, rename = "quoteType")]
    pub quote_type: Option<String>,
}

/// Remote quote search. Any error is treated as a retryable failure.
#[async_trait::async_trait]
pub trait SymbolSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<QuoteCandidate>>;
}

/// Yahoo Finance quote search
pub struct YahooSymbolSearch {
    client: Client,
}

impl YahooSymbolSearch {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .build()?;

        Ok(Self { client })
    }
}

#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<QuoteCandidate>,
}

#[async_trait::async_trait]
impl SymbolSearch for YahooSymbolSearch {
    async fn search(&self, query: &str) -> Result<Vec<QuoteCandidate>> {
        let response = self
            .client
            .get(YAHOO_SEARCH_URL)
            .query(&[("q", query), ("quotesCount", "5"), ("newsCount", "0")])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ChatError::SymbolSearchUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::SymbolSearchUnavailable(format!(
                "Yahoo Finance returned {}",
                response.status()
            )));
        }

        let body: YahooSearchResponse = response
            .json()
            .await
            .map_err(|e| ChatError::SymbolSearchUnavailable(format!("Invalid response: {}", e)))?;

        Ok(body.quotes)
    }
}

/// Pick a symbol from search candidates: a `.NS` listing first, then any
/// equity or ETF.
pub fn select_symbol(candidates: &[QuoteCandidate]) -> Option<String> {
    let symbols = || {
        candidates
            .iter()
            .filter_map(|c| c.symbol.as_deref().filter(|s| !s.is_empty()).map(|s| (s, c)))
    };

    if let Some((symbol, _)) = symbols().find(|(s, _)| s.ends_with(PREFERRED_SUFFIX)) {
        return Some(symbol.to_string());
    }

    symbols()
        .find(|(_, c)| matches!(c.quote_type.as_deref(), Some("EQUITY") | Some("ETF")))
        .map(|(s, _)| s.to_string())
}

pub struct SymbolResolver {
    search: Arc<dyn SymbolSearch>,
    retries: u32,
    backoff: Duration,
}

impl SymbolResolver {
    pub fn new(search: Arc<dyn SymbolSearch>, retries: u32, backoff: Duration) -> Self {
        Self {
            search,
            retries: retries.max(1),
            backoff,
        }
    }

    /// Look up the static overrides only.
    pub fn lookup_override(query: &str) -> Option<&'static str> {
        SYMBOL_OVERRIDES
            .get(query.trim().to_lowercase().as_str())
            .copied()
    }

    pub async fn resolve(&self, query: &str) -> Result<String> {
        if let Some(symbol) = Self::lookup_override(query) {
            debug!(query, symbol, "Resolved symbol from static overrides");
            return Ok(symbol.to_string());
        }

        let mut attempt = 1;
        loop {
            let outcome = match self.search.search(query).await {
                Ok(candidates) => select_symbol(&candidates)
                    .ok_or_else(|| ChatError::NotListed(query.to_string())),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(symbol) => {
                    debug!(query, symbol = %symbol, attempt, "Resolved symbol via search");
                    return Ok(symbol);
                }
                Err(e) if attempt >= self.retries => {
                    warn!(query, attempt, error = %e, "Symbol resolution failed");
                    return Err(e);
                }
                Err(e) => {
                    debug!(query, attempt, error = %e, "Symbol resolution attempt failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

pub struct ResolveSymbolTool {
    resolver: SymbolResolver,
}

impl ResolveSymbolTool {
    pub fn new(resolver: SymbolResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait::async_trait]
impl Tool for ResolveSymbolTool {
    fn name(&self) -> &'static str {
        "resolve_stock_symbol"
    }

    fn description(&self) -> &'static str {
        "Resolve company name to stock symbol"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Company name or ticker, e.g. 'reliance' or 'Apple'"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let query = require_str(input, "query")?;
        let symbol = self.resolver.resolve(query).await?;

        Ok(ToolOutput::ok(json!({ "symbol": symbol })))
    }
}
