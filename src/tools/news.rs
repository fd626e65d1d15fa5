//! News and web search adapters
//!
//! Stock news (Finnhub, Marketaux) and general search (SerpAPI Google News,
//! Tavily). Each adapter normalizes into `NewsItem` lists where the provider
//! returns articles; none of them raise on provider failure.

use crate::models::{NewsItem, ToolInput, ToolOutput};
use crate::tools::{
    ensure_object_parameters, error_payload, optional_usize, require_str, ProviderClient, Tool,
};
use crate::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::warn;

const FINNHUB_NEWS_URL: &str = "https://finnhub.io/api/v1/company-news";
const MARKETAUX_NEWS_URL: &str = "https://api.marketaux.com/v1/news/all";
const SERPAPI_URL: &str = "https://serpapi.com/search.json";
const TAVILY_URL: &str = "https://api.tavily.com/search";

const DEFAULT_LIMIT: usize = 5;
const FINNHUB_LOOKBACK_DAYS: i64 = 7;

fn str_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn items_to_value(items: Vec<NewsItem>) -> Value {
    serde_json::to_value(items).unwrap_or_else(|_| json!([]))
}

fn symbol_news_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": { "type": "string", "description": "Exchange ticker" },
            "limit": { "type": "integer", "description": "Maximum articles (default 5)" }
        },
        "required": ["symbol"]
    })
}

// =============================
// Finnhub
// =============================

/// Date window `[today - 7d, today]` formatted for the Finnhub API.
fn finnhub_window(today: NaiveDate) -> (String, String) {
    let from = today - Duration::days(FINNHUB_LOOKBACK_DAYS);
    (
        from.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

pub fn normalize_finnhub_news(body: &Value, limit: usize) -> Vec<NewsItem> {
    body.as_array()
        .map(|articles| {
            articles
                .iter()
                .take(limit)
                .map(|n| NewsItem {
                    title: str_field(n, "headline"),
                    source: n
                        .get("source")
                        .and_then(Value::as_str)
                        .unwrap_or("Finnhub")
                        .to_string(),
                    url: str_field(n, "url"),
                    published: n
                        .get("datetime")
                        .and_then(Value::as_i64)
                        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
                        .map(|dt| dt.to_rfc3339())
                        .unwrap_or_default(),
                    summary: Some(str_field(n, "summary")),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct FinnhubNewsTool {
    client: ProviderClient,
    api_key: Option<String>,
}

impl FinnhubNewsTool {
    pub fn new(client: ProviderClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait::async_trait]
impl Tool for FinnhubNewsTool {
    fn name(&self) -> &'static str {
        "finnhub_stock_news"
    }

    fn description(&self) -> &'static str {
        "Fetch latest stock-specific news from Finnhub (last 7 days)"
    }

    fn parameters_schema(&self) -> Value {
        symbol_news_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let symbol = require_str(input, "symbol")?;
        let limit = optional_usize(input, "limit", DEFAULT_LIMIT);

        let Some(api_key) = self.api_key.as_ref() else {
            warn!("FINNHUB_API_KEY is not configured");
            return Ok(ToolOutput::ok(json!([])));
        };

        let (from, to) = finnhub_window(Utc::now().date_naive());
        let query = [
            ("symbol", symbol.to_string()),
            ("from", from),
            ("to", to),
            ("token", api_key.clone()),
        ];

        let items = match self.client.get_json(FINNHUB_NEWS_URL, &query).await {
            Ok(body) => normalize_finnhub_news(&body, limit),
            Err(e) => {
                warn!(symbol, error = %e, "Finnhub news failed");
                Vec::new()
            }
        };

        Ok(ToolOutput::ok(items_to_value(items)))
    }
}

// =============================
// Marketaux
// =============================

pub fn normalize_marketaux_news(body: &Value) -> Vec<NewsItem> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|articles| {
            articles
                .iter()
                .map(|n| NewsItem {
                    title: str_field(n, "title"),
                    source: str_field(n, "source"),
                    url: str_field(n, "url"),
                    published: str_field(n, "published_at"),
                    summary: Some(str_field(n, "description")),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct MarketauxNewsTool {
    client: ProviderClient,
    api_key: Option<String>,
}

impl MarketauxNewsTool {
    pub fn new(client: ProviderClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait::async_trait]
impl Tool for MarketauxNewsTool {
    fn name(&self) -> &'static str {
        "marketaux_stock_news"
    }

    fn description(&self) -> &'static str {
        "Fetch entity-filtered stock news from Marketaux"
    }

    fn parameters_schema(&self) -> Value {
        symbol_news_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let symbol = require_str(input, "symbol")?;
        let limit = optional_usize(input, "limit", DEFAULT_LIMIT);

        let Some(api_key) = self.api_key.as_ref() else {
            return Ok(ToolOutput::ok(error_payload(
                "MARKETAUX_API_KEY is not configured",
            )));
        };

        let query = [
            ("symbols", symbol.to_string()),
            ("filter_entities", "true".to_string()),
            ("language", "en".to_string()),
            ("limit", limit.to_string()),
            ("api_token", api_key.clone()),
        ];

        let data = match self.client.get_json(MARKETAUX_NEWS_URL, &query).await {
            Ok(body) => items_to_value(normalize_marketaux_news(&body)),
            Err(e) => {
                warn!(symbol, error = %e, "Marketaux news failed");
                error_payload(e.to_string())
            }
        };

        Ok(ToolOutput::ok(data))
    }
}

// =============================
// SerpAPI (Google News)
// =============================

pub fn normalize_serpapi_news(body: &Value, max_results: usize) -> Vec<NewsItem> {
    body.get("news_results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .take(max_results)
                .map(|r| NewsItem {
                    title: str_field(r, "title"),
                    source: r
                        .get("source")
                        .and_then(|s| s.as_str().or_else(|| s.get("name").and_then(Value::as_str)))
                        .unwrap_or_default()
                        .to_string(),
                    url: str_field(r, "link"),
                    published: str_field(r, "date"),
                    summary: None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct SerpApiNewsTool {
    client: ProviderClient,
    api_key: Option<String>,
}

impl SerpApiNewsTool {
    pub fn new(client: ProviderClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait::async_trait]
impl Tool for SerpApiNewsTool {
    fn name(&self) -> &'static str {
        "serpapi_news_search"
    }

    fn description(&self) -> &'static str {
        "Search Google News via SerpAPI, newest first"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "News search query" },
                "max_results": { "type": "integer", "description": "Maximum results (default 5)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let query_text = require_str(input, "query")?;
        let max_results = optional_usize(input, "max_results", DEFAULT_LIMIT);

        let Some(api_key) = self.api_key.as_ref() else {
            warn!("SERPAPI_API_KEY is not configured");
            return Ok(ToolOutput::ok(json!([])));
        };

        let query = [
            ("engine", "google_news".to_string()),
            ("q", query_text.to_string()),
            ("api_key", api_key.clone()),
            ("num", max_results.to_string()),
            ("sort", "date".to_string()),
        ];

        let items = match self.client.get_json(SERPAPI_URL, &query).await {
            Ok(body) => normalize_serpapi_news(&body, max_results),
            Err(e) => {
                warn!(query = query_text, error = %e, "SerpAPI news search failed");
                Vec::new()
            }
        };

        Ok(ToolOutput::ok(items_to_value(items)))
    }
}

// =============================
// Tavily
// =============================

const TAVILY_TOPICS: &[&str] = &["general", "news", "finance"];

pub struct TavilySearchTool {
    client: ProviderClient,
    api_key: Option<String>,
}

impl TavilySearchTool {
    pub fn new(client: ProviderClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    /// Request body for a search; unknown topics fall back to `general`.
    fn request_body(api_key: &str, query: &str, input: &ToolInput) -> Value {
        let topic = input
            .parameters
            .get("topic")
            .and_then(Value::as_str)
            .filter(|t| TAVILY_TOPICS.contains(t))
            .unwrap_or("general");
        let include_raw_content = input
            .parameters
            .get("include_raw_content")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        json!({
            "api_key": api_key,
            "query": query,
            "max_results": optional_usize(input, "max_results", DEFAULT_LIMIT),
            "topic": topic,
            "include_raw_content": include_raw_content,
        })
    }
}

#[async_trait::async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &'static str {
        "tavily_search"
    }

    fn description(&self) -> &'static str {
        "Run a web search"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "max_results": { "type": "integer", "description": "Maximum results (default 5)" },
                "topic": { "type": "string", "enum": TAVILY_TOPICS },
                "include_raw_content": { "type": "boolean" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let query = require_str(input, "query")?;

        let Some(api_key) = self.api_key.as_ref() else {
            return Ok(ToolOutput::ok(error_payload(
                "TAVILY_API_KEY is not configured",
            )));
        };

        let body = Self::request_body(api_key, query, input);
        let data = match self.client.post_json(TAVILY_URL, &body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(query, error = %e, "Tavily search failed");
                error_payload(e.to_string())
            }
        };

        Ok(ToolOutput::ok(data))
    }
}
