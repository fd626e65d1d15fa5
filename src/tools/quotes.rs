//! Price quote and company summary adapters
//!
//! Both adapters swallow every failure: the quote adapter answers with an
//! error record, the summary adapter with an empty object.
//!
//! Yahoo's quoteSummary endpoint wants a session cookie plus a matching
//! "crumb" token. The crumb is fetched once, reused, and refreshed once when
//! Yahoo rejects it.

use crate::error::ChatError;
use crate::models::{StockQuote, StockSummary, ToolInput, ToolOutput};
use crate::tools::{ensure_object_parameters, error_payload, require_str, ProviderClient, Tool};
use crate::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";
const YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";
const YAHOO_CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const YAHOO_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const YAHOO_SUMMARY_MODULES: &str = "price,summaryDetail,financialData,assetProfile";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

fn symbol_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": {
                "type": "string",
                "description": "Exchange ticker as returned by resolve_stock_symbol"
            }
        },
        "required": ["symbol"]
    })
}

/// Normalize an Alpha Vantage `GLOBAL_QUOTE` reply.
pub fn normalize_global_quote(symbol: &str, body: &Value) -> Value {
    let quote = body.get("Global Quote").and_then(Value::as_object);

    let Some(quote) = quote.filter(|q| q.contains_key("05. price")) else {
        return error_payload(format!(
            "No real-time data available for {} from Alpha Vantage",
            symbol
        ));
    };

    let field = |key: &str| quote.get(key).and_then(Value::as_str).map(str::to_string);

    let record = StockQuote {
        symbol: symbol.to_string(),
        price: field("05. price"),
        high: field("03. high"),
        low: field("04. low"),
        volume: field("06. volume"),
    };

    serde_json::to_value(record).unwrap_or_else(|e| error_payload(e.to_string()))
}

pub struct AlphaVantageQuoteTool {
    client: ProviderClient,
    api_key: Option<String>,
}

impl AlphaVantageQuoteTool {
    pub fn new(client: ProviderClient, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn fetch(&self, symbol: &str) -> Value {
        let Some(api_key) = self.api_key.as_ref() else {
            return error_payload("ALPHAVANTAGE_API_KEY is not configured");
        };

        let query = [
            ("function", "GLOBAL_QUOTE".to_string()),
            ("symbol", symbol.to_string()),
            ("apikey", api_key.clone()),
        ];

        match self.client.get_json(ALPHAVANTAGE_URL, &query).await {
            Ok(body) => normalize_global_quote(symbol, &body),
            Err(e) => {
                warn!(symbol, error = %e, "Alpha Vantage quote failed");
                error_payload(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl Tool for AlphaVantageQuoteTool {
    fn name(&self) -> &'static str {
        "alphavantage_stock_quote"
    }

    fn description(&self) -> &'static str {
        "Fetch real-time stock data from Alpha Vantage (best for US listings)"
    }

    fn parameters_schema(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let symbol = require_str(input, "symbol")?;
        Ok(ToolOutput::ok(self.fetch(symbol).await))
    }
}

/// Normalize a Yahoo Finance `quoteSummary` reply. Returns `None` when the
/// reply carries no result.
pub fn normalize_quote_summary(symbol: &str, body: &Value) -> Option<StockSummary> {
    let result = body
        .pointer("/quoteSummary/result/0")
        .filter(|v| v.is_object())?;

    let raw = |path: &str| result.pointer(path).and_then(Value::as_f64);
    let text = |path: &str| {
        result
            .pointer(path)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Some(StockSummary {
        symbol: symbol.to_string(),
        long_name: text("/price/longName"),
        current_price: raw("/financialData/currentPrice/raw")
            .or_else(|| raw("/price/regularMarketPrice/raw")),
        day_high: raw("/summaryDetail/dayHigh/raw"),
        day_low: raw("/summaryDetail/dayLow/raw"),
        market_cap: raw("/summaryDetail/marketCap/raw").or_else(|| raw("/price/marketCap/raw")),
        website: text("/assetProfile/website"),
    })
}

/// Reply of one quoteSummary request.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryReply {
    Body(Value),
    /// Yahoo refused the crumb (401).
    InvalidCrumb,
}

/// Yahoo Finance calls behind the summary adapter.
#[async_trait::async_trait]
pub trait YahooFinanceApi: Send + Sync {
    /// Establish the session cookie and return a fresh crumb.
    async fn fetch_crumb(&self) -> Result<String>;

    async fn quote_summary(&self, symbol: &str, crumb: &str) -> Result<SummaryReply>;
}

/// Yahoo Finance over HTTP, with a cookie store shared by every request.
pub struct YahooFinanceHttp {
    client: Client,
}

impl YahooFinanceHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl YahooFinanceApi for YahooFinanceHttp {
    async fn fetch_crumb(&self) -> Result<String> {
        // Only the Set-Cookie matters; the page itself is usually a 404.
        self.client
            .get(YAHOO_COOKIE_URL)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Yahoo cookie request failed: {}", e)))?;

        let response = self
            .client
            .get(YAHOO_CRUMB_URL)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Yahoo crumb request failed: {}", e)))?;

        let status = response.status();
        let crumb = response.text().await?.trim().to_string();
        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            return Err(ChatError::Provider(format!(
                "Yahoo crumb endpoint returned {}",
                status
            )));
        }

        Ok(crumb)
    }

    async fn quote_summary(&self, symbol: &str, crumb: &str) -> Result<SummaryReply> {
        let response = self
            .client
            .get(format!("{}/{}", YAHOO_SUMMARY_URL, symbol))
            .query(&[("modules", YAHOO_SUMMARY_MODULES), ("crumb", crumb)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Yahoo summary request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(SummaryReply::InvalidCrumb);
        }

        // 404 carries a JSON error body that normalizes to "no result".
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ChatError::Provider(format!("Invalid JSON response: {}", e)))?;
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(ChatError::Provider(format!(
                "Yahoo summary returned {}: {}",
                status, body
            )));
        }

        Ok(SummaryReply::Body(body))
    }
}

pub struct YahooSummaryTool {
    api: Arc<dyn YahooFinanceApi>,
    crumb: Mutex<Option<String>>,
}

impl YahooSummaryTool {
    pub fn new(api: Arc<dyn YahooFinanceApi>) -> Self {
        Self {
            api,
            crumb: Mutex::new(None),
        }
    }

    async fn crumb(&self, refresh: bool) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let (Some(crumb), false) = (cached.as_ref(), refresh) {
            return Ok(crumb.clone());
        }

        let crumb = self.api.fetch_crumb().await?;
        debug!("Fetched Yahoo Finance crumb");
        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    async fn summary_body(&self, symbol: &str) -> Result<Value> {
        let crumb = self.crumb(false).await?;
        if let SummaryReply::Body(body) = self.api.quote_summary(symbol, &crumb).await? {
            return Ok(body);
        }

        warn!(symbol, "Yahoo Finance rejected crumb, refreshing");
        let crumb = self.crumb(true).await?;
        match self.api.quote_summary(symbol, &crumb).await? {
            SummaryReply::Body(body) => Ok(body),
            SummaryReply::InvalidCrumb => Err(ChatError::Provider(
                "Yahoo Finance rejected a freshly issued crumb".to_string(),
            )),
        }
    }

    async fn fetch(&self, symbol: &str) -> Value {
        let summary = match self.summary_body(symbol).await {
            Ok(body) => normalize_quote_summary(symbol, &body),
            Err(e) => {
                warn!(symbol, error = %e, "Yahoo Finance summary failed");
                None
            }
        };

        summary
            .and_then(|s| serde_json::to_value(s).ok())
            .unwrap_or_else(|| json!({}))
    }
}

#[async_trait::async_trait]
impl Tool for YahooSummaryTool {
    fn name(&self) -> &'static str {
        "yfinance_stock_summary"
    }

    fn description(&self) -> &'static str {
        "Fetch stock summary from Yahoo Finance (best for Indian listings)"
    }

    fn parameters_schema(&self) -> Value {
        symbol_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let symbol = require_str(input, "symbol")?;
        Ok(ToolOutput::ok(self.fetch(symbol).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Hands out numbered crumbs and replays scripted summary replies,
    /// recording the crumb each summary call carried.
    struct ScriptedYahoo {
        crumbs_issued: StdMutex<u32>,
        replies: StdMutex<VecDeque<Result<SummaryReply>>>,
        crumbs_seen: StdMutex<Vec<String>>,
    }

    impl ScriptedYahoo {
        fn new(replies: Vec<Result<SummaryReply>>) -> Arc<Self> {
            Arc::new(Self {
                crumbs_issued: StdMutex::new(0),
                replies: StdMutex::new(replies.into()),
                crumbs_seen: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl YahooFinanceApi for ScriptedYahoo {
        async fn fetch_crumb(&self) -> Result<String> {
            let mut issued = self.crumbs_issued.lock().unwrap();
            *issued += 1;
            Ok(format!("crumb-{}", issued))
        }

        async fn quote_summary(&self, _symbol: &str, crumb: &str) -> Result<SummaryReply> {
            self.crumbs_seen.lock().unwrap().push(crumb.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SummaryReply::InvalidCrumb))
        }
    }

    fn reliance_body() -> Value {
        json!({
            "quoteSummary": {
                "result": [{
                    "price": { "longName": "Reliance Industries Limited", "regularMarketPrice": { "raw": 2950.5 } }
                }],
                "error": null
            }
        })
    }

    fn summary_input() -> ToolInput {
        ToolInput {
            tool_name: "yfinance_stock_summary".into(),
            parameters: json!({ "symbol": "RELIANCE.NS" }),
        }
    }

    #[test]
    fn test_global_quote_normalized() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "03. high": "171.00",
                "04. low": "168.20",
                "05. price": "170.10",
                "06. volume": "3456789"
            }
        });
        let out = normalize_global_quote("IBM", &body);
        assert_eq!(
            out,
            json!({
                "symbol": "IBM",
                "price": "170.10",
                "high": "171.00",
                "low": "168.20",
                "volume": "3456789"
            })
        );
    }

    #[test]
    fn test_global_quote_without_price_is_error_record() {
        for body in [json!({}), json!({ "Global Quote": {} }), json!({ "Note": "rate limited" })] {
            let out = normalize_global_quote("RELIANCE.NS", &body);
            assert_eq!(
                out["error"],
                "No real-time data available for RELIANCE.NS from Alpha Vantage"
            );
        }
    }

    #[test]
    fn test_quote_summary_normalized() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": { "longName": "Reliance Industries Limited", "regularMarketPrice": { "raw": 2950.5 } },
                    "summaryDetail": {
                        "dayHigh": { "raw": 2970.0 },
                        "dayLow": { "raw": 2931.1 },
                        "marketCap": { "raw": 19960000000000.0 }
                    },
                    "assetProfile": { "website": "https://www.ril.com" }
                }],
                "error": null
            }
        });

        let summary = normalize_quote_summary("RELIANCE.NS", &body).unwrap();
        assert_eq!(summary.long_name.as_deref(), Some("Reliance Industries Limited"));
        assert_eq!(summary.current_price, Some(2950.5));
        assert_eq!(summary.day_low, Some(2931.1));
        assert_eq!(summary.website.as_deref(), Some("https://www.ril.com"));
    }

    #[test]
    fn test_quote_summary_without_result_is_none() {
        let body = json!({ "quoteSummary": { "result": null, "error": { "code": "Not Found" } } });
        assert!(normalize_quote_summary("NOPE", &body).is_none());
    }

    #[tokio::test]
    async fn test_summary_reuses_crumb_across_calls() {
        let yahoo = ScriptedYahoo::new(vec![
            Ok(SummaryReply::Body(reliance_body())),
            Ok(SummaryReply::Body(reliance_body())),
        ]);
        let tool = YahooSummaryTool::new(yahoo.clone());

        for _ in 0..2 {
            let output = tool.execute(&summary_input()).await.unwrap();
            assert_eq!(output.data["longName"], "Reliance Industries Limited");
            assert_eq!(output.data["currentPrice"], 2950.5);
        }

        assert_eq!(*yahoo.crumbs_issued.lock().unwrap(), 1);
        assert_eq!(*yahoo.crumbs_seen.lock().unwrap(), vec!["crumb-1", "crumb-1"]);
    }

    #[tokio::test]
    async fn test_rejected_crumb_is_refreshed_once() {
        let yahoo = ScriptedYahoo::new(vec![
            Ok(SummaryReply::InvalidCrumb),
            Ok(SummaryReply::Body(reliance_body())),
        ]);
        let tool = YahooSummaryTool::new(yahoo.clone());

        let output = tool.execute(&summary_input()).await.unwrap();
        assert_eq!(output.data["symbol"], "RELIANCE.NS");
        assert_eq!(*yahoo.crumbs_seen.lock().unwrap(), vec!["crumb-1", "crumb-2"]);
    }

    #[tokio::test]
    async fn test_repeated_crumb_rejection_gives_empty_summary() {
        let yahoo = ScriptedYahoo::new(vec![
            Ok(SummaryReply::InvalidCrumb),
            Ok(SummaryReply::InvalidCrumb),
            Ok(SummaryReply::Body(reliance_body())),
        ]);
        let tool = YahooSummaryTool::new(yahoo.clone());

        let output = tool.execute(&summary_input()).await.unwrap();
        assert_eq!(output.data, json!({}));
        assert_eq!(yahoo.crumbs_seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_summary_transport_error_gives_empty_summary() {
        let yahoo = ScriptedYahoo::new(vec![Err(ChatError::Provider("timeout".into()))]);
        let output = YahooSummaryTool::new(yahoo)
            .execute(&summary_input())
            .await
            .unwrap();
        assert_eq!(output.data, json!({}));
    }

    #[tokio::test]
    async fn test_quote_without_key_returns_error_record() {
        let tool = AlphaVantageQuoteTool::new(
            ProviderClient::new(Duration::from_secs(1)).unwrap(),
            None,
        );
        let output = tool
            .execute(&ToolInput {
                tool_name: "alphavantage_stock_quote".into(),
                parameters: json!({ "symbol": "AAPL" }),
            })
            .await
            .unwrap();
        assert!(output.data["error"]
            .as_str()
            .unwrap()
            .contains("ALPHAVANTAGE_API_KEY"));
    }
}
