//! Tool trait and registry
//!
//! Tools are the callable surface the agent sees: the symbol resolver and one
//! adapter per market data or news provider.

pub mod news;
pub mod quotes;
pub mod resolver;

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use news::{FinnhubNewsTool, MarketauxNewsTool, SerpApiNewsTool, TavilySearchTool};
pub use quotes::{AlphaVantageQuoteTool, YahooFinanceApi, YahooFinanceHttp, YahooSummaryTool};
pub use resolver::{ResolveSymbolTool, SymbolResolver, SymbolSearch, YahooSymbolSearch};

/// Trait for a single tool callable by the agent
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the `parameters` object.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Declaration of a tool as handed to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Declarations for the named tools, in the given order. Unregistered
    /// names are skipped.
    pub fn specs(&self, names: &[&str]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared HTTP client for the data providers.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
}

impl ProviderClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// GET a JSON document. Non-success statuses are errors.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Provider(format!(
                "{} returned {}",
                url, status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ChatError::Provider(format!("Invalid JSON response: {}", e)))
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Provider(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ChatError::Provider(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(ChatError::Provider(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        Ok(body)
    }
}

pub(crate) fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(ChatError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

pub(crate) fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ChatError::InvalidToolInput(format!("Expected '{}' in tool_input", key)))
}

pub(crate) fn optional_usize(input: &ToolInput, key: &str, default: usize) -> usize {
    input
        .parameters
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// `{"error": message}`, the failure shape adapters hand back to the agent.
pub(crate) fn error_payload(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}

/// Create the registry with the resolver and every provider adapter.
pub fn create_default_registry(config: &AppConfig) -> Result<ToolRegistry> {
    let provider = ProviderClient::new(config.provider_timeout)?;
    let keys = &config.providers;

    let resolver = SymbolResolver::new(
        Arc::new(YahooSymbolSearch::new()?),
        config.resolver_retries,
        config.resolver_backoff,
    );

    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ResolveSymbolTool::new(resolver)));
    registry.register(Arc::new(AlphaVantageQuoteTool::new(
        provider.clone(),
        keys.alphavantage.clone(),
    )));
    registry.register(Arc::new(YahooSummaryTool::new(Arc::new(
        YahooFinanceHttp::new(config.provider_timeout)?,
    ))));
    registry.register(Arc::new(FinnhubNewsTool::new(
        provider.clone(),
        keys.finnhub.clone(),
    )));
    registry.register(Arc::new(MarketauxNewsTool::new(
        provider.clone(),
        keys.marketaux.clone(),
    )));
    registry.register(Arc::new(SerpApiNewsTool::new(
        provider.clone(),
        keys.serpapi.clone(),
    )));
    registry.register(Arc::new(TavilySearchTool::new(provider, keys.tavily.clone())));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "text": { "type": "string" } } })
        }

        async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
            Ok(ToolOutput::ok(input.parameters.clone()))
        }
    }

    #[test]
    fn test_specs_follow_requested_order_and_skip_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let specs = registry.specs(&["missing", "echo"]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[0].parameters["type"], "object");
    }

    #[test]
    fn test_default_registry_registers_all_tools() {
        let registry = create_default_registry(&AppConfig::default()).unwrap();
        let mut names = registry.list();
        names.sort();
        assert_eq!(
            names,
            vec![
                "alphavantage_stock_quote",
                "finnhub_stock_news",
                "marketaux_stock_news",
                "resolve_stock_symbol",
                "serpapi_news_search",
                "tavily_search",
                "yfinance_stock_summary",
            ]
        );
    }

    #[test]
    fn test_require_str_rejects_blank() {
        let input = ToolInput {
            tool_name: "t".into(),
            parameters: json!({ "symbol": "  " }),
        };
        assert!(matches!(
            require_str(&input, "symbol"),
            Err(ChatError::InvalidToolInput(_))
        ));
    }
}
