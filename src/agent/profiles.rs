//! System prompt and tool set per requested model

const COMPOUND_PROMPT: &str = "You are a Financial Agent that solves user queries and provides real-time relevant responses based on what the user asks. Always include the important links and details.";

const TOOL_FIRST_PROMPT: &str = r#"You are a Financial Agent designed to answer user queries accurately and in real-time.
Rules:
- Always use tools to do anything.
- Always provide relevant and up-to-date information based on the user's question.
- Include important links, sources, and details wherever possible.
- Use 'resolve_stock_symbol' first for company names to get accurate stock data.
- For stock-related queries, fetch the latest quotes and summaries.
- For general financial news, prioritize reliability and recency.
- Never hallucinate data; if information is unavailable, clearly state that.
- Summarize key points concisely for easy understanding."#;

const DEFAULT_PROMPT: &str = r#"You are a Financial Assistant giving real-time stock data and news.
Rules:
1. Always identify stock symbols using 'resolve_stock_symbol' first; do not use any other assumptions.
2. Fetch stock data via 'yfinance_stock_summary' (India) or 'alphavantage_stock_quote' (US).
3. Search content via 'tavily_search' or 'serpapi_news_search'.
4. Provide accurate, cited answers with links. Do not hallucinate."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub system_prompt: &'static str,
    pub tools: &'static [&'static str],
}

impl AgentProfile {
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();

        if model.contains("groq") && model.contains("compound") {
            return Self {
                system_prompt: COMPOUND_PROMPT,
                tools: &[],
            };
        }

        if model.contains("gpt-5.2") {
            return Self {
                system_prompt: TOOL_FIRST_PROMPT,
                tools: &[
                    "resolve_stock_symbol",
                    "tavily_search",
                    "serpapi_news_search",
                    "yfinance_stock_summary",
                    "alphavantage_stock_quote",
                ],
            };
        }

        Self {
            system_prompt: DEFAULT_PROMPT,
            tools: &[
                "resolve_stock_symbol",
                "alphavantage_stock_quote",
                "yfinance_stock_summary",
                "tavily_search",
                "serpapi_news_search",
            ],
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.tools.contains(&tool_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_models_get_no_tools() {
        let profile = AgentProfile::for_model("groq:compound-beta");
        assert!(profile.tools.is_empty());
        assert!(!profile.allows("resolve_stock_symbol"));
    }

    #[test]
    fn test_default_profile_resolves_symbols_first() {
        let profile = AgentProfile::for_model("groq:qwen/qwen3-32b");
        assert_eq!(profile.tools[0], "resolve_stock_symbol");
        assert!(profile.system_prompt.contains("resolve_stock_symbol' first"));
        assert!(!profile.allows("finnhub_stock_news"));
    }

    #[test]
    fn test_gpt_profile_mandates_tools() {
        let profile = AgentProfile::for_model("openai:GPT-5.2");
        assert!(profile.system_prompt.contains("Always use tools"));
        assert_eq!(profile.tools.len(), 5);
    }
}
