//! Gemini API client
//!
//! Implements `ChatModel` on top of `generateContent` with function calling.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::agent::{AgentMessage, ChatModel, ModelReply, ModelRequest, ToolCall};
use crate::error::ChatError;
use crate::tools::ToolSpec;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    default_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, default_model: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key,
            default_model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Gemini model id for a requested chat model. Non-Gemini names run on
    /// the configured default model.
    pub fn model_for(&self, requested: &str) -> String {
        let requested = requested.trim();
        if requested.starts_with("gemini") {
            requested.to_string()
        } else {
            self.default_model.clone()
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for GeminiClient {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply> {
        if self.api_key.is_empty() {
            return Err(ChatError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let model = self.model_for(request.model);
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let body = build_request(request.system_prompt, request.messages, request.tools);

        info!(model = %model, "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                ChatError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(ChatError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            ChatError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        parse_reply(gemini_response)
    }
}

fn build_request(system_prompt: &str, messages: &[AgentMessage], tools: &[ToolSpec]) -> GeminiRequest {
    let contents = messages.iter().map(to_content).collect();

    let tools = if tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolDeclarations {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    };

    GeminiRequest {
        contents,
        tools,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
        },
        system_instruction: SystemInstruction {
            parts: vec![Part::text(system_prompt)],
        },
    }
}

fn to_content(message: &AgentMessage) -> Content {
    match message {
        AgentMessage::User(text) => Content {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        },
        AgentMessage::Assistant(text) => Content {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        },
        AgentMessage::ToolCalls(calls) => Content {
            role: "model".to_string(),
            parts: calls
                .iter()
                .map(|c| Part {
                    function_call: Some(FunctionCall {
                        name: c.name.clone(),
                        args: c.args.clone(),
                    }),
                    ..Part::default()
                })
                .collect(),
        },
        AgentMessage::ToolResults(results) => Content {
            role: "user".to_string(),
            parts: results
                .iter()
                .map(|r| Part {
                    function_response: Some(FunctionResponse {
                        name: r.name.clone(),
                        // The API requires an object here
                        response: if r.output.is_object() {
                            r.output.clone()
                        } else {
                            json!({ "result": r.output })
                        },
                    }),
                    ..Part::default()
                })
                .collect(),
        },
    }
}

fn parse_reply(response: GeminiResponse) -> Result<ModelReply> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::LlmError("No response from Gemini API".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let calls: Vec<ToolCall> = parts
        .iter()
        .filter_map(|p| p.function_call.as_ref())
        .map(|fc| ToolCall {
            name: fc.name.clone(),
            args: if fc.args.is_null() { json!({}) } else { fc.args.clone() },
        })
        .collect();

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }

    let text: String = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ChatError::LlmError(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(ModelReply::Text(text))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}
