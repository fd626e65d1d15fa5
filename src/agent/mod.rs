//! Agent runtime
//!
//! The request handler only sees `AgentRuntime`. The shipped runtime is a
//! tool-calling loop: ask the model, run whatever tools it calls, feed the
//! results back, stop at the first plain-text answer.

pub mod profiles;

pub use profiles::AgentProfile;

use crate::error::ChatError;
use crate::models::{ChatMessage, Role, ToolInput};
use crate::tools::{ToolRegistry, ToolSpec};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Conversation handed to the agent: prior history plus the new user
/// message as the last element.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Produce the final answer text for the conversation.
    async fn invoke(&self, request: AgentRequest) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub output: Value,
}

/// A message in the model-facing conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    User(String),
    Assistant(String),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
}

impl From<ChatMessage> for AgentMessage {
    fn from(message: ChatMessage) -> Self {
        match message.role {
            Role::User => AgentMessage::User(message.content),
            Role::Assistant => AgentMessage::Assistant(message.content),
        }
    }
}

pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [AgentMessage],
    pub tools: &'a [ToolSpec],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

/// One completion step of a tool-calling LLM
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelReply>;
}

pub struct ToolCallingAgent {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    max_rounds: usize,
}

impl ToolCallingAgent {
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>, max_rounds: usize) -> Self {
        Self {
            model,
            registry,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Run one tool call. Failures become `{"error": ...}` results so the
    /// model can decide how to report them.
    async fn run_tool(&self, profile: &AgentProfile, call: &ToolCall) -> Value {
        let tool = match self.registry.get(&call.name) {
            Some(tool) if profile.allows(&call.name) => tool,
            _ => {
                warn!(tool_name = %call.name, "Model called a tool that is not available");
                return json!({ "error": ChatError::ToolNotFound(call.name.clone()).to_string() });
            }
        };

        let input = ToolInput {
            tool_name: call.name.clone(),
            parameters: call.args.clone(),
        };

        let start = Instant::now();
        let output = match tool.execute(&input).await {
            Ok(output) => output.data,
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Tool execution failed");
                json!({ "error": e.to_string() })
            }
        };

        debug!(
            tool_name = %call.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool call finished"
        );

        output
    }
}

#[async_trait::async_trait]
impl AgentRuntime for ToolCallingAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<String> {
        let profile = AgentProfile::for_model(&request.model);
        let tools = self.registry.specs(profile.tools);

        let mut conversation: Vec<AgentMessage> =
            request.messages.into_iter().map(AgentMessage::from).collect();

        for round in 1..=self.max_rounds {
            let reply = self
                .model
                .complete(ModelRequest {
                    model: &request.model,
                    system_prompt: profile.system_prompt,
                    messages: &conversation,
                    tools: &tools,
                })
                .await?;

            match reply {
                ModelReply::Text(answer) => {
                    info!(round, "Agent produced final answer");
                    return Ok(answer);
                }
                ModelReply::ToolCalls(calls) => {
                    debug!(round, calls = calls.len(), "Model requested tool calls");

                    // Sequential on purpose: later calls may depend on earlier ones
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(ToolResult {
                            name: call.name.clone(),
                            output: self.run_tool(&profile, call).await,
                        });
                    }

                    conversation.push(AgentMessage::ToolCalls(calls));
                    conversation.push(AgentMessage::ToolResults(results));
                }
            }
        }

        Err(ChatError::Agent(format!(
            "No final answer after {} model rounds",
            self.max_rounds
        )))
    }
}
