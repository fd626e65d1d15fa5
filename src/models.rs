//! Core data models for the financial chat service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//
// ================= Conversation =================
//

/// One user/assistant exchange, persisted after a successful answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_email: String,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub response: String,
    pub model: String,
}

impl ChatTurn {
    pub fn new(
        session_id: impl Into<String>,
        user_email: impl Into<String>,
        user_input: impl Into<String>,
        response: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_email: user_email.into(),
            timestamp: Utc::now(),
            user_input: user_input.into(),
            response: response.into(),
            model: model.into(),
        }
    }

    /// Expand the turn into its two logical messages (user, then assistant).
    pub fn into_messages(self) -> [ChatMessage; 2] {
        [
            ChatMessage::user(self.user_input),
            ChatMessage::assistant(self.response),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-session overview derived by grouping a user's turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub first_message: String,
    pub last_timestamp: DateTime<Utc>,
}

/// The caller identity established by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Result handed back to the model. Adapter failures are encoded here
    /// in the adapter's own failure shape.
    pub data: serde_json::Value,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self { data }
    }
}

//
// ================= Provider Records =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockQuote {
    pub symbol: String,
    pub price: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockSummary {
    pub symbol: String,
    pub long_name: Option<String>,
    pub current_price: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub market_cap: Option<f64>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
