//! Financial Sight
//!
//! A conversational financial assistant service:
//! - Resolves company names to exchange ticker symbols
//! - Fetches quotes, summaries and news from market data providers
//! - Answers through a tool-calling LLM agent
//! - Keeps a per-user, per-session conversation log
//!
//! REQUEST FLOW:
//! AUTHENTICATE → VALIDATE → LOAD HISTORY → INVOKE AGENT → PERSIST → RESPOND

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod models;
pub mod service;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use config::AppConfig;
pub use models::*;
pub use service::ChatService;
