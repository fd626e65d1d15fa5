//! Error types for the financial chat service

use thiserror::Error;

/// Result type alias for chat service operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {

    // =============================
    // Request Errors
    // =============================

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    // =============================
    // Tool & Provider Errors
    // =============================

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("'{0}' is not a publicly listed stock")]
    NotListed(String),

    #[error("Symbol search unavailable: {0}")]
    SymbolSearchUnavailable(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // Agent & Persistence Errors
    // =============================

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ChatError {
    /// Errors that should be reported to the caller verbatim rather than as a
    /// generic internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::Unauthorized | ChatError::Validation(_))
    }
}
