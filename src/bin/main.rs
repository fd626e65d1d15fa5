use financial_sight::{
    agent::ToolCallingAgent,
    config::AppConfig,
    gemini::GeminiClient,
    memory::{ConversationLog, InMemoryConversationStore},
    models::AuthUser,
    service::ChatService,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUESTION: &str = "What is the latest price and news for Reliance Industries?";

/// Ask the agent a single question from the command line and print the answer.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = AppConfig::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let question = if args.is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        args.join(" ")
    };

    let registry = Arc::new(create_default_registry(&config)?);
    let model = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    )?);
    let agent = Arc::new(ToolCallingAgent::new(model, registry, config.max_tool_rounds));

    let service = ChatService::new(
        ConversationLog::new(
            Arc::new(InMemoryConversationStore::new()),
            config.store_failure_policy,
        ),
        agent,
        config.default_chat_model.clone(),
        config.history_turns,
    );

    let user = AuthUser {
        email: "console@localhost".to_string(),
    };
    let session_id = ChatService::new_session();

    info!(session_id = %session_id, question = %question, "Asking agent");

    let reply = service
        .chat(Some(&user), &session_id, Some(&question), None)
        .await?;

    println!("{}", reply.content);

    Ok(())
}
