use financial_sight::{
    agent::ToolCallingAgent,
    api::{start_server, ApiState},
    auth::SessionSigner,
    config::AppConfig,
    gemini::GeminiClient,
    memory::{build_store, ConversationLog},
    service::ChatService,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let signer = SessionSigner::new(config.require_session_secret()?)?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set, chat requests will fail");
    }

    info!(
        port = config.port,
        default_model = %config.default_chat_model,
        "Financial Sight API server"
    );

    // Create components
    let store = build_store(config.database_url.as_deref());
    let log = ConversationLog::new(store, config.store_failure_policy);
    info!(policy = %log.policy(), "Conversation log ready");
    let registry = Arc::new(create_default_registry(&config)?);
    info!(tools = ?registry.list(), "Tool registry ready");

    let model = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    )?);
    let agent = Arc::new(ToolCallingAgent::new(model, registry, config.max_tool_rounds));

    let service = Arc::new(ChatService::new(
        log,
        agent,
        config.default_chat_model.clone(),
        config.history_turns,
    ));

    start_server(ApiState { service, signer }, config.port).await?;

    Ok(())
}
