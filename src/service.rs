//! Chat session handling
//!
//! One inbound message moves through
//! AUTHENTICATED → VALIDATED → HISTORY LOADED → AGENT INVOKED → PERSISTED → RESPONDED.
//! Nothing is written unless the agent produced an answer.

use crate::agent::{AgentRequest, AgentRuntime};
use crate::error::ChatError;
use crate::memory::ConversationLog;
use crate::models::{AuthUser, ChatMessage, ChatTurn, SessionSummary};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub session_id: String,
    /// Whether the turn reached the conversation store.
    pub persisted: bool,
}

pub struct ChatService {
    log: ConversationLog,
    agent: Arc<dyn AgentRuntime>,
    default_model: String,
    history_turns: usize,
}

impl ChatService {
    pub fn new(
        log: ConversationLog,
        agent: Arc<dyn AgentRuntime>,
        default_model: impl Into<String>,
        history_turns: usize,
    ) -> Self {
        Self {
            log,
            agent,
            default_model: default_model.into(),
            history_turns,
        }
    }

    pub fn new_session() -> String {
        Uuid::new_v4().to_string()
    }

    /// Handle one chat message for `session_id`.
    pub async fn chat(
        &self,
        user: Option<&AuthUser>,
        session_id: &str,
        message: Option<&str>,
        model: Option<&str>,
    ) -> Result<ChatReply> {
        let user = user.ok_or(ChatError::Unauthorized)?;

        let message = message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ChatError::Validation("No message provided".to_string()))?;

        if session_id.trim().is_empty() {
            return Err(ChatError::Validation("Missing session id".to_string()));
        }

        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string();

        let mut messages = self
            .log
            .history(session_id, &user.email, Some(self.history_turns))
            .await?;
        let history_len = messages.len();
        messages.push(ChatMessage::user(message));

        info!(
            session_id,
            model = %model,
            history_messages = history_len,
            "Invoking agent"
        );

        let start = Instant::now();
        let answer = self
            .agent
            .invoke(AgentRequest {
                model: model.clone(),
                messages,
            })
            .await
            .map_err(|e| {
                error!(session_id, error = %e, "Chat agent failed");
                match e {
                    ChatError::Agent(_) => e,
                    other => ChatError::Agent(other.to_string()),
                }
            })?;

        info!(
            session_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Agent answered"
        );

        let persisted = self
            .log
            .append(ChatTurn::new(session_id, &user.email, message, &answer, &model))
            .await?;

        Ok(ChatReply {
            content: answer,
            session_id: session_id.to_string(),
            persisted,
        })
    }

    pub async fn sessions(&self, user: Option<&AuthUser>) -> Result<Vec<SessionSummary>> {
        let user = user.ok_or(ChatError::Unauthorized)?;
        self.log.list_sessions(&user.email).await
    }

    pub async fn history(
        &self,
        user: Option<&AuthUser>,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        let user = user.ok_or(ChatError::Unauthorized)?;
        self.log.history(session_id, &user.email, None).await
    }

    pub async fn delete_session(&self, user: Option<&AuthUser>, session_id: &str) -> Result<u64> {
        let user = user.ok_or(ChatError::Unauthorized)?;
        let removed = self.log.purge(session_id, &user.email).await?;
        info!(session_id, removed, "Session purged");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::ScriptedModel;
    use crate::agent::{AgentMessage, ModelReply, ToolCallingAgent};
    use crate::memory::log::tests::UnavailableStore;
    use crate::memory::{InMemoryConversationStore, StoreFailurePolicy};
    use crate::tools::ToolRegistry;
    use std::sync::Mutex;

    /// Answers with a fixed text, or fails, recording each request.
    pub(crate) struct FakeAgent {
        answer: Option<String>,
        pub(crate) requests: Mutex<Vec<AgentRequest>>,
    }

    impl FakeAgent {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(answer.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl AgentRuntime for FakeAgent {
        async fn invoke(&self, request: AgentRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            self.answer
                .clone()
                .ok_or_else(|| ChatError::LlmError("upstream timeout".into()))
        }
    }

    fn alice() -> AuthUser {
        AuthUser {
            email: "alice@example.com".into(),
        }
    }

    fn service_with(
        store: Arc<InMemoryConversationStore>,
        agent: Arc<dyn AgentRuntime>,
    ) -> ChatService {
        ChatService::new(
            ConversationLog::new(store, StoreFailurePolicy::Skip),
            agent,
            "groq:qwen/qwen3-32b",
            3,
        )
    }

    #[tokio::test]
    async fn test_chat_persists_turn_and_returns_answer() {
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = FakeAgent::answering("TSLA is at 250");
        let service = service_with(store.clone(), agent.clone());

        let reply = service
            .chat(Some(&alice()), "s1", Some("tesla price?"), None)
            .await
            .unwrap();
        assert_eq!(reply.content, "TSLA is at 250");
        assert!(reply.persisted);

        let history = service.history(Some(&alice()), "s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                ChatMessage::user("tesla price?"),
                ChatMessage::assistant("TSLA is at 250")
            ]
        );
        assert_eq!(
            agent.requests.lock().unwrap()[0].model,
            "groq:qwen/qwen3-32b"
        );
    }

    #[tokio::test]
    async fn test_message_is_stored_as_sent() {
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = FakeAgent::answering("ok");
        let service = service_with(store, agent.clone());

        service
            .chat(Some(&alice()), "s1", Some("  tesla price?\n"), None)
            .await
            .unwrap();

        let history = service.history(Some(&alice()), "s1").await.unwrap();
        assert_eq!(history[0], ChatMessage::user("  tesla price?\n"));
        assert_eq!(
            agent.requests.lock().unwrap()[0].messages,
            vec![ChatMessage::user("  tesla price?\n")]
        );
    }

    #[tokio::test]
    async fn test_history_window_is_last_three_turns() {
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = FakeAgent::answering("ok");
        let service = service_with(store, agent.clone());

        for i in 0..5 {
            service
                .chat(Some(&alice()), "s1", Some(&format!("q{}", i)), Some("gemini-2.0-flash"))
                .await
                .unwrap();
        }

        let requests = agent.requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last.messages.len(), 7);
        assert_eq!(last.messages[0], ChatMessage::user("q1"));
        assert_eq!(last.messages[6], ChatMessage::user("q4"));
        assert_eq!(last.model, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_unauthenticated_requests_do_not_mutate() {
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = FakeAgent::answering("ok");
        let service = service_with(store.clone(), agent.clone());

        assert!(matches!(
            service.chat(None, "s1", Some("hi"), None).await,
            Err(ChatError::Unauthorized)
        ));
        assert!(matches!(service.sessions(None).await, Err(ChatError::Unauthorized)));
        assert!(matches!(service.history(None, "s1").await, Err(ChatError::Unauthorized)));
        assert!(matches!(
            service.delete_session(None, "s1").await,
            Err(ChatError::Unauthorized)
        ));

        assert_eq!(store.len().await, 0);
        assert!(agent.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_is_rejected_before_agent() {
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = FakeAgent::answering("ok");
        let service = service_with(store.clone(), agent.clone());

        for message in [None, Some(""), Some("   ")] {
            assert!(matches!(
                service.chat(Some(&alice()), "s1", message, None).await,
                Err(ChatError::Validation(_))
            ));
        }
        assert!(agent.requests.lock().unwrap().is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_agent_failure_persists_nothing() {
        let store = Arc::new(InMemoryConversationStore::new());
        let service = service_with(store.clone(), FakeAgent::failing());

        let err = service
            .chat(Some(&alice()), "s1", Some("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Agent(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_still_answers_under_skip_policy() {
        let service = ChatService::new(
            ConversationLog::new(Arc::new(UnavailableStore), StoreFailurePolicy::Skip),
            FakeAgent::answering("answer without memory"),
            "m",
            3,
        );

        let reply = service
            .chat(Some(&alice()), "s1", Some("hi"), None)
            .await
            .unwrap();
        assert_eq!(reply.content, "answer without memory");
        assert!(!reply.persisted);
        assert!(service.sessions(Some(&alice())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_under_fail_policy() {
        let service = ChatService::new(
            ConversationLog::new(Arc::new(UnavailableStore), StoreFailurePolicy::Fail),
            FakeAgent::answering("never used"),
            "m",
            3,
        );

        assert!(matches!(
            service.chat(Some(&alice()), "s1", Some("hi"), None).await,
            Err(ChatError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_session_then_history_is_empty() {
        let store = Arc::new(InMemoryConversationStore::new());
        let service = service_with(store, FakeAgent::answering("ok"));

        service.chat(Some(&alice()), "s1", Some("hi"), None).await.unwrap();
        assert_eq!(service.delete_session(Some(&alice()), "s1").await.unwrap(), 1);
        assert!(service.history(Some(&alice()), "s1").await.unwrap().is_empty());
        assert_eq!(service.delete_session(Some(&alice()), "s1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_with_tool_calling_agent() {
        let model = ScriptedModel::new(vec![Ok(ModelReply::Text("Hello again".into()))]);
        let agent = Arc::new(ToolCallingAgent::new(
            model.clone(),
            Arc::new(ToolRegistry::new()),
            4,
        ));
        let store = Arc::new(InMemoryConversationStore::new());
        let service = service_with(store, agent);

        let reply = service
            .chat(Some(&alice()), "s1", Some("hello"), None)
            .await
            .unwrap();
        assert_eq!(reply.content, "Hello again");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].0, vec![AgentMessage::User("hello".into())]);
    }

    #[test]
    fn test_new_sessions_are_unique_uuids() {
        let a = ChatService::new_session();
        let b = ChatService::new_session();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
