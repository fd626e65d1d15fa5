//! Store access with an explicit failure policy
//!
//! The chat flow must not depend on the store being reachable unless the
//! deployment asks for it. `ConversationLog` applies that choice in one place.

use crate::error::ChatError;
use crate::memory::store::ConversationStore;
use crate::models::{ChatMessage, ChatTurn, SessionSummary};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do when the conversation store fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Log and continue: appends are dropped, reads come back empty.
    #[default]
    Skip,
    /// Propagate store errors to the caller.
    Fail,
}

impl FromStr for StoreFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(StoreFailurePolicy::Skip),
            "fail" => Ok(StoreFailurePolicy::Fail),
            other => Err(format!("expected 'skip' or 'fail', got '{}'", other)),
        }
    }
}

impl fmt::Display for StoreFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreFailurePolicy::Skip => "skip",
            StoreFailurePolicy::Fail => "fail",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<dyn ConversationStore>,
    policy: StoreFailurePolicy,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn ConversationStore>, policy: StoreFailurePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> StoreFailurePolicy {
        self.policy
    }

    /// Persist a turn. Returns whether the turn was written.
    pub async fn append(&self, turn: ChatTurn) -> Result<bool> {
        let session_id = turn.session_id.clone();
        match self.store.append(turn).await {
            Ok(()) => {
                debug!(session_id = %session_id, "Chat turn persisted");
                Ok(true)
            }
            Err(e) => self.on_failure("append", e).map(|()| false),
        }
    }

    pub async fn history(
        &self,
        session_id: &str,
        user_email: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        match self.store.history(session_id, user_email, limit).await {
            Ok(messages) => Ok(messages),
            Err(e) => self.on_failure("history", e).map(|()| Vec::new()),
        }
    }

    pub async fn list_sessions(&self, user_email: &str) -> Result<Vec<SessionSummary>> {
        match self.store.list_sessions(user_email).await {
            Ok(sessions) => Ok(sessions),
            Err(e) => self.on_failure("list_sessions", e).map(|()| Vec::new()),
        }
    }

    /// Purges always propagate failures: the caller asked for a mutation and
    /// must learn that it did not happen.
    pub async fn purge(&self, session_id: &str, user_email: &str) -> Result<u64> {
        self.store
            .purge(session_id, user_email)
            .await
            .map_err(|e| ChatError::Persistence(format!("Failed to purge session: {}", e)))
    }

    fn on_failure(&self, operation: &str, error: ChatError) -> Result<()> {
        match self.policy {
            StoreFailurePolicy::Skip => {
                warn!(
                    operation,
                    error = %error,
                    "Conversation store unavailable, continuing without persistence"
                );
                Ok(())
            }
            StoreFailurePolicy::Fail => Err(ChatError::Persistence(format!(
                "Conversation store {} failed: {}",
                operation, error
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::InMemoryConversationStore;

    /// A store whose every operation fails, standing in for an unreachable
    /// database.
    pub(crate) struct UnavailableStore;

    #[async_trait::async_trait]
    impl ConversationStore for UnavailableStore {
        async fn append(&self, _turn: ChatTurn) -> Result<()> {
            Err(ChatError::Persistence("connection refused".into()))
        }

        async fn history(
            &self,
            _session_id: &str,
            _user_email: &str,
            _limit: Option<usize>,
        ) -> Result<Vec<ChatMessage>> {
            Err(ChatError::Persistence("connection refused".into()))
        }

        async fn list_sessions(&self, _user_email: &str) -> Result<Vec<SessionSummary>> {
            Err(ChatError::Persistence("connection refused".into()))
        }

        async fn purge(&self, _session_id: &str, _user_email: &str) -> Result<u64> {
            Err(ChatError::Persistence("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_skip_policy_swallows_store_failures() {
        let log = ConversationLog::new(Arc::new(UnavailableStore), StoreFailurePolicy::Skip);

        let written = log
            .append(ChatTurn::new("s", "a@x.com", "q", "a", "m"))
            .await
            .unwrap();
        assert!(!written);
        assert!(log.history("s", "a@x.com", Some(3)).await.unwrap().is_empty());
        assert!(log.list_sessions("a@x.com").await.unwrap().is_empty());
        assert!(log.purge("s", "a@x.com").await.is_err());
    }

    #[tokio::test]
    async fn test_fail_policy_propagates() {
        let log = ConversationLog::new(Arc::new(UnavailableStore), StoreFailurePolicy::Fail);

        let result = log.history("s", "a@x.com", None).await;
        assert!(matches!(result, Err(ChatError::Persistence(_))));
        assert!(log.append(ChatTurn::new("s", "a@x.com", "q", "a", "m")).await.is_err());
    }

    #[tokio::test]
    async fn test_healthy_store_passes_through() {
        let log = ConversationLog::new(
            Arc::new(InMemoryConversationStore::new()),
            StoreFailurePolicy::Fail,
        );
        let written = log
            .append(ChatTurn::new("s", "a@x.com", "q", "a", "m"))
            .await
            .unwrap();
        assert!(written);
        assert_eq!(log.history("s", "a@x.com", None).await.unwrap().len(), 2);
    }

    #[test]
    fn test_policy_parses_case_insensitively() {
        assert_eq!("SKIP".parse::<StoreFailurePolicy>(), Ok(StoreFailurePolicy::Skip));
        assert_eq!("fail".parse::<StoreFailurePolicy>(), Ok(StoreFailurePolicy::Fail));
        assert!("retry".parse::<StoreFailurePolicy>().is_err());
    }
}
