//! Conversation store trait and in-memory backend

use crate::models::{ChatMessage, ChatTurn, SessionSummary};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for chat turn persistence
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert one turn.
    async fn append(&self, turn: ChatTurn) -> Result<()>;

    /// Up to `limit` most recent turns of the (session, user) pair, oldest
    /// first, each expanded into a user message followed by an assistant
    /// message.
    async fn history(
        &self,
        session_id: &str,
        user_email: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>>;

    /// One summary per session of the user, most recently active first.
    async fn list_sessions(&self, user_email: &str) -> Result<Vec<SessionSummary>>;

    /// Delete every turn of the (session, user) pair. Returns the number of
    /// turns removed.
    async fn purge(&self, session_id: &str, user_email: &str) -> Result<u64>;
}

/// Keep the `limit` most recent turns (input sorted oldest first) and expand
/// them into messages.
pub(crate) fn expand_recent(turns: Vec<ChatTurn>, limit: Option<usize>) -> Vec<ChatMessage> {
    let skip = match limit {
        Some(limit) => turns.len().saturating_sub(limit),
        None => 0,
    };

    turns
        .into_iter()
        .skip(skip)
        .flat_map(ChatTurn::into_messages)
        .collect()
}

/// Group turns by session id into summaries ordered by recency.
pub(crate) fn summarize_sessions<'a>(
    turns: impl IntoIterator<Item = &'a ChatTurn>,
) -> Vec<SessionSummary> {
    // session id -> (earliest turn, latest timestamp)
    let mut by_session: HashMap<&str, (&ChatTurn, DateTime<Utc>)> = HashMap::new();

    for turn in turns {
        let entry = by_session
            .entry(turn.session_id.as_str())
            .or_insert((turn, turn.timestamp));
        if turn.timestamp < entry.0.timestamp {
            entry.0 = turn;
        }
        if turn.timestamp > entry.1 {
            entry.1 = turn.timestamp;
        }
    }

    let mut summaries: Vec<SessionSummary> = by_session
        .into_values()
        .map(|(first, last_timestamp)| SessionSummary {
            session_id: first.session_id.clone(),
            first_message: first.user_input.clone(),
            last_timestamp,
        })
        .collect();
    summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    summaries
}

/// In-memory store for development and tests
pub struct InMemoryConversationStore {
    turns: Arc<RwLock<Vec<ChatTurn>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.turns.read().await.len()
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, turn: ChatTurn) -> Result<()> {
        let mut turns = self.turns.write().await;
        turns.push(turn);
        Ok(())
    }

    async fn history(
        &self,
        session_id: &str,
        user_email: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        let turns = self.turns.read().await;

        let mut matching: Vec<ChatTurn> = turns
            .iter()
            .filter(|t| t.session_id == session_id && t.user_email == user_email)
            .cloned()
            .collect();

        // Stable: equal timestamps keep insertion order
        matching.sort_by_key(|t| t.timestamp);

        Ok(expand_recent(matching, limit))
    }

    async fn list_sessions(&self, user_email: &str) -> Result<Vec<SessionSummary>> {
        let turns = self.turns.read().await;
        Ok(summarize_sessions(
            turns.iter().filter(|t| t.user_email == user_email),
        ))
    }

    async fn purge(&self, session_id: &str, user_email: &str) -> Result<u64> {
        let mut turns = self.turns.write().await;
        let before = turns.len();
        turns.retain(|t| !(t.session_id == session_id && t.user_email == user_email));
        Ok((before - turns.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::{Duration, Utc};

    fn turn_at(session: &str, email: &str, input: &str, offset_secs: i64) -> ChatTurn {
        let mut turn = ChatTurn::new(session, email, input, format!("re: {}", input), "m");
        turn.timestamp = Utc::now() + Duration::seconds(offset_secs);
        turn
    }

    #[tokio::test]
    async fn test_append_then_history_limit_one_returns_latest_pair() {
        let store = InMemoryConversationStore::new();
        store.append(turn_at("s1", "a@x.com", "first", 0)).await.unwrap();
        store.append(turn_at("s1", "a@x.com", "second", 1)).await.unwrap();

        let history = store.history("s1", "a@x.com", Some(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("second"));
        assert_eq!(history[1], ChatMessage::assistant("re: second"));
    }

    #[tokio::test]
    async fn test_history_is_oldest_first_and_limited() {
        let store = InMemoryConversationStore::new();
        for (i, q) in ["q0", "q1", "q2", "q3"].iter().enumerate() {
            store.append(turn_at("s1", "a@x.com", q, i as i64)).await.unwrap();
        }

        let history = store.history("s1", "a@x.com", Some(3)).await.unwrap();
        let users: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["q1", "q2", "q3"]);

        let all = store.history("s1", "a@x.com", None).await.unwrap();
        assert_eq!(all.len(), 8);
    }

    #[tokio::test]
    async fn test_history_isolates_users_on_session_collision() {
        let store = InMemoryConversationStore::new();
        store.append(turn_at("shared", "alice@x.com", "alice asks", 0)).await.unwrap();
        store.append(turn_at("shared", "bob@x.com", "bob asks", 1)).await.unwrap();

        let history = store.history("shared", "alice@x.com", None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| !m.content.contains("bob")));
    }

    #[tokio::test]
    async fn test_purge_then_history_is_empty_and_idempotent() {
        let store = InMemoryConversationStore::new();
        store.append(turn_at("s1", "a@x.com", "q", 0)).await.unwrap();
        store.append(turn_at("s1", "b@x.com", "q", 0)).await.unwrap();

        assert_eq!(store.purge("s1", "a@x.com").await.unwrap(), 1);
        assert!(store.history("s1", "a@x.com", None).await.unwrap().is_empty());
        assert_eq!(store.purge("s1", "a@x.com").await.unwrap(), 0);

        // Other user's turn in the same session survives
        assert_eq!(store.history("s1", "b@x.com", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_sessions_groups_and_orders_by_recency() {
        let store = InMemoryConversationStore::new();
        store.append(turn_at("old", "a@x.com", "old first", 0)).await.unwrap();
        store.append(turn_at("new", "a@x.com", "new first", 5)).await.unwrap();
        store.append(turn_at("old", "a@x.com", "old second", 10)).await.unwrap();
        store.append(turn_at("other", "b@x.com", "not mine", 20)).await.unwrap();

        let sessions = store.list_sessions("a@x.com").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "old");
        assert_eq!(sessions[0].first_message, "old first");
        assert_eq!(sessions[1].session_id, "new");
        assert!(sessions[0].last_timestamp > sessions[1].last_timestamp);
    }
}
