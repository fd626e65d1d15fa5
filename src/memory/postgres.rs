//! Postgres-backed conversation store

use crate::error::ChatError;
use crate::memory::store::{expand_recent, ConversationStore};
use crate::models::{ChatMessage, ChatTurn, SessionSummary};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct PostgresConversationStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresConversationStore {
    /// Create a store whose pool connects on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversation_logs (
                      id BIGSERIAL PRIMARY KEY,
                      session_id TEXT NOT NULL,
                      user_email TEXT NOT NULL,
                      timestamp TIMESTAMPTZ NOT NULL,
                      user_input TEXT NOT NULL,
                      response TEXT NOT NULL,
                      model TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_conversation_logs_scope_time
                    ON conversation_logs (user_email, session_id, timestamp);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                ChatError::Persistence(format!(
                    "Failed to initialize conversation log schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn append(&self, turn: ChatTurn) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_logs
              (session_id, user_email, timestamp, user_input, response, model)
            VALUES
              ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&turn.session_id)
        .bind(&turn.user_email)
        .bind(turn.timestamp)
        .bind(&turn.user_input)
        .bind(&turn.response)
        .bind(&turn.model)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Persistence(format!("Failed to insert chat turn: {}", e)))?;

        Ok(())
    }

    async fn history(
        &self,
        session_id: &str,
        user_email: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>> {
        self.ensure_schema().await?;

        // NULL limit means no limit in Postgres
        let limit = limit.map(|l| l as i64);

        let rows = sqlx::query(
            r#"
            SELECT session_id, user_email, timestamp, user_input, response, model
            FROM conversation_logs
            WHERE session_id = $1 AND user_email = $2
            ORDER BY timestamp DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(session_id)
        .bind(user_email)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::Persistence(format!("Failed to load history: {}", e)))?;

        let mut turns = rows
            .iter()
            .map(turn_from_row)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        turns.reverse();

        Ok(expand_recent(turns, None))
    }

    async fn list_sessions(&self, user_email: &str) -> Result<Vec<SessionSummary>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (session_id)
              session_id,
              user_input AS first_message,
              MAX(timestamp) OVER (PARTITION BY session_id) AS last_timestamp
            FROM conversation_logs
            WHERE user_email = $1
            ORDER BY session_id, timestamp ASC, id ASC
            "#,
        )
        .bind(user_email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::Persistence(format!("Failed to list sessions: {}", e)))?;

        let mut sessions = rows
            .iter()
            .map(|row| {
                Ok(SessionSummary {
                    session_id: row.try_get("session_id")?,
                    first_message: row.try_get("first_message")?,
                    last_timestamp: row.try_get::<DateTime<Utc>, _>("last_timestamp")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        sessions.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        Ok(sessions)
    }

    async fn purge(&self, session_id: &str, user_email: &str) -> Result<u64> {
        self.ensure_schema().await?;

        let result =
            sqlx::query("DELETE FROM conversation_logs WHERE session_id = $1 AND user_email = $2")
                .bind(session_id)
                .bind(user_email)
                .execute(&self.pool)
                .await
                .map_err(|e| ChatError::Persistence(format!("Failed to purge session: {}", e)))?;

        Ok(result.rows_affected())
    }
}

fn turn_from_row(row: &sqlx::postgres::PgRow) -> std::result::Result<ChatTurn, sqlx::Error> {
    Ok(ChatTurn {
        session_id: row.try_get("session_id")?,
        user_email: row.try_get("user_email")?,
        timestamp: row.try_get("timestamp")?,
        user_input: row.try_get("user_input")?,
        response: row.try_get("response")?,
        model: row.try_get("model")?,
    })
}
