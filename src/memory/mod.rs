//! Conversation log
//!
//! Persists chat turns per (session, user) and serves them back as history,
//! session listings and purges.

pub mod log;
pub mod postgres;
pub mod store;

pub use log::{ConversationLog, StoreFailurePolicy};
pub use postgres::PostgresConversationStore;
pub use store::{ConversationStore, InMemoryConversationStore};

use std::sync::Arc;
use tracing::{info, warn};

/// Pick the store backend from an optional database URL.
///
/// Falls back to the in-memory store when no URL is configured or the pool
/// cannot be created.
pub fn build_store(database_url: Option<&str>) -> Arc<dyn ConversationStore> {
    if let Some(url) = database_url {
        match PostgresConversationStore::connect_lazy(url) {
            Ok(store) => {
                info!("Conversation store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres conversation store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Conversation store backend: in-memory");
    Arc::new(InMemoryConversationStore::new())
}
