//! ABOUTME: Short-Term Memory (C6)
//! ABOUTME: Session-scoped conversation log and working memory over a TTL-bounded KVStore

use ragengine_core::error::{RagError, Result};
use ragengine_core::traits::KVStore;
use ragengine_core::types::{ContributingPath, Message, Role};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn messages_key(session_id: &str) -> String {
    format!("stm:messages:{session_id}")
}

fn working_memory_key(session_id: &str) -> String {
    format!("stm:working:{session_id}")
}

/// Session-scoped short-term memory (C6): a bounded conversation log plus a
/// working-memory scratch space, both refreshed to `ttl_seconds` on every
/// write per §4.6.
pub struct ShortTermMemory {
    store: Arc<dyn KVStore>,
    ttl_seconds: u64,
}

impl ShortTermMemory {
    #[must_use]
    pub fn new(store: Arc<dyn KVStore>, ttl_seconds: u64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Append a message to `session_id`'s conversation log, tagging it with
    /// `path` (§3 `Message.metadata.path`) when one is supplied.
    ///
    /// # Errors
    /// Returns `RagError::InvalidInput` for blank `session_id`/`content`, or
    /// propagates the store's `BackendUnavailable`.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        path: Option<ContributingPath>,
    ) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(RagError::invalid_input("session_id must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(RagError::invalid_input("content must not be empty"));
        }
        let mut message = Message::new(role, content);
        if let Some(path) = path {
            message = message.with_path(path);
        }
        let value = serde_json::to_value(&message)
            .map_err(|e| RagError::internal(format!("failed to serialize message: {e}")))?;
        self.store
            .list_append(&messages_key(session_id), value, self.ttl_seconds)
            .await
    }

    /// Read conversation history, oldest-first, optionally limited to the
    /// most recent `limit` messages.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn conversation_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let raw = self.store.list_read(&messages_key(session_id), limit).await?;
        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Message>(value) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse stored message, skipping");
                    None
                }
            })
            .collect())
    }

    /// Store a single working-memory item for `session_id`.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn store_working_memory(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        self.store
            .hash_set(&working_memory_key(session_id), key, value, self.ttl_seconds)
            .await
    }

    /// Read a single working-memory item; `None` if unset or expired.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn working_memory(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        self.store.hash_get(&working_memory_key(session_id), key).await
    }

    /// Read every working-memory item for `session_id`.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn all_working_memory(&self, session_id: &str) -> Result<HashMap<String, Value>> {
        self.store.hash_get_all(&working_memory_key(session_id)).await
    }

    /// Atomically clear a session's conversation log and working memory.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.store.delete(&messages_key(session_id)).await?;
        self.store.delete(&working_memory_key(session_id)).await
    }

    /// Whether `session_id` has any live conversation or working-memory data.
    ///
    /// # Errors
    /// Propagates the store's `BackendUnavailable`.
    pub async fn session_exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.store.exists(&messages_key(session_id)).await?
            || self.store.exists(&working_memory_key(session_id)).await?)
    }
}
