//! Chat store
//!
//! Durable record of which chats exist. The registry consumes it through the
//! [`ChatStore`] trait; [`InMemoryChatStore`] is the bundled implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::ChatId;

/// Persisted chat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
}

impl Chat {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Chat store interface
///
/// Connection pooling and retries are the implementation's concern.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Look up one chat
    async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat, StoreError>;

    /// All known chats
    async fn list_chats(&self) -> Result<Vec<Chat>, StoreError>;

    /// Persist a new chat
    async fn create_chat(&self, chat_id: &ChatId, name: &str) -> Result<(), StoreError>;
}

/// In-memory chat store
///
/// Records live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryChatStore {
    chats: Mutex<BTreeMap<ChatId, Chat>>,
}

impl InMemoryChatStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `chats`
    pub fn with_chats(chats: impl IntoIterator<Item = Chat>) -> Self {
        let chats = chats
            .into_iter()
            .map(|chat| (ChatId::new(chat.id.clone()), chat))
            .collect();
        Self {
            chats: Mutex::new(chats),
        }
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat, StoreError> {
        let chats = self.chats.lock().await;
        chats
            .get(chat_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(chat_id.clone()))
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        let chats = self.chats.lock().await;
        Ok(chats.values().cloned().collect())
    }

    async fn create_chat(&self, chat_id: &ChatId, name: &str) -> Result<(), StoreError> {
        let mut chats = self.chats.lock().await;
        if chats.contains_key(chat_id) {
            return Err(StoreError::AlreadyExists(chat_id.clone()));
        }
        chats.insert(chat_id.clone(), Chat::new(chat_id.as_str(), name));
        Ok(())
    }
}
