//! Room registry
//!
//! Maps chat ids to active rooms. The registry is a volatile cache in front
//! of the [`ChatStore`]: rooms appear when a chat is created or first joined
//! and disappear when their last member leaves.
//!
//! Lock order is always registry, then room. Neither lock is held across a
//! store call or a send.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ChatError, StoreError};
use crate::room::Room;
use crate::session::ClientSession;
use crate::store::{Chat, ChatStore};
use crate::types::{ChatId, ClientId, ConnectionId};

pub struct RoomRegistry {
    rooms: RwLock<HashMap<ChatId, Arc<Room>>>,
    store: Arc<dyn ChatStore>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Active room for `chat_id`, without consulting the store
    pub async fn get(&self, chat_id: &ChatId) -> Option<Arc<Room>> {
        self.rooms.read().await.get(chat_id).cloned()
    }

    /// Active room for `chat_id`, hydrating it from the store on a miss
    ///
    /// Fails with `NotFound` if the store has no such chat. Concurrent
    /// callers always observe the same room object.
    pub async fn lookup_or_load(&self, chat_id: &ChatId) -> Result<Arc<Room>, ChatError> {
        if let Some(room) = self.get(chat_id).await {
            return Ok(room);
        }

        let chat = self.store.get_chat(chat_id).await.map_err(|e| match e {
            StoreError::NotFound(id) => ChatError::NotFound(id),
            other => ChatError::Store(other),
        })?;
        debug!("Loaded chat {} ({}) from store", chat.id, chat.name);

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(chat_id.clone())
            .or_insert_with(|| Arc::new(Room::new(chat_id.clone())));
        Ok(Arc::clone(room))
    }

    /// Create a chat and its room
    ///
    /// Fails with `AlreadyExists` if the room is active or the store already
    /// has the record. Nothing is inserted if the store fails.
    pub async fn create(&self, chat_id: &ChatId, name: &str) -> Result<Arc<Room>, ChatError> {
        if self.get(chat_id).await.is_some() {
            return Err(ChatError::AlreadyExists(chat_id.clone()));
        }

        match self.store.get_chat(chat_id).await {
            Ok(_) => return Err(ChatError::AlreadyExists(chat_id.clone())),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        self.store
            .create_chat(chat_id, name)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(id) => ChatError::AlreadyExists(id),
                other => ChatError::Store(other),
            })?;

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(chat_id.clone())
            .or_insert_with(|| Arc::new(Room::new(chat_id.clone())));
        debug!("Chat {} created as '{}'", chat_id, name);
        Ok(Arc::clone(room))
    }

    /// Add a session to its chat's room, loading the room if needed
    ///
    /// If the room is evicted between lookup and insert, the lookup is
    /// retried against a fresh room.
    pub async fn join(&self, session: ClientSession) -> Result<Arc<Room>, ChatError> {
        loop {
            let room = self.lookup_or_load(&session.chat_id).await?;
            match room.add_member(session.clone()).await {
                Ok(()) => return Ok(room),
                Err(ChatError::RoomClosed(_)) => {
                    debug!("Room {} closed during join, retrying", session.chat_id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove a client from a room, evicting the room if it empties
    ///
    /// Returns whether the room was evicted.
    pub async fn leave(&self, chat_id: &ChatId, client_id: &ClientId) -> Result<bool, ChatError> {
        let room = self
            .get(chat_id)
            .await
            .ok_or_else(|| ChatError::UnknownChat(chat_id.clone()))?;

        let now_empty = room
            .remove_member(client_id)
            .await
            .ok_or_else(|| ChatError::NotAMember {
                chat_id: chat_id.clone(),
                client_id: client_id.clone(),
            })?;

        Ok(now_empty && self.evict_room(&room).await)
    }

    /// Like [`leave`](Self::leave), but only removes the session if it was
    /// opened by `connection_id`
    pub async fn leave_connection(
        &self,
        chat_id: &ChatId,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Result<bool, ChatError> {
        let room = self
            .get(chat_id)
            .await
            .ok_or_else(|| ChatError::UnknownChat(chat_id.clone()))?;

        let now_empty = room
            .remove_member_of(client_id, connection_id)
            .await
            .ok_or_else(|| ChatError::NotAMember {
                chat_id: chat_id.clone(),
                client_id: client_id.clone(),
            })?;

        Ok(now_empty && self.evict_room(&room).await)
    }

    /// Remove the room for `chat_id` if it has no members
    ///
    /// Returns whether a room was removed.
    pub async fn evict_if_empty(&self, chat_id: &ChatId) -> bool {
        match self.get(chat_id).await {
            Some(room) => self.evict_room(&room).await,
            None => false,
        }
    }

    /// Evict this exact room object if it is still registered and empty
    async fn evict_room(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.write().await;
        let registered = rooms
            .get(&room.chat_id)
            .is_some_and(|current| Arc::ptr_eq(current, room));
        if !registered {
            return false;
        }

        // Closing under the registry write lock keeps joiners that still
        // hold this Arc from attaching to it.
        if room.close_if_empty().await {
            rooms.remove(&room.chat_id);
            debug!("Room {} evicted (empty)", room.chat_id);
            true
        } else {
            false
        }
    }

    /// All chats known to the store
    pub async fn get_chats(&self) -> Result<Vec<Chat>, ChatError> {
        Ok(self.store.list_chats().await?)
    }

    /// Number of active rooms
    pub async fn active_rooms(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Check if a room is active for `chat_id`
    pub async fn is_active(&self, chat_id: &ChatId) -> bool {
        self.rooms.read().await.contains_key(chat_id)
    }
}
