//! Room struct definition
//!
//! Represents one active chat with any number of connected members.

use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::error::ChatError;
use crate::session::ClientSession;
use crate::types::{ChatId, ClientId, ConnectionId};

/// Membership state guarded by the room lock
#[derive(Debug, Default)]
struct Members {
    sessions: BTreeMap<ClientId, ClientSession>,
    /// Set once the registry has evicted the room
    closed: bool,
}

/// Active chat room
///
/// Owned by the registry behind an `Arc`. Membership is only touched under
/// the room's own lock, and that lock is never held across a send.
#[derive(Debug)]
pub struct Room {
    /// Chat this room serves, equal to its registry key
    pub chat_id: ChatId,
    members: RwLock<Members>,
}

impl Room {
    /// Create a new empty room
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            members: RwLock::new(Members::default()),
        }
    }

    /// Add a member
    ///
    /// Fails with `AlreadyJoined` if the client id is taken, or with
    /// `RoomClosed` if the room has already been evicted.
    pub async fn add_member(&self, session: ClientSession) -> Result<(), ChatError> {
        let mut members = self.members.write().await;
        if members.closed {
            return Err(ChatError::RoomClosed(self.chat_id.clone()));
        }
        if members.sessions.contains_key(&session.client_id) {
            return Err(ChatError::AlreadyJoined {
                chat_id: self.chat_id.clone(),
                client_id: session.client_id,
            });
        }
        members.sessions.insert(session.client_id.clone(), session);
        Ok(())
    }

    /// Remove a member
    ///
    /// Returns `None` if the client was not in the room, otherwise whether
    /// the room is now empty.
    pub async fn remove_member(&self, client_id: &ClientId) -> Option<bool> {
        let mut members = self.members.write().await;
        members.sessions.remove(client_id)?;
        Some(members.sessions.is_empty())
    }

    /// Remove a member only if its session was opened by `connection_id`
    ///
    /// Used by disconnect cleanup so a stale connection never evicts a
    /// newer session that reuses the same client id.
    pub async fn remove_member_of(
        &self,
        client_id: &ClientId,
        connection_id: ConnectionId,
    ) -> Option<bool> {
        let mut members = self.members.write().await;
        let owned = members
            .sessions
            .get(client_id)
            .is_some_and(|s| s.belongs_to(connection_id));
        if !owned {
            return None;
        }
        members.sessions.remove(client_id);
        Some(members.sessions.is_empty())
    }

    /// Copy of the current members, ordered by client id
    ///
    /// `excluding` drops one client from the copy (the sender of a broadcast).
    pub async fn snapshot_members(&self, excluding: Option<&ClientId>) -> Vec<ClientSession> {
        let members = self.members.read().await;
        members
            .sessions
            .values()
            .filter(|s| Some(&s.client_id) != excluding)
            .cloned()
            .collect()
    }

    /// Mark the room closed if it has no members
    ///
    /// Returns true if the room is (now) closed. Called by the registry while
    /// it holds its own write lock.
    pub(crate) async fn close_if_empty(&self) -> bool {
        let mut members = self.members.write().await;
        if members.sessions.is_empty() {
            members.closed = true;
        }
        members.closed
    }

    /// Check if a client is in this room
    pub async fn contains(&self, client_id: &ClientId) -> bool {
        self.members.read().await.sessions.contains_key(client_id)
    }

    /// Get the number of members in the room
    pub async fn member_count(&self) -> usize {
        self.members.read().await.sessions.len()
    }

    /// Check if the room has no members
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.sessions.is_empty()
    }

    /// Check if the room has been evicted from the registry
    pub async fn is_closed(&self) -> bool {
        self.members.read().await.closed
    }
}
