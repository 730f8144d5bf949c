//! Error types for the chat relay
//!
//! Defines connection-level errors, chat operation errors, store errors and
//! message send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::{ChatId, ClientId};

/// Connection-level errors
///
/// Fatal for the one connection that produced them, never for the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat operation errors
///
/// Returned by the registry, rooms and the action router. Everything except
/// `Protocol` is reported back to the client and the connection continues.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Chat is neither active nor known to the store
    #[error("chat {0} not found")]
    NotFound(ChatId),

    /// Leave for a chat that has no active room
    #[error("unknown chat {0}")]
    UnknownChat(ChatId),

    /// Leave for a client that is not in the room
    #[error("client {client_id} is not a member of chat {chat_id}")]
    NotAMember { chat_id: ChatId, client_id: ClientId },

    /// Create for a chat that already exists
    #[error("chat {0} already exists")]
    AlreadyExists(ChatId),

    /// Join with a client id that is already in the room
    #[error("client {client_id} already joined chat {chat_id}")]
    AlreadyJoined { chat_id: ChatId, client_id: ClientId },

    /// Room was evicted while a join was in flight (retried internally)
    #[error("chat {0} was closed")]
    RoomClosed(ChatId),

    /// Malformed inbound frame (fatal for the connection)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Outbound delivery failed
    #[error(transparent)]
    Send(#[from] SendError),

    /// Chat store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Whether this error must terminate the connection's read loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::Protocol(_))
    }
}

/// Chat store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No chat record with this id
    #[error("chat record {0} not found")]
    NotFound(ChatId),

    /// A chat record with this id already exists
    #[error("chat record {0} already exists")]
    AlreadyExists(ChatId),

    /// Backend unavailable or failed
    #[error("chat store unavailable: {0}")]
    Unavailable(String),
}

/// Message send errors
///
/// Occurs when a connection or the dispatcher queue cannot accept a frame.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the connection channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection's outbound buffer is full and the frame was dropped
    #[error("Outbound buffer full")]
    Full,

    /// The connection did not accept the frame within the delivery timeout
    #[error("Delivery timed out")]
    Timeout,

    /// The dispatcher queue is no longer being drained
    #[error("Dispatcher queue closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_protocol_errors_are_fatal() {
        assert!(ChatError::Protocol("bad".to_string()).is_fatal());
        assert!(!ChatError::NotFound(ChatId::new("r1")).is_fatal());
        assert!(!ChatError::Send(SendError::Timeout).is_fatal());
        assert!(!ChatError::Store(StoreError::Unavailable("down".to_string())).is_fatal());
    }

    #[test]
    fn test_error_messages_name_ids() {
        let err = ChatError::AlreadyJoined {
            chat_id: ChatId::new("r3"),
            client_id: ClientId::new("A"),
        };
        assert_eq!(err.to_string(), "client A already joined chat r3");

        let err: ChatError = StoreError::NotFound(ChatId::new("zz")).into();
        assert_eq!(err.to_string(), "chat record zz not found");
    }
}
