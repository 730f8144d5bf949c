//! Client session and connection handle
//!
//! A `ClientSession` is one connection's membership in one room. The
//! connection handle it carries is a clone of the connection's outbound
//! channel; the socket itself stays with the transport's writer task.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Frame;
use crate::types::{ChatId, ClientId, ConnectionId};

/// Outbound side of one live connection
///
/// Cheap to clone. Frames pushed here are written to the socket by the
/// connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Identifier of the underlying socket
    pub id: ConnectionId,
    /// Server → Client frame channel
    sender: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Frame>) -> Self {
        Self { id, sender }
    }

    /// Send a frame to this connection
    ///
    /// Waits while the writer's buffer is full. Returns an error if the
    /// channel is closed (client disconnected).
    pub async fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Send a frame without waiting
    ///
    /// Drops the frame with `SendError::Full` when the writer's buffer has
    /// no room.
    pub fn try_send(&self, frame: Frame) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Send a frame, giving up after `timeout`
    pub async fn send_timeout(&self, frame: Frame, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Check if the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Membership of one connection in one room
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Client identity inside the room
    pub client_id: ClientId,
    /// Room this session belongs to
    pub chat_id: ChatId,
    /// Borrowed outbound channel of the connection
    pub conn: ConnectionHandle,
}

impl ClientSession {
    pub fn new(client_id: ClientId, chat_id: ChatId, conn: ConnectionHandle) -> Self {
        Self {
            client_id,
            chat_id,
            conn,
        }
    }

    /// Deliver a frame to this member within `timeout`
    pub async fn deliver(&self, frame: Frame, timeout: Duration) -> Result<(), SendError> {
        self.conn.send_timeout(frame, timeout).await
    }

    /// Whether this session was opened by the given connection
    pub fn belongs_to(&self, connection_id: ConnectionId) -> bool {
        self.conn.id == connection_id
    }
}
