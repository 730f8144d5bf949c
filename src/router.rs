//! Action router
//!
//! Per-connection state machine. Decodes inbound frames into actions and
//! applies them to the registry and the dispatcher queue. Tracks the
//! memberships this connection opened so they can be released on
//! disconnect.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dispatcher::{DispatcherHandle, OutboundMessage};
use crate::error::ChatError;
use crate::message::{Action, Frame};
use crate::registry::RoomRegistry;
use crate::session::{ClientSession, ConnectionHandle};
use crate::types::{ChatId, ClientId};

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket accepted, no frame decoded yet
    Connected,
    /// At least one frame decoded successfully
    Active,
    /// Cleanup done (terminal)
    Disconnected,
}

pub struct ActionRouter {
    conn: ConnectionHandle,
    registry: Arc<RoomRegistry>,
    dispatcher: DispatcherHandle,
    announce_departures: bool,
    state: ConnectionState,
    /// (chat, client) pairs joined through this connection, oldest first
    memberships: Vec<(ChatId, ClientId)>,
}

impl ActionRouter {
    pub fn new(
        conn: ConnectionHandle,
        registry: Arc<RoomRegistry>,
        dispatcher: DispatcherHandle,
        announce_departures: bool,
    ) -> Self {
        Self {
            conn,
            registry,
            dispatcher,
            announce_departures,
            state: ConnectionState::Connected,
            memberships: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Memberships currently held by this connection
    pub fn memberships(&self) -> &[(ChatId, ClientId)] {
        &self.memberships
    }

    /// Process one inbound frame
    ///
    /// Non-fatal action errors are logged and reported to the client as an
    /// error frame. The report is dropped if the client is not draining its
    /// outbound buffer. Only a protocol error is returned, and the caller
    /// must stop reading from the connection.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<(), ChatError> {
        if self.state == ConnectionState::Disconnected {
            return Err(ChatError::Protocol("connection already closed".to_string()));
        }

        let action = Action::decode(frame)?;
        self.state = ConnectionState::Active;

        let chat_id = action.chat_id().to_string();
        if let Err(e) = self.handle_action(action).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Action failed on connection {}: {}", self.conn.id, e);
            if let Err(send_err) = self.conn.try_send(Frame::error(&chat_id, &e)) {
                debug!(
                    "Could not report error to connection {}: {}",
                    self.conn.id, send_err
                );
            }
        }
        Ok(())
    }

    /// Apply a decoded action
    pub async fn handle_action(&mut self, action: Action) -> Result<(), ChatError> {
        match action {
            Action::JoinChat { chat_id, sender } => {
                debug!("Handle join chat: {} -> {}", sender, chat_id);
                let session = ClientSession::new(sender.clone(), chat_id.clone(), self.conn.clone());
                self.registry.join(session).await?;
                self.memberships.push((chat_id, sender));
                Ok(())
            }
            Action::LeaveChat { chat_id, sender } => {
                debug!("Handle leave chat: {} <- {}", sender, chat_id);
                self.registry.leave(&chat_id, &sender).await?;
                self.memberships
                    .retain(|(c, s)| !(c == &chat_id && s == &sender));
                Ok(())
            }
            Action::SendMessage {
                chat_id,
                sender,
                kind,
                content,
            } => {
                debug!("Handle {}: {} in {}", kind.action(), sender, chat_id);
                let frame = Frame {
                    action: kind.action().to_string(),
                    content,
                    sender: sender.to_string(),
                    chat_id: chat_id.to_string(),
                };
                self.dispatcher
                    .enqueue(OutboundMessage {
                        chat_id,
                        sender,
                        frame,
                    })
                    .await?;
                Ok(())
            }
            Action::CreateChat {
                chat_id,
                sender,
                name,
            } => {
                debug!("Handle create chat: {} by {}", chat_id, sender);
                self.registry.create(&chat_id, &name).await?;
                Ok(())
            }
            Action::Unknown { action } => {
                debug!("Ignoring unknown action '{}' on {}", action, self.conn.id);
                Ok(())
            }
        }
    }

    /// Release everything this connection holds
    ///
    /// Performs a leave for each membership opened here. Rooms that still
    /// have members get a "<client> left chat" notice when departures are
    /// announced. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        let was_active = self.state == ConnectionState::Active;
        self.state = ConnectionState::Disconnected;
        if !was_active {
            return;
        }

        for (chat_id, client_id) in std::mem::take(&mut self.memberships) {
            match self
                .registry
                .leave_connection(&chat_id, &client_id, self.conn.id)
                .await
            {
                Ok(evicted) => {
                    debug!("Client {} left chat {} on disconnect", client_id, chat_id);
                    if !evicted && self.announce_departures {
                        let notice = OutboundMessage {
                            frame: Frame::left_notice(&chat_id, &client_id),
                            chat_id,
                            sender: client_id,
                        };
                        // Best effort
                        let _ = self.dispatcher.enqueue(notice).await;
                    }
                }
                Err(e) => {
                    debug!("Disconnect cleanup for {} in {}: {}", client_id, chat_id, e);
                    // A leave interrupted mid-way can leave the room empty but registered
                    self.registry.evict_if_empty(&chat_id).await;
                }
            }
        }
    }
}
