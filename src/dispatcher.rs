//! Broadcast dispatcher
//!
//! A single consumer draining one bounded queue shared by every room. Each
//! message is delivered to the room's members one after another, so order
//! within a room follows enqueue order. The flip side is head-of-line
//! blocking: a member that stops reading stalls delivery for all rooms until
//! its send completes or hits the delivery timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::message::Frame;
use crate::registry::RoomRegistry;
use crate::types::{ChatId, ClientId};

/// Default outbound queue capacity
pub const QUEUE_CAPACITY: usize = 100;

/// Default upper bound for a single member send
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Message waiting to be fanned out to a room
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Target room
    pub chat_id: ChatId,
    /// Member excluded from delivery
    pub sender: ClientId,
    /// Frame written to every other member
    pub frame: Frame,
}

/// Producer side of the dispatcher queue
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl DispatcherHandle {
    /// Enqueue a message for broadcast
    ///
    /// Waits while the queue is full.
    pub async fn enqueue(&self, msg: OutboundMessage) -> Result<(), SendError> {
        self.tx.send(msg).await.map_err(|_| SendError::QueueClosed)
    }
}

/// Outcome of dispatching one message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The dispatcher task state
pub struct Dispatcher {
    receiver: mpsc::Receiver<OutboundMessage>,
    registry: Arc<RoomRegistry>,
    delivery_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher and the handle producers enqueue through
    pub fn new(
        registry: Arc<RoomRegistry>,
        capacity: usize,
        delivery_timeout: Duration,
    ) -> (Self, DispatcherHandle) {
        let (tx, receiver) = mpsc::channel(capacity);
        let dispatcher = Self {
            receiver,
            registry,
            delivery_timeout,
        };
        (dispatcher, DispatcherHandle { tx })
    }

    /// Run the dispatcher loop
    ///
    /// Drains the queue until every handle has been dropped. Per-message
    /// failures never end the loop.
    pub async fn run(mut self) {
        info!("Dispatcher started");

        while let Some(msg) = self.receiver.recv().await {
            self.dispatch(msg).await;
        }

        info!("Dispatcher shutting down");
    }

    /// Deliver one message to every current member except its sender
    pub async fn dispatch(&self, msg: OutboundMessage) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let Some(room) = self.registry.get(&msg.chat_id).await else {
            warn!(
                "Dropping message from {}: chat {} is no longer active",
                msg.sender, msg.chat_id
            );
            return report;
        };

        let members = room.snapshot_members(Some(&msg.sender)).await;
        drop(room);

        for member in members {
            match member.deliver(msg.frame.clone(), self.delivery_timeout).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver to {} in chat {}: {}",
                        member.client_id, msg.chat_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Message from {} in chat {}: {} delivered, {} failed",
            msg.sender, msg.chat_id, report.delivered, report.failed
        );
        report
    }
}
