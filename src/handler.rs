//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, frame
//! decoding, and the writer task that drains the connection's outbound
//! channel into the socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::Frame;
use crate::router::ActionRouter;
use crate::server::ServerContext;
use crate::session::ConnectionHandle;
use crate::types::ConnectionId;

/// How long the writer may keep flushing after the read side is done
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, runs the action router until the
/// client goes away or `shutdown` fires, then releases the connection's
/// room memberships.
pub async fn handle_connection(
    stream: TcpStream,
    ctx: ServerContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio::select! {
        accepted = tokio_tungstenite::accept_async(stream) => accepted?,
        _ = shutdown.changed() => {
            debug!("Shutdown during handshake with {}", peer_addr);
            return Ok(());
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} established from {}", connection_id, peer_addr);

    // Channel for server -> client frames
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(ctx.outbound_buffer);
    let conn = ConnectionHandle::new(connection_id, frame_tx);

    // Spawn write task (Frame -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize frame: {}", e);
                }
            }
        }
        debug!("Write task ended for {}", connection_id);

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    let mut router = ActionRouter::new(
        conn.clone(),
        ctx.registry.clone(),
        ctx.dispatcher.clone(),
        ctx.announce_departures,
    );

    loop {
        if *shutdown.borrow() {
            debug!("Shutdown requested, closing {}", connection_id);
            break;
        }

        let next = tokio::select! {
            next = ws_receiver.next() => next,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Server side of the signal is gone
                    break;
                }
                continue;
            }
        };
        let Some(msg_result) = next else {
            debug!("Stream ended for {}", connection_id);
            break;
        };

        let frame = match msg_result {
            Ok(Message::Text(text)) => Frame::from_json(&text),
            Ok(Message::Binary(data)) => Frame::from_json_bytes(&data),
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close frame", connection_id);
                break;
            }
            Ok(_) => {
                // Ping/Pong are answered by tungstenite
                continue;
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        };

        // Shutdown also interrupts a frame stuck on backpressure
        let result = match frame {
            Ok(frame) => tokio::select! {
                result = router.handle_frame(frame) => result,
                _ = shutdown.changed() => {
                    debug!("Shutdown requested mid-frame, closing {}", connection_id);
                    break;
                }
            },
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Closing connection {}: {}", connection_id, e);
            if conn.try_send(Frame::error("", &e)).is_err() {
                debug!("Dropped close reason for {}", connection_id);
            }
            break;
        }
    }

    router.disconnect().await;
    drop(router);
    drop(conn);

    // The writer ends once every handle clone is gone
    let abort = write_task.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, write_task).await.is_err() {
        debug!("Write task for {} did not finish in time", connection_id);
        abort.abort();
    }

    info!("Connection {} disconnected", connection_id);

    Ok(())
}
