//! Chat server wiring
//!
//! Owns the room registry and the dispatcher task for the lifetime of the
//! process, accepts sockets, and spawns one handler task per connection.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::RoomRegistry;
use crate::store::ChatStore;

/// Shared handles given to every connection task
#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<RoomRegistry>,
    pub dispatcher: DispatcherHandle,
    pub outbound_buffer: usize,
    pub announce_departures: bool,
}

/// The chat relay
///
/// Constructing it spawns the dispatcher, so it must be created inside a
/// tokio runtime.
pub struct ChatServer {
    ctx: ServerContext,
    dispatcher_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChatServer {
    /// Create the registry and start the dispatcher
    pub fn new(config: &Config, store: Arc<dyn ChatStore>) -> Self {
        let registry = Arc::new(RoomRegistry::new(store));
        let (dispatcher, handle) = Dispatcher::new(
            registry.clone(),
            config.queue_capacity,
            config.delivery_timeout(),
        );
        let dispatcher_task = tokio::spawn(dispatcher.run());
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            ctx: ServerContext {
                registry,
                dispatcher: handle,
                outbound_buffer: config.outbound_buffer,
                announce_departures: config.announce_departures,
            },
            dispatcher_task,
            shutdown_tx,
        }
    }

    /// Room registry shared with every connection
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.ctx.registry.clone()
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// On shutdown every connection is told to stop, its memberships are
    /// released, and the dispatcher drains what is left in its queue.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let ChatServer {
            ctx,
            dispatcher_task,
            shutdown_tx,
        } = self;

        info!("Chat relay listening on {}", listener.local_addr()?);

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let ctx = ctx.clone();
                        let shutdown_rx = shutdown_tx.subscribe();

                        // Spawn handler task for each connection
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx, shutdown_rx).await {
                                error!("Connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Shutting down, closing {} connections", connections.len());
        let _ = shutdown_tx.send(true);
        while connections.join_next().await.is_some() {}

        // Last queue handle; the dispatcher stops once the queue is empty
        drop(ctx);
        if let Err(e) = dispatcher_task.await {
            error!("Dispatcher task failed: {}", e);
        }

        info!("Chat relay stopped");
        Ok(())
    }
}
