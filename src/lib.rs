//! Multi-room WebSocket Chat Relay Library
//!
//! Clients connect over WebSocket, join named chats, and exchange text or
//! binary messages that are fanned out to the other members of the chat.
//!
//! # Features
//! - Lazy room hydration from a chat store on first join
//! - Explicit chat creation
//! - Fan-out to every member except the sender
//! - Room eviction when the last member leaves
//! - Disconnect cleanup with optional departure notices
//!
//! # Architecture
//! - `RoomRegistry` maps chat ids to active rooms (registry lock, then room lock)
//! - Each connection runs an `ActionRouter` in its own task
//! - One `Dispatcher` task drains a bounded queue shared by all rooms
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{ChatServer, Config, InMemoryChatStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let store = Arc::new(InMemoryChatStore::new());
//!     let listener = TcpListener::bind(config.bind_addr()).await.unwrap();
//!
//!     let server = ChatServer::new(&config, store);
//!     server
//!         .serve(listener, async { let _ = tokio::signal::ctrl_c().await; })
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle, OutboundMessage};
pub use error::{AppError, ChatError, SendError, StoreError};
pub use handler::handle_connection;
pub use message::{Action, Frame, PayloadKind};
pub use registry::RoomRegistry;
pub use room::Room;
pub use router::{ActionRouter, ConnectionState};
pub use server::{ChatServer, ServerContext};
pub use session::{ClientSession, ConnectionHandle};
pub use store::{Chat, ChatStore, InMemoryChatStore};
pub use types::{ChatId, ClientId, ConnectionId};
