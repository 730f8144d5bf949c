//! Chat Relay - Entry Point
//!
//! Loads configuration, seeds the chat store, and runs the relay until
//! Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatServer, Config, InMemoryChatStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Flags, then environment variables, then defaults
    let config = Config::parse();

    info!("Seeding chat store with {} chats", config.seed_chats.len());
    let store = Arc::new(InMemoryChatStore::with_chats(config.seed_chats.clone()));

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let server = ChatServer::new(&config, store);

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
