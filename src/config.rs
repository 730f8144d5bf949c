//! Runtime configuration
//!
//! Every setting is a command-line flag with an environment variable
//! fallback and a default.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Parser;

use crate::dispatcher::{DEFAULT_DELIVERY_TIMEOUT, QUEUE_CAPACITY};
use crate::store::Chat;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port
pub const DEFAULT_PORT: u16 = 8181;
/// Default per-connection outbound buffer
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

/// Multi-room WebSocket chat relay
#[derive(Parser, Debug, Clone)]
#[command(name = "chat_relay", version, about = "Multi-room WebSocket chat relay", long_about = None)]
pub struct Config {
    /// Bind address (host:port), overrides --host/--port
    #[arg(value_name = "ADDR")]
    pub addr: Option<String>,

    /// Host address to bind the server to
    #[arg(long, env = "HTTP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port number to bind the server to
    #[arg(long, env = "HTTP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Capacity of the shared dispatcher queue
    #[arg(long, env = "CHAT_QUEUE_CAPACITY", default_value_t = QUEUE_CAPACITY, value_parser = parse_positive)]
    pub queue_capacity: usize,

    /// Capacity of each connection's outbound buffer
    #[arg(long, env = "CHAT_OUTBOUND_BUFFER", default_value_t = DEFAULT_OUTBOUND_BUFFER, value_parser = parse_positive)]
    pub outbound_buffer: usize,

    /// Upper bound in milliseconds for one member send inside the dispatcher
    #[arg(long, env = "CHAT_DELIVERY_TIMEOUT_MS", default_value_t = DEFAULT_DELIVERY_TIMEOUT.as_millis() as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub delivery_timeout_ms: u64,

    /// Send "<client> left chat" to rooms a disconnecting client was in
    #[arg(long, env = "CHAT_ANNOUNCE_DEPARTURES", default_value = "true", value_parser = BoolishValueParser::new(), action = clap::ArgAction::Set)]
    pub announce_departures: bool,

    /// Chats to seed the store with, as `id:name` entries
    #[arg(long = "seed", env = "CHAT_SEED", value_delimiter = ',', value_parser = parse_seed_entry)]
    pub seed_chats: Vec<Chat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: QUEUE_CAPACITY,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT.as_millis() as u64,
            announce_departures: true,
            seed_chats: Vec::new(),
        }
    }
}

impl Config {
    /// Address the listener binds to
    pub fn bind_addr(&self) -> String {
        if let Some(addr) = &self.addr {
            return addr.clone();
        }
        // IPv6 hosts get brackets
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a positive integer, got {:?}", value)),
    }
}

/// `id:name`, or a bare `id` that doubles as the name
fn parse_seed_entry(value: &str) -> Result<Chat, String> {
    let entry = value.trim();
    let (id, name) = match entry.split_once(':') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (entry, entry),
    };
    if id.is_empty() {
        return Err(format!("seed entry {:?} has no chat id", value));
    }
    Ok(Chat::new(id, if name.is_empty() { id } else { name }))
}
