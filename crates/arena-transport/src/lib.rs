//! Transport layer for the arena game client link.
//!
//! Provides the [`Transport`] trait for accepting connections and a
//! WebSocket implementation whose connections split into an independent
//! reader and writer, so a receive loop and a send pump can run side by
//! side without contending for one lock.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingConnection, WebSocketConnection, WebSocketReader, WebSocketTransport, WebSocketWriter,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static LAST_CONNECTION: AtomicU64 = AtomicU64::new(0);

/// Process-unique tag for one accepted game client link, used to
/// correlate log lines and replies. Numbering starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next id.
    pub fn next() -> Self {
        Self(LAST_CONNECTION.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A unit of data read off a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A binary frame. The game client prefixes these with a type tag.
    Binary(Vec<u8>),
    /// A text frame.
    Text(String),
    /// The answer to one of our keepalive pings.
    Pong(Vec<u8>),
}

/// Source of game client links.
///
/// The server loop only needs to wait for the next link and report where it
/// listens. Protocol upgrades belong to the connection type, so a slow
/// peer never blocks the loop that waits for the next one.
pub trait Transport: Send + Sync + 'static {
    type Connection: Send + 'static;
    type Error: std::error::Error + Send + Sync;

    /// Resolves once a peer has connected.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> Result<std::net::SocketAddr, Self::Error>;
}
