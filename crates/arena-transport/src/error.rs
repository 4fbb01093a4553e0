use std::net::SocketAddr;

use crate::ConnectionId;

/// Failures on the link to the game client.
///
/// Socket level causes are kept as text: tungstenite's error type is only
/// present with the `websocket` feature and nothing upstream inspects it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listening socket itself failed.
    #[error("listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// A TCP peer connected but never completed the WebSocket upgrade.
    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    #[error("{conn}: read failed: {reason}")]
    Read { conn: ConnectionId, reason: String },

    #[error("{conn}: write failed: {reason}")]
    Write { conn: ConnectionId, reason: String },

    /// A deadline passed. The label names what was being waited for
    /// (`"write"`, `"ping"`, `"keepalive"`).
    #[error("{0} timed out")]
    TimedOut(&'static str),
}

impl TransportError {
    /// True for deadline expiries, as opposed to socket failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}
