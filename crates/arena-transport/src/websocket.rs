//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::{ConnectionId, Incoming, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listens for the game client.
///
/// Accepting only takes the TCP connection. The WebSocket upgrade happens
/// in [`PendingConnection::upgrade`], off the accept loop, so a peer that
/// never finishes its handshake cannot hold up the next one.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        tracing::info!(addr, "listening for game client");
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// How long a peer gets to complete the upgrade. Defaults to 10s.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Transport for WebSocketTransport {
    type Connection = PendingConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Listener)?;
        tracing::trace!(%peer, "tcp connection accepted");
        Ok(PendingConnection {
            stream,
            peer,
            handshake_timeout: self.handshake_timeout,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::Listener)
    }
}

/// A TCP connection that has not completed the WebSocket upgrade yet.
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
}

impl PendingConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Runs the server side of the upgrade.
    ///
    /// Fails with `TimedOut("handshake")` when the peer does not finish
    /// within the transport's handshake timeout.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let peer = self.peer;
        let ws = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::accept_async(self.stream),
        )
        .await
        .map_err(|_| TransportError::TimedOut("handshake"))?
        .map_err(|e| TransportError::Handshake {
            peer,
            reason: e.to_string(),
        })?;

        let id = ConnectionId::next();
        tracing::debug!(%id, %peer, "websocket upgrade complete");
        Ok(WebSocketConnection { id, peer, ws })
    }
}

/// A freshly accepted WebSocket connection.
///
/// Call [`split`](Self::split) to get the halves used by the receive loop
/// and the send pump.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    ws: WsStream,
}

impl WebSocketConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Both halves keep the connection id for logging.
    pub fn split(self) -> (WebSocketReader, WebSocketWriter) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketReader { id: self.id, stream },
            WebSocketWriter { id: self.id, sink },
        )
    }
}

/// Inbound half. Yields data frames and pongs, hides control traffic.
pub struct WebSocketReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WebSocketReader {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next data frame or pong.
    ///
    /// `Ok(None)` means the client sent a close frame or the stream ended.
    pub async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Incoming::Binary(data.into())));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Incoming::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Pong(data))) => {
                    return Ok(Some(Incoming::Pong(data.into())));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Pings are answered inside tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::Read {
                        conn: self.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Write half of a WebSocket connection. Owned by exactly one task.
pub struct WebSocketWriter {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
}

impl WebSocketWriter {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into())).await
    }

    /// Sends a ping carrying `payload`; the peer answers with a pong.
    pub async fn ping(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.send(Message::Ping(payload.into())).await
    }

    /// Sends a close frame and flushes.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let closed = self.sink.close().await;
        closed.map_err(|e| self.write_error(e))
    }

    async fn send(&mut self, msg: Message) -> Result<(), TransportError> {
        let sent = self.sink.send(msg).await;
        sent.map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: tokio_tungstenite::tungstenite::Error) -> TransportError {
        TransportError::Write {
            conn: self.id,
            reason: e.to_string(),
        }
    }
}
