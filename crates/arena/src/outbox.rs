//! The outbound queue to the game client.
//!
//! Every write to the socket goes through here so the connection has a
//! single writer. The queue belongs to the server rather than to one
//! connection: messages pushed while no client is connected wait for the
//! next one, unless the scope they were pushed under is cancelled first.

use std::sync::Arc;
use std::time::Duration;

use arena_battle::{BattleError, ClientSink};
use arena_protocol::{Codec, CommandReply, GameMessage, ProtocolError};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::{ArenaError, CancelScope};

/// A message waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    /// A server-initiated message such as `BATTLE:INIT`.
    Message(GameMessage),
    /// The answer to an inbound command.
    Reply(CommandReply),
}

impl OutboundBody {
    /// Renders the body as the text frame the game client expects.
    pub(crate) fn encode<C: Codec>(&self, codec: &C) -> Result<String, ProtocolError> {
        match self {
            Self::Message(message) => codec.encode_text(message),
            Self::Reply(reply) => codec.encode_text(reply),
        }
    }

    pub(crate) fn command(&self) -> &str {
        match self {
            Self::Message(message) => message.battle_command.as_str(),
            Self::Reply(reply) => reply.battle_command.as_str(),
        }
    }
}

/// An [`OutboundBody`] plus the scope that owns it.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub body: OutboundBody,
    pub scope: CancelScope,
}

/// Bounded queue feeding the send pump. Cheap to clone.
#[derive(Clone)]
pub struct Outbox {
    sender: mpsc::Sender<Outbound>,
    receiver: Arc<Mutex<mpsc::Receiver<Outbound>>>,
    enqueue_wait: Duration,
    scope: CancelScope,
}

impl Outbox {
    /// Creates an outbox. Messages the lifecycle pushes are owned by
    /// `scope`; enqueueing gives up after `enqueue_wait`.
    pub fn new(capacity: usize, enqueue_wait: Duration, scope: CancelScope) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            enqueue_wait,
            scope,
        }
    }

    /// Queues `body` under `scope`.
    ///
    /// Waits for room in the queue, but never longer than the enqueue wait
    /// and never past the scope being cancelled.
    pub async fn push(&self, body: OutboundBody, scope: &CancelScope) -> Result<(), ArenaError> {
        if scope.is_cancelled() {
            return Err(ArenaError::Outbound("scope cancelled"));
        }
        let outbound = Outbound {
            body,
            scope: scope.clone(),
        };
        tokio::select! {
            sent = tokio::time::timeout(self.enqueue_wait, self.sender.send(outbound)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ArenaError::Outbound("queue closed")),
                Err(_) => Err(ArenaError::Outbound("queue full")),
            },
            _ = scope.cancelled() => Err(ArenaError::Outbound("scope cancelled")),
        }
    }

    /// Queues a server-initiated message under the outbox's own scope.
    pub async fn push_message(&self, message: GameMessage) -> Result<(), ArenaError> {
        self.push(OutboundBody::Message(message), &self.scope).await
    }

    /// Number of messages waiting.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Exclusive access to the receiving end, held by the active send pump.
    pub(crate) async fn receiver(&self) -> tokio::sync::MutexGuard<'_, mpsc::Receiver<Outbound>> {
        self.receiver.lock().await
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("pending", &self.pending())
            .field("enqueue_wait", &self.enqueue_wait)
            .finish()
    }
}

#[async_trait]
impl ClientSink for Outbox {
    async fn send(&self, message: GameMessage) -> Result<(), BattleError> {
        self.push_message(message)
            .await
            .map_err(|e| BattleError::Client(e.to_string()))
    }
}
