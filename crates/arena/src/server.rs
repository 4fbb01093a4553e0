//! `ArenaServer` builder and server loop.
//!
//! This is the entry point for running the orchestrator. It ties together
//! all the layers: transport, protocol, dispatcher, lifecycle and queues.

use std::sync::Arc;

use arena_battle::{spawn_lifecycle, LifecycleConfig, LifecycleHandle, Persistence};
use arena_events::EventBus;
use arena_protocol::JsonCodec;
use arena_queue::{QueueConfig, QueueManager, RosterProvider};
use arena_retry::{Backoff, BackoffConfig};
use arena_transport::{Transport, WebSocketTransport};

use crate::bootstrap::{bootstrap, spawn_reward_accounting, LogRewards, RewardAccounting};
use crate::handler::{handle_connection, ConnectionSlot};
use crate::{battle_commands, ArenaError, CancelScope, CommandRegistry, Outbox, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) codec: JsonCodec,
    pub(crate) commands: CommandRegistry,
    pub(crate) lifecycle: LifecycleHandle,
    pub(crate) outbox: Outbox,
    pub(crate) slot: ConnectionSlot,
    pub(crate) root: CancelScope,
}

/// Builder for configuring and starting the orchestrator.
///
/// # Example
///
/// ```rust,ignore
/// use arena::prelude::*;
///
/// let server = ArenaServer::builder()
///     .bind("0.0.0.0:8080")
///     .store(Arc::new(MemoryStore::new()))
///     .roster(Arc::new(StaticRoster::new(factions)))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ArenaServerBuilder {
    config: ServerConfig,
    lifecycle_config: LifecycleConfig,
    queue_config: QueueConfig,
    backoff: BackoffConfig,
    store: Option<Arc<dyn Persistence>>,
    roster: Option<Arc<dyn RosterProvider>>,
    events: Option<Arc<EventBus>>,
    rewards: Option<Arc<dyn RewardAccounting>>,
}

impl ArenaServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            lifecycle_config: LifecycleConfig::default(),
            queue_config: QueueConfig::default(),
            backoff: BackoffConfig::default(),
            store: None,
            roster: None,
            events: None,
            rewards: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle_config = config;
        self
    }

    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.queue_config = config;
        self
    }

    /// Sets the backoff used while waiting for the faction roster.
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Sets the persistence backend. Required.
    pub fn store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the roster provider. Required.
    pub fn roster(mut self, roster: Arc<dyn RosterProvider>) -> Self {
        self.roster = Some(roster);
        self
    }

    /// Uses an existing event bus so the caller can subscribe before
    /// anything is published. A fresh bus is created otherwise.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the reward accounting job. Defaults to [`LogRewards`].
    pub fn rewards(mut self, rewards: Arc<dyn RewardAccounting>) -> Self {
        self.rewards = Some(rewards);
        self
    }

    /// Binds the listener, waits for the faction roster and starts every
    /// background actor.
    ///
    /// Waiting for the roster retries forever, so this only returns once
    /// factions are known.
    pub async fn build(self) -> Result<ArenaServer, ArenaError> {
        let store = self.store.ok_or(ArenaError::MissingCollaborator("store"))?;
        let roster = self.roster.ok_or(ArenaError::MissingCollaborator("roster"))?;
        let events = self.events.unwrap_or_default();
        let rewards = self.rewards.unwrap_or_else(|| Arc::new(LogRewards));
        let config = self.config.validated();

        let commands = battle_commands()?;
        let transport = WebSocketTransport::bind(&config.bind_addr)
            .await?
            .with_handshake_timeout(config.write_wait);

        let mut backoff = Backoff::new(self.backoff.validated());
        let queues = bootstrap(roster, events.clone(), self.queue_config, &mut backoff).await?;

        let root = CancelScope::new();
        let outbox = Outbox::new(config.outbound_capacity, config.write_wait, root.clone());
        let lifecycle = spawn_lifecycle(
            self.lifecycle_config,
            store,
            queues.clone(),
            events.clone(),
            Arc::new(outbox.clone()),
        );
        spawn_reward_accounting(
            queues.clone(),
            rewards,
            config.reward_interval,
            root.child(),
        );

        let state = Arc::new(ServerState {
            config,
            codec: JsonCodec,
            commands,
            lifecycle: lifecycle.clone(),
            outbox,
            slot: ConnectionSlot::default(),
            root,
        });

        Ok(ArenaServer {
            transport,
            state,
            lifecycle,
            queues,
            events,
        })
    }
}

impl Default for ArenaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running orchestrator.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ArenaServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    lifecycle: LifecycleHandle,
    queues: QueueManager,
    events: Arc<EventBus>,
}

impl ArenaServer {
    /// Creates a new builder.
    pub fn builder() -> ArenaServerBuilder {
        ArenaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ArenaError> {
        Ok(self.transport.local_addr()?)
    }

    /// Handle to the battle lifecycle actor.
    pub fn lifecycle(&self) -> LifecycleHandle {
        self.lifecycle.clone()
    }

    /// The per-faction queues.
    pub fn queues(&self) -> QueueManager {
        self.queues.clone()
    }

    /// The event bus actors publish on.
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Cancelling this scope stops every connection and background job.
    pub fn shutdown_scope(&self) -> CancelScope {
        self.state.root.clone()
    }

    /// Runs the accept loop until the shutdown scope is cancelled.
    ///
    /// Each accepted connection gets its own task, which performs the
    /// WebSocket upgrade and then runs the handler. Only one game client is
    /// served at a time.
    pub async fn run(mut self) -> Result<(), ArenaError> {
        tracing::info!(addr = %self.state.config.bind_addr, "arena server running");
        let root = self.state.root.clone();

        loop {
            let accepted = tokio::select! {
                _ = root.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };
            match accepted {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.upgrade().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "websocket upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("arena server stopping");
        let _ = self.lifecycle.shutdown().await;
        self.queues.shutdown().await;
        Ok(())
    }
}
