//! # Arena
//!
//! Session orchestrator for the arena battle game client.
//!
//! One game client connects over WebSocket and runs the simulation. The
//! orchestrator decides who fights next (per-faction queues), tells the
//! client to set up the battle, records what the client reports while it
//! runs, and starts the next one after it ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use arena::prelude::*;
//!
//! # async fn run(factions: Vec<Faction>) -> Result<(), ArenaError> {
//! let server = ArenaServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .store(Arc::new(MemoryStore::new()))
//!     .roster(Arc::new(StaticRoster::new(factions)))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod bootstrap;
mod commands;
mod config;
mod dispatcher;
mod error;
mod handler;
mod outbox;
mod scope;
mod server;

pub use bootstrap::{bootstrap, spawn_reward_accounting, LogRewards, RewardAccounting};
pub use commands::battle_commands;
pub use config::ServerConfig;
pub use dispatcher::{CommandContext, CommandFuture, CommandRegistry};
pub use error::{ArenaError, CommandError};
pub use outbox::{Outbound, OutboundBody, Outbox};
pub use scope::CancelScope;
pub use server::{ArenaServer, ArenaServerBuilder};

/// Everything needed to wire up and run a server.
pub mod prelude {
    pub use crate::{
        ArenaError, ArenaServer, ArenaServerBuilder, CancelScope, LogRewards, RewardAccounting,
        ServerConfig,
    };
    pub use arena_battle::{BattleState, LifecycleConfig, LifecycleHandle, MemoryStore, Persistence};
    pub use arena_events::{EventBus, EventData, EventKind};
    pub use arena_protocol::{
        Battle, BattleId, Faction, FactionId, GameMap, MapId, WarMachine, WarMachineId,
    };
    pub use arena_queue::{QueueConfig, RosterProvider, StaticRoster};
    pub use arena_retry::BackoffConfig;
}
