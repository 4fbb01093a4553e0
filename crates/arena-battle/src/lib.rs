//! Battle lifecycle for the arena orchestrator.
//!
//! One actor owns the live [`Battle`](arena_protocol::Battle) and walks it
//! through `Uninitialized → Initialized → Started → Ended`, re-initializing
//! after a grace delay. Every write goes through one [`Transaction`] per
//! operation, and in-memory state only changes after the commit.
//!
//! # Key types
//!
//! - [`LifecycleHandle`] - send commands to the running actor
//! - [`BattleState`] - the state machine
//! - [`Persistence`] / [`Transaction`] - the storage collaborator
//! - [`MemoryStore`] - in-memory storage with failure injection
//! - [`ClientSink`] - where init messages for the game client go

mod config;
mod error;
mod lifecycle;
mod memory;
mod request;
mod store;

pub use config::{BattleState, LifecycleConfig};
pub use error::{BattleError, StoreError};
pub use lifecycle::{spawn_lifecycle, ClientSink, LifecycleHandle};
pub use memory::{FailPoint, MemoryStore, StoredBattle};
pub use request::{
    AbilityRequest, AiSpawnedRequest, DamageEntry, DestroyedEvent, DestroyedRequest, EndRequest,
    SpawnedAiEvent, StartRequest, StartWarMachine, WinningWarMachine,
};
pub use store::{Persistence, StateEvent, Transaction};
