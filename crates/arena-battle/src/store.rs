//! The persistence collaborator.
//!
//! The lifecycle never talks to a database directly. It reads maps,
//! factions, and war machines through [`Persistence`] and writes through a
//! [`Transaction`], one per logical operation. A failed step rolls the
//! whole transaction back.

use std::fmt;

use arena_protocol::{
    AbilityEvent, Battle, BattleId, DestroyedRecord, Faction, GameMap, MapId, WarMachine,
    WarMachineId, WinCondition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Battle state changes recorded alongside the battle row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateEvent {
    BattleStart,
    BattleEnd,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BattleStart => f.write_str("BATTLE_START"),
            Self::BattleEnd => f.write_str("BATTLE_END"),
        }
    }
}

/// Read access plus the transaction factory.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Opens a transaction. Nothing it writes is visible until commit.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Any playable map.
    async fn random_map(&self) -> Result<GameMap, StoreError>;

    async fn map(&self, id: MapId) -> Result<GameMap, StoreError>;

    async fn factions(&self) -> Result<Vec<Faction>, StoreError>;

    /// `Ok(None)` when no record exists.
    async fn war_machine(&self, id: WarMachineId) -> Result<Option<WarMachine>, StoreError>;
}

/// One unit of work. Consumed by [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
#[async_trait]
pub trait Transaction: Send {
    async fn insert_battle(&mut self, battle: &Battle) -> Result<(), StoreError>;

    async fn assign_war_machines(
        &mut self,
        battle_id: BattleId,
        war_machines: &[WarMachine],
    ) -> Result<(), StoreError>;

    async fn insert_state_event(
        &mut self,
        battle_id: BattleId,
        event: StateEvent,
    ) -> Result<(), StoreError>;

    async fn end_battle(
        &mut self,
        battle_id: BattleId,
        ended_at: DateTime<Utc>,
        condition: Option<WinCondition>,
    ) -> Result<(), StoreError>;

    async fn set_winners(
        &mut self,
        battle_id: BattleId,
        winners: &[WarMachineId],
    ) -> Result<(), StoreError>;

    async fn insert_destroyed_event(
        &mut self,
        battle_id: BattleId,
        participant_id: u8,
        record: &DestroyedRecord,
    ) -> Result<(), StoreError>;

    async fn insert_spawned_ai(
        &mut self,
        battle_id: BattleId,
        war_machine: &WarMachine,
    ) -> Result<(), StoreError>;

    async fn insert_ability_event(
        &mut self,
        battle_id: BattleId,
        event: &AbilityEvent,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Commits `tx` if `result` is `Ok`, otherwise rolls it back and returns
/// the original error.
pub(crate) async fn finish(
    tx: Box<dyn Transaction>,
    result: Result<(), StoreError>,
    what: &'static str,
) -> Result<(), StoreError> {
    match result {
        Ok(()) => tx.commit().await,
        Err(e) => {
            tracing::error!(operation = what, error = %e, "persistence step failed, rolling back");
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(operation = what, error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
