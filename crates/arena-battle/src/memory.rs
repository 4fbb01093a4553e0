//! In-memory [`Persistence`] for development and tests.
//!
//! Writes are staged per transaction and applied under one lock on
//! commit, so a rolled-back transaction leaves no trace. Any step can be
//! made to fail with [`MemoryStore::fail_at`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arena_protocol::{
    AbilityEvent, Battle, BattleId, DestroyedRecord, Faction, GameMap, MapId, WarMachine,
    WarMachineId, WinCondition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;

use crate::{Persistence, StateEvent, StoreError, Transaction};

/// A step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    RandomMap,
    InsertBattle,
    AssignWarMachines,
    StateEvent,
    EndBattle,
    SetWinners,
    DestroyedEvent,
    SpawnedAi,
    AbilityEvent,
    Commit,
}

/// A committed battle row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBattle {
    pub battle: Battle,
    pub war_machines: Vec<WarMachineId>,
    pub ended_at: Option<DateTime<Utc>>,
    pub win_condition: Option<WinCondition>,
    pub winners: Vec<WarMachineId>,
}

#[derive(Debug, Default)]
struct Tables {
    maps: Vec<GameMap>,
    factions: Vec<Faction>,
    war_machines: HashMap<WarMachineId, WarMachine>,
    battles: HashMap<BattleId, StoredBattle>,
    state_events: Vec<(BattleId, StateEvent)>,
    destroyed: Vec<(BattleId, u8, DestroyedRecord)>,
    spawned_ai: Vec<(BattleId, WarMachine)>,
    abilities: Vec<(BattleId, AbilityEvent)>,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    failures: Mutex<HashSet<FailPoint>>,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, point: FailPoint) -> Result<(), StoreError> {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        if failures.contains(&point) {
            return Err(StoreError::Backend(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

/// In-memory store. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(self, map: GameMap) -> Self {
        self.shared.tables().maps.push(map);
        self
    }

    pub fn with_faction(self, faction: Faction) -> Self {
        self.shared.tables().factions.push(faction);
        self
    }

    pub fn with_war_machine(self, war_machine: WarMachine) -> Self {
        self.shared
            .tables()
            .war_machines
            .insert(war_machine.id, war_machine);
        self
    }

    /// Makes `point` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_at(&self, point: FailPoint) {
        self.shared
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    pub fn clear_failures(&self) {
        self.shared
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn battle(&self, id: BattleId) -> Option<StoredBattle> {
        self.shared.tables().battles.get(&id).cloned()
    }

    pub fn state_events(&self) -> Vec<(BattleId, StateEvent)> {
        self.shared.tables().state_events.clone()
    }

    pub fn destroyed_events(&self) -> Vec<(BattleId, u8, DestroyedRecord)> {
        self.shared.tables().destroyed.clone()
    }

    pub fn spawned_ai(&self) -> Vec<(BattleId, WarMachine)> {
        self.shared.tables().spawned_ai.clone()
    }

    pub fn ability_events(&self) -> Vec<(BattleId, AbilityEvent)> {
        self.shared.tables().abilities.clone()
    }

    pub fn commits(&self) -> usize {
        self.shared.tables().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.tables().rollbacks
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.shared.check(FailPoint::Begin)?;
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            staged: Vec::new(),
        }))
    }

    async fn random_map(&self) -> Result<GameMap, StoreError> {
        self.shared.check(FailPoint::RandomMap)?;
        let tables = self.shared.tables();
        tables
            .maps
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| StoreError::not_found("map", "any"))
    }

    async fn map(&self, id: MapId) -> Result<GameMap, StoreError> {
        self.shared
            .tables()
            .maps
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("map", id))
    }

    async fn factions(&self) -> Result<Vec<Faction>, StoreError> {
        Ok(self.shared.tables().factions.clone())
    }

    async fn war_machine(&self, id: WarMachineId) -> Result<Option<WarMachine>, StoreError> {
        Ok(self.shared.tables().war_machines.get(&id).cloned())
    }
}

enum Write {
    Battle(Box<Battle>),
    Assign(BattleId, Vec<WarMachineId>),
    State(BattleId, StateEvent),
    End(BattleId, DateTime<Utc>, Option<WinCondition>),
    Winners(BattleId, Vec<WarMachineId>),
    Destroyed(BattleId, u8, DestroyedRecord),
    SpawnedAi(BattleId, WarMachine),
    Ability(BattleId, AbilityEvent),
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    staged: Vec<Write>,
}

impl MemoryTransaction {
    fn stage(&mut self, point: FailPoint, write: Write) -> Result<(), StoreError> {
        self.shared.check(point)?;
        self.staged.push(write);
        Ok(())
    }
}

fn battle_row<'a>(
    tables: &'a mut Tables,
    id: BattleId,
) -> Result<&'a mut StoredBattle, StoreError> {
    tables
        .battles
        .get_mut(&id)
        .ok_or_else(|| StoreError::not_found("battle", id))
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert_battle(&mut self, battle: &Battle) -> Result<(), StoreError> {
        self.stage(FailPoint::InsertBattle, Write::Battle(Box::new(battle.clone())))
    }

    async fn assign_war_machines(
        &mut self,
        battle_id: BattleId,
        war_machines: &[WarMachine],
    ) -> Result<(), StoreError> {
        let ids = war_machines.iter().map(|wm| wm.id).collect();
        self.stage(FailPoint::AssignWarMachines, Write::Assign(battle_id, ids))
    }

    async fn insert_state_event(
        &mut self,
        battle_id: BattleId,
        event: StateEvent,
    ) -> Result<(), StoreError> {
        self.stage(FailPoint::StateEvent, Write::State(battle_id, event))
    }

    async fn end_battle(
        &mut self,
        battle_id: BattleId,
        ended_at: DateTime<Utc>,
        condition: Option<WinCondition>,
    ) -> Result<(), StoreError> {
        self.stage(FailPoint::EndBattle, Write::End(battle_id, ended_at, condition))
    }

    async fn set_winners(
        &mut self,
        battle_id: BattleId,
        winners: &[WarMachineId],
    ) -> Result<(), StoreError> {
        self.stage(FailPoint::SetWinners, Write::Winners(battle_id, winners.to_vec()))
    }

    async fn insert_destroyed_event(
        &mut self,
        battle_id: BattleId,
        participant_id: u8,
        record: &DestroyedRecord,
    ) -> Result<(), StoreError> {
        self.stage(
            FailPoint::DestroyedEvent,
            Write::Destroyed(battle_id, participant_id, record.clone()),
        )
    }

    async fn insert_spawned_ai(
        &mut self,
        battle_id: BattleId,
        war_machine: &WarMachine,
    ) -> Result<(), StoreError> {
        self.stage(FailPoint::SpawnedAi, Write::SpawnedAi(battle_id, war_machine.clone()))
    }

    async fn insert_ability_event(
        &mut self,
        battle_id: BattleId,
        event: &AbilityEvent,
    ) -> Result<(), StoreError> {
        self.stage(FailPoint::AbilityEvent, Write::Ability(battle_id, event.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { shared, staged } = *self;
        shared.check(FailPoint::Commit)?;
        let mut tables = shared.tables();

        // Validate first so a bad write cannot leave the tables half-applied.
        let mut known: HashSet<BattleId> = tables.battles.keys().copied().collect();
        for write in &staged {
            match write {
                Write::Battle(battle) => {
                    known.insert(battle.id);
                }
                Write::Assign(id, _)
                | Write::End(id, ..)
                | Write::Winners(id, _) if !known.contains(id) => {
                    return Err(StoreError::not_found("battle", id));
                }
                _ => {}
            }
        }

        for write in staged {
            match write {
                Write::Battle(battle) => {
                    tables.battles.insert(
                        battle.id,
                        StoredBattle {
                            battle: *battle,
                            war_machines: Vec::new(),
                            ended_at: None,
                            win_condition: None,
                            winners: Vec::new(),
                        },
                    );
                }
                Write::Assign(id, ids) => battle_row(&mut tables, id)?.war_machines = ids,
                Write::State(id, event) => tables.state_events.push((id, event)),
                Write::End(id, at, condition) => {
                    let row = battle_row(&mut tables, id)?;
                    row.ended_at = Some(at);
                    row.win_condition = condition;
                }
                Write::Winners(id, winners) => battle_row(&mut tables, id)?.winners = winners,
                Write::Destroyed(id, slot, record) => tables.destroyed.push((id, slot, record)),
                Write::SpawnedAi(id, wm) => tables.spawned_ai.push((id, wm)),
                Write::Ability(id, event) => tables.abilities.push((id, event)),
            }
        }
        tables.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.shared.tables().rollbacks += 1;
        Ok(())
    }
}
