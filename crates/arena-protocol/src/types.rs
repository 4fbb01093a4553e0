//! The shared battle data model.
//!
//! These types travel three ways: to the game client inside command
//! payloads, to event bus subscribers as snapshots, and to the persistence
//! collaborator. Field names follow the game client's camelCase JSON, with
//! the `...ID` suffix it uses for identifiers.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BattleId, FactionId, MapId, PlayerId, WarMachineId};

/// An integer position in map space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vector3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A faction (team). Queues and rosters are partitioned by faction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub label: String,
}

/// A battle map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMap {
    pub id: MapId,
    pub name: String,
    pub max_spawns: u32,
}

/// A combatant.
///
/// `participant_id` is the byte-sized slot the game client uses to refer
/// to this machine inside one battle; `0` means no slot was assigned yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMachine {
    pub id: WarMachineId,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub skin: String,
    #[serde(rename = "factionID", default)]
    pub faction_id: Option<FactionId>,
    #[serde(rename = "ownedByID", default)]
    pub owned_by: Option<PlayerId>,
    #[serde(rename = "participantID", default)]
    pub participant_id: u8,
    pub max_health: i32,
    pub health: i32,
    pub max_shield: i32,
    pub shield: i32,
    #[serde(default)]
    pub position: Option<Vector3>,
    #[serde(default)]
    pub rotation: Option<i32>,
    #[serde(default)]
    pub is_ai: bool,
}

impl WarMachine {
    /// Creates a machine at full health with no faction, owner, or slot.
    pub fn new(id: WarMachineId, name: impl Into<String>, max_health: i32, max_shield: i32) -> Self {
        Self {
            id,
            name: name.into(),
            model: String::new(),
            skin: String::new(),
            faction_id: None,
            owned_by: None,
            participant_id: 0,
            max_health,
            health: max_health,
            max_shield,
            shield: max_shield,
            position: None,
            rotation: None,
            is_ai: false,
        }
    }

    /// Returns `true` once the machine has no health left.
    pub fn is_destroyed(&self) -> bool {
        self.health <= 0
    }
}

/// How a battle was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinCondition {
    /// One faction outlasted the others.
    LastAlive,
    /// Anything else the game client reports.
    #[serde(other)]
    Other,
}

impl WinCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastAlive => "LAST_ALIVE",
            Self::Other => "OTHER",
        }
    }
}

/// Damage a destroyed machine took from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageRecord {
    pub amount: i32,
    #[serde(default)]
    pub caused_by_war_machine: Option<WarMachineId>,
    #[serde(default)]
    pub source_name: String,
}

/// What is known about one destroyed participant.
///
/// A battle keeps at most one of these per participant slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyedRecord {
    pub destroyed_war_machine: WarMachineId,
    #[serde(default)]
    pub killed_by_war_machine: Option<WarMachineId>,
    /// Free-form cause reported by the game client ("Rocket", "Zone", ...).
    pub killed_by: String,
    /// Everyone who dealt damage, including assists.
    #[serde(default)]
    pub damage_records: Vec<DamageRecord>,
}

impl DestroyedRecord {
    /// Machines that contributed damage without landing the kill.
    pub fn assisting(&self) -> impl Iterator<Item = WarMachineId> + '_ {
        self.damage_records
            .iter()
            .filter_map(|d| d.caused_by_war_machine)
            .filter(move |id| Some(*id) != self.killed_by_war_machine)
    }
}

/// An ability the game client reports as triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityEvent {
    #[serde(rename = "gameClientAbilityID")]
    pub game_client_ability_id: u32,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "factionID", default)]
    pub faction_id: Option<FactionId>,
    #[serde(rename = "triggeredByParticipantID", default)]
    pub triggered_by: Option<u8>,
    #[serde(default)]
    pub position: Option<Vector3>,
    #[serde(default = "Utc::now")]
    pub triggered_at: DateTime<Utc>,
}

/// The single live battle.
///
/// Owned by the lifecycle actor; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    #[serde(rename = "battleID")]
    pub id: BattleId,
    pub map: Option<GameMap>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winning_condition: Option<WinCondition>,
    pub winning_war_machines: Vec<WarMachineId>,
    pub war_machines: Vec<WarMachine>,
    pub factions: BTreeMap<FactionId, Faction>,
    /// Destruction records keyed by participant slot.
    pub destroyed: BTreeMap<u8, DestroyedRecord>,
    pub spawned_ai: Vec<WarMachine>,
    pub abilities: Vec<AbilityEvent>,
}

impl Battle {
    /// Finds a queued or spawned machine by its participant slot.
    pub fn participant(&self, slot: u8) -> Option<&WarMachine> {
        self.war_machines
            .iter()
            .chain(self.spawned_ai.iter())
            .find(|wm| wm.participant_id == slot)
    }

    /// Mutable variant of [`participant`](Self::participant).
    pub fn participant_mut(&mut self, slot: u8) -> Option<&mut WarMachine> {
        self.war_machines
            .iter_mut()
            .chain(self.spawned_ai.iter_mut())
            .find(|wm| wm.participant_id == slot)
    }

    /// Finds a machine by identity.
    pub fn war_machine(&self, id: WarMachineId) -> Option<&WarMachine> {
        self.war_machines
            .iter()
            .chain(self.spawned_ai.iter())
            .find(|wm| wm.id == id)
    }

    /// The payload sent to the game client with `BATTLE:INIT`.
    pub fn init_payload(&self) -> InitBattlePayload {
        InitBattlePayload {
            battle_id: self.id,
            map_name: self.map.as_ref().map(|m| m.name.clone()).unwrap_or_default(),
            war_machines: self.war_machines.clone(),
        }
    }
}

/// Body of the outbound `BATTLE:INIT` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitBattlePayload {
    #[serde(rename = "battleID")]
    pub battle_id: BattleId,
    pub map_name: String,
    pub war_machines: Vec<WarMachine>,
}

/// A war machine waiting in a faction queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedWarMachine {
    pub war_machine: WarMachine,
    pub queued_at: DateTime<Utc>,
}

impl QueuedWarMachine {
    /// Wraps a machine, stamping it with the current time.
    pub fn now(war_machine: WarMachine) -> Self {
        Self {
            war_machine,
            queued_at: Utc::now(),
        }
    }
}

/// One machine's place in its faction queue. `None` means it just left
/// the queue for a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePosition {
    #[serde(rename = "warMachineID")]
    pub war_machine_id: WarMachineId,
    pub position: Option<usize>,
}

/// Queue positions for every machine one player owns in a faction queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQueuePositions {
    #[serde(rename = "ownerID")]
    pub owner_id: PlayerId,
    pub positions: Vec<QueuePosition>,
}

/// Snapshot of a faction queue after it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdate {
    #[serde(rename = "factionID")]
    pub faction_id: FactionId,
    pub length: usize,
    /// The head of the queue, truncated to a preview length.
    pub preview: Vec<QueuedWarMachine>,
}

/// Who gets paid when a battle ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRewardList {
    #[serde(rename = "battleID")]
    pub battle_id: BattleId,
    #[serde(rename = "winnerFactionID")]
    pub winner_faction_id: Option<FactionId>,
    /// Owners of the machines that won.
    pub winning_owners: BTreeSet<PlayerId>,
    /// Owners of machines that landed at least one kill.
    pub killing_owners: BTreeSet<PlayerId>,
}

impl BattleRewardList {
    /// Derives the reward list from an ended battle.
    ///
    /// The winning faction is taken from the first winning machine that
    /// has one.
    pub fn from_battle(battle: &Battle) -> Self {
        let winners: Vec<&WarMachine> = battle
            .winning_war_machines
            .iter()
            .filter_map(|id| battle.war_machine(*id))
            .collect();

        let winner_faction_id = winners.iter().find_map(|wm| wm.faction_id);
        let winning_owners = winners.iter().filter_map(|wm| wm.owned_by).collect();
        let killing_owners = battle
            .destroyed
            .values()
            .filter_map(|record| record.killed_by_war_machine)
            .filter_map(|id| battle.war_machine(id))
            .filter_map(|wm| wm.owned_by)
            .collect();

        Self {
            battle_id: battle.id,
            winner_faction_id,
            winning_owners,
            killing_owners,
        }
    }
}
