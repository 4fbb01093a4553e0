//! Request payloads the game client sends with lifecycle commands.
//!
//! Identifiers default to nil when absent so a missing field surfaces as a
//! domain error ("missing battle id") instead of a decode failure.

use arena_protocol::{
    AbilityEvent, BattleId, DamageRecord, FactionId, MapId, Vector3, WarMachineId, WinCondition,
};
use serde::{Deserialize, Serialize};

/// One combatant in a start request.
///
/// Only `id` and `participant_id` are required; anything else left out is
/// filled in provisionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWarMachine {
    pub id: WarMachineId,
    #[serde(rename = "participantID")]
    pub participant_id: u8,
    #[serde(rename = "factionID", default)]
    pub faction_id: Option<FactionId>,
    #[serde(default)]
    pub position: Option<Vector3>,
    #[serde(default)]
    pub rotation: Option<i32>,
}

/// `BATTLE:START` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(rename = "battleID", default)]
    pub battle_id: BattleId,
    #[serde(rename = "mapID", default)]
    pub map_id: MapId,
    #[serde(default)]
    pub war_machines: Vec<StartWarMachine>,
}

/// `BATTLE:END` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndRequest {
    #[serde(rename = "battleID", default)]
    pub battle_id: BattleId,
    #[serde(default)]
    pub win_condition: Option<WinCondition>,
    #[serde(default)]
    pub winning_war_machines: Vec<WinningWarMachine>,
}

/// A surviving winner and its remaining health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningWarMachine {
    pub id: WarMachineId,
    #[serde(default)]
    pub health: i32,
}

/// The destruction as reported by the game client, by participant slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyedEvent {
    #[serde(rename = "destroyedParticipantID")]
    pub destroyed_participant_id: u8,
    #[serde(rename = "killedByParticipantID", default)]
    pub killed_by_participant_id: Option<u8>,
    #[serde(default)]
    pub killed_by: String,
    #[serde(default)]
    pub damage_history: Vec<DamageEntry>,
}

/// One damage source in a [`DestroyedEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEntry {
    pub amount: i32,
    #[serde(rename = "instigatorParticipantID", default)]
    pub instigator_participant_id: Option<u8>,
    #[serde(default)]
    pub source_name: String,
}

impl DamageEntry {
    pub(crate) fn resolve(&self, caused_by: Option<WarMachineId>) -> DamageRecord {
        DamageRecord {
            amount: self.amount,
            caused_by_war_machine: caused_by,
            source_name: self.source_name.clone(),
        }
    }
}

/// `BATTLE:WAR_MACHINE_DESTROYED` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyedRequest {
    #[serde(rename = "battleID", default)]
    pub battle_id: BattleId,
    #[serde(default)]
    pub destroyed_war_machine_event: Option<DestroyedEvent>,
}

/// An AI unit the game client spawned mid-battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedAiEvent {
    #[serde(rename = "participantID")]
    pub participant_id: u8,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub skin: String,
    #[serde(rename = "factionID", default)]
    pub faction_id: Option<FactionId>,
    pub max_health: i32,
    #[serde(default)]
    pub max_shield: i32,
    #[serde(default)]
    pub position: Option<Vector3>,
    #[serde(default)]
    pub rotation: Option<i32>,
}

/// `BATTLE:AI_SPAWNED` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSpawnedRequest {
    #[serde(rename = "battleID", default)]
    pub battle_id: BattleId,
    #[serde(rename = "spawnedAIEvent", default)]
    pub spawned_ai_event: Option<SpawnedAiEvent>,
}

/// `BATTLE:ABILITY` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRequest {
    #[serde(rename = "battleID", default)]
    pub battle_id: BattleId,
    #[serde(default)]
    pub ability_event: Option<AbilityEvent>,
}
