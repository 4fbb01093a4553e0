use std::fmt;

use arena_protocol::{
    AbilityEvent, Battle, BattleId, BattleRewardList, DestroyedRecord, FactionId, QueueUpdate,
    WarMachine, WarMachineTick,
};
use serde::Serialize;

/// The kinds of event the bus routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    BattleInit,
    BattleStarted,
    BattleEnded,
    WarMachineDestroyed,
    AiSpawned,
    AbilityTriggered,
    WarMachinePositionChanged,
    WarMachineQueueUpdated,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BattleInit => "battle_init",
            Self::BattleStarted => "battle_started",
            Self::BattleEnded => "battle_ended",
            Self::WarMachineDestroyed => "war_machine_destroyed",
            Self::AiSpawned => "ai_spawned",
            Self::AbilityTriggered => "ability_triggered",
            Self::WarMachinePositionChanged => "war_machine_position_changed",
            Self::WarMachineQueueUpdated => "war_machine_queue_updated",
        };
        f.write_str(name)
    }
}

/// Event payloads. Which variant accompanies which [`EventKind`]:
///
/// | Kind | Data |
/// |------|------|
/// | `BattleInit`, `BattleStarted` | `Battle` |
/// | `BattleEnded` | `BattleEnded` |
/// | `WarMachineDestroyed` | `Destroyed` |
/// | `AiSpawned` | `SpawnedAi` |
/// | `AbilityTriggered` | `FactionActions` |
/// | `WarMachinePositionChanged` | `Ticks` |
/// | `WarMachineQueueUpdated` | `QueueUpdated` |
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EventData {
    /// A snapshot of the live battle.
    Battle(Battle),
    BattleEnded {
        battle: Battle,
        rewards: BattleRewardList,
    },
    Destroyed {
        battle_id: BattleId,
        participant_id: u8,
        record: DestroyedRecord,
    },
    SpawnedAi {
        battle_id: BattleId,
        war_machine: WarMachine,
    },
    /// Every ability the faction triggered so far this battle, newest last.
    FactionActions {
        battle_id: BattleId,
        faction_id: Option<FactionId>,
        actions: Vec<AbilityEvent>,
    },
    Ticks {
        battle_id: BattleId,
        ticks: Vec<WarMachineTick>,
    },
    QueueUpdated(QueueUpdate),
}

impl EventData {
    /// The battle this event belongs to, if any.
    pub fn battle_id(&self) -> Option<BattleId> {
        match self {
            Self::Battle(battle) | Self::BattleEnded { battle, .. } => Some(battle.id),
            Self::Destroyed { battle_id, .. }
            | Self::SpawnedAi { battle_id, .. }
            | Self::FactionActions { battle_id, .. }
            | Self::Ticks { battle_id, .. } => Some(*battle_id),
            Self::QueueUpdated(_) => None,
        }
    }
}
