//! Queue manager: one actor per faction, routed by faction ID.

use std::collections::BTreeMap;
use std::sync::Arc;

use arena_events::EventPublisher;
use arena_protocol::{Faction, FactionId, WarMachine, WarMachineId};

use crate::queue::spawn_faction_queue;

/// Participant slots are one byte and `0` means unassigned.
pub const MAX_PARTICIPANTS: usize = u8::MAX as usize;
use crate::{FactionQueueHandle, QueueConfig, QueueError, RosterProvider};

/// Owns a handle to every faction queue.
///
/// Created once, after the roster has produced the faction list. Cloning
/// shares the same actors.
#[derive(Clone)]
pub struct QueueManager {
    queues: BTreeMap<FactionId, FactionQueueHandle>,
    config: QueueConfig,
}

impl QueueManager {
    /// Spawns one queue actor per faction.
    ///
    /// # Errors
    /// [`QueueError::NoFactions`] when `factions` is empty. Admission with
    /// no queues would silently produce empty battles.
    ///
    /// [`QueueError::BattleTooLarge`] when one admission round would not fit
    /// in [`MAX_PARTICIPANTS`] participant slots.
    pub fn start(
        factions: &[Faction],
        config: QueueConfig,
        roster: Arc<dyn RosterProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, QueueError> {
        if factions.is_empty() {
            return Err(QueueError::NoFactions);
        }
        let config = config.validated();
        let war_machines = factions.len().saturating_mul(config.war_machines_per_faction);
        if war_machines > MAX_PARTICIPANTS {
            return Err(QueueError::BattleTooLarge {
                war_machines,
                max: MAX_PARTICIPANTS,
            });
        }

        let queues = factions
            .iter()
            .map(|faction| {
                let handle = spawn_faction_queue(
                    faction.id,
                    config.clone(),
                    Arc::clone(&roster),
                    Arc::clone(&events),
                );
                (faction.id, handle)
            })
            .collect();

        tracing::info!(factions = factions.len(), "faction queues started");
        Ok(Self { queues, config })
    }

    /// The war machines per faction this manager admits.
    pub fn battle_size(&self) -> usize {
        self.config.war_machines_per_faction
    }

    pub fn faction_ids(&self) -> Vec<FactionId> {
        self.queues.keys().copied().collect()
    }

    pub fn handle(&self, faction_id: FactionId) -> Result<&FactionQueueHandle, QueueError> {
        self.queues
            .get(&faction_id)
            .ok_or(QueueError::UnknownFaction(faction_id))
    }

    /// Queues a war machine with its faction.
    pub async fn join(&self, war_machine: WarMachine) -> Result<usize, QueueError> {
        let faction_id = war_machine
            .faction_id
            .ok_or(QueueError::MissingFaction(war_machine.id))?;
        self.handle(faction_id)?.join(war_machine).await
    }

    pub async fn leave(
        &self,
        faction_id: FactionId,
        war_machine_id: WarMachineId,
    ) -> Result<(), QueueError> {
        self.handle(faction_id)?.leave(war_machine_id).await
    }

    /// Requests one admission batch per faction, one faction at a time.
    ///
    /// Fails if any actor is gone; a partial battle is never returned.
    /// Factions admitted before the failure get their machines back.
    pub async fn admit_all(&self) -> Result<BTreeMap<FactionId, Vec<WarMachine>>, QueueError> {
        let mut batches = BTreeMap::new();
        for (faction_id, handle) in &self.queues {
            match handle.admit(self.config.war_machines_per_faction).await {
                Ok(admitted) => {
                    batches.insert(*faction_id, admitted);
                }
                Err(e) => {
                    self.requeue(batches.keys()).await;
                    return Err(e);
                }
            }
        }
        Ok(batches)
    }

    /// Returns the latest admission of every faction to its queue.
    ///
    /// For a battle that was admitted but never reached the game client.
    pub async fn requeue_admitted(&self) {
        self.requeue(self.queues.keys()).await;
    }

    async fn requeue<'a>(&self, faction_ids: impl IntoIterator<Item = &'a FactionId>) {
        for faction_id in faction_ids {
            let Some(handle) = self.queues.get(faction_id) else {
                continue;
            };
            if let Err(e) = handle.requeue_admitted().await {
                tracing::error!(%faction_id, error = %e, "admitted war machines lost");
            }
        }
    }

    /// Queue length per faction. Unreachable queues are skipped.
    pub async fn lengths(&self) -> BTreeMap<FactionId, usize> {
        let mut lengths = BTreeMap::new();
        for (faction_id, handle) in &self.queues {
            match handle.len().await {
                Ok(len) => {
                    lengths.insert(*faction_id, len);
                }
                Err(e) => tracing::warn!(%faction_id, error = %e, "queue length unavailable"),
            }
        }
        lengths
    }

    /// Stops every actor.
    pub async fn shutdown(&self) {
        for handle in self.queues.values() {
            let _ = handle.shutdown().await;
        }
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("factions", &self.queues.len())
            .field("config", &self.config)
            .finish()
    }
}
