//! The lifecycle actor: sole owner of the live battle.
//!
//! Handlers never touch the [`Battle`] directly. They send commands through
//! a [`LifecycleHandle`]; the actor validates, persists, mutates, and
//! publishes in that order, one command at a time.

use std::sync::Arc;

use arena_events::{EventData, EventKind, EventPublisher};
use arena_protocol::{
    Battle, BattleCommand, BattleId, BattleRewardList, DestroyedRecord, Faction, GameMessage,
    Vector3, WarMachine, WarMachineId, WarMachineTick,
};
use arena_queue::QueueManager;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::store::finish;
use crate::{
    AbilityRequest, AiSpawnedRequest, BattleError, BattleState, DestroyedRequest, EndRequest,
    LifecycleConfig, Persistence, StartRequest, StateEvent, StoreError, Transaction,
};

/// Where the lifecycle pushes messages addressed to the game client.
///
/// The connection layer implements this on its outbound queue.
#[async_trait]
pub trait ClientSink: Send + Sync + 'static {
    async fn send(&self, message: GameMessage) -> Result<(), BattleError>;
}

type Reply<T> = oneshot::Sender<Result<T, BattleError>>;

/// Commands sent to the lifecycle actor.
pub(crate) enum LifecycleCommand {
    /// Prepare a fresh battle.
    Initialize {
        reply: Reply<BattleId>,
    },

    /// Grace timer fired for `ended`. Ignored if the battle moved on.
    Reinitialize {
        ended: BattleId,
    },

    Start {
        request: Box<StartRequest>,
        reply: Reply<BattleId>,
    },

    End {
        request: EndRequest,
        reply: Reply<BattleId>,
    },

    Destroyed {
        request: DestroyedRequest,
        reply: Reply<BattleId>,
    },

    AiSpawned {
        request: Box<AiSpawnedRequest>,
        reply: Reply<BattleId>,
    },

    Ability {
        request: Box<AbilityRequest>,
        reply: Reply<BattleId>,
    },

    Ticks {
        ticks: Vec<WarMachineTick>,
    },

    Snapshot {
        reply: oneshot::Sender<(BattleState, Battle)>,
    },

    Shutdown,
}

/// Handle to the running lifecycle actor. Cheap to clone.
#[derive(Clone)]
pub struct LifecycleHandle {
    sender: mpsc::Sender<LifecycleCommand>,
}

impl LifecycleHandle {
    /// Prepares the next battle and sends it to the game client.
    pub async fn initialize(&self) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.request(LifecycleCommand::Initialize { reply }, rx)
            .await?
    }

    pub async fn start(&self, request: StartRequest) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        let cmd = LifecycleCommand::Start {
            request: Box::new(request),
            reply,
        };
        self.request(cmd, rx).await?
    }

    pub async fn end(&self, request: EndRequest) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.request(LifecycleCommand::End { request, reply }, rx).await?
    }

    pub async fn war_machine_destroyed(
        &self,
        request: DestroyedRequest,
    ) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        self.request(LifecycleCommand::Destroyed { request, reply }, rx)
            .await?
    }

    pub async fn ai_spawned(&self, request: AiSpawnedRequest) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        let cmd = LifecycleCommand::AiSpawned {
            request: Box::new(request),
            reply,
        };
        self.request(cmd, rx).await?
    }

    pub async fn ability(&self, request: AbilityRequest) -> Result<BattleId, BattleError> {
        let (reply, rx) = oneshot::channel();
        let cmd = LifecycleCommand::Ability {
            request: Box::new(request),
            reply,
        };
        self.request(cmd, rx).await?
    }

    /// Applies telemetry to the live battle. Fire-and-forget.
    pub async fn apply_ticks(&self, ticks: Vec<WarMachineTick>) -> Result<(), BattleError> {
        self.sender
            .send(LifecycleCommand::Ticks { ticks })
            .await
            .map_err(|_| BattleError::Unavailable)
    }

    /// A copy of the live battle.
    pub async fn snapshot(&self) -> Result<Battle, BattleError> {
        let (reply, rx) = oneshot::channel();
        let (_, battle) = self.request(LifecycleCommand::Snapshot { reply }, rx).await?;
        Ok(battle)
    }

    pub async fn state(&self) -> Result<BattleState, BattleError> {
        let (reply, rx) = oneshot::channel();
        let (state, _) = self.request(LifecycleCommand::Snapshot { reply }, rx).await?;
        Ok(state)
    }

    pub async fn shutdown(&self) -> Result<(), BattleError> {
        self.sender
            .send(LifecycleCommand::Shutdown)
            .await
            .map_err(|_| BattleError::Unavailable)
    }

    async fn request<T>(
        &self,
        cmd: LifecycleCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, BattleError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| BattleError::Unavailable)?;
        rx.await.map_err(|_| BattleError::Unavailable)
    }
}

/// Starts the lifecycle actor in `Uninitialized` state.
///
/// Nothing is initialized until someone calls
/// [`LifecycleHandle::initialize`].
pub fn spawn_lifecycle(
    config: LifecycleConfig,
    store: Arc<dyn Persistence>,
    queues: QueueManager,
    events: Arc<dyn EventPublisher>,
    client: Arc<dyn ClientSink>,
) -> LifecycleHandle {
    let config = config.validated();
    let (sender, receiver) = mpsc::channel(config.channel_size);

    let actor = LifecycleActor {
        state: BattleState::Uninitialized,
        battle: Battle::default(),
        config,
        store,
        queues,
        events,
        client,
        timer: sender.downgrade(),
        receiver,
    };
    tokio::spawn(actor.run());

    LifecycleHandle { sender }
}

struct LifecycleActor {
    state: BattleState,
    battle: Battle,
    config: LifecycleConfig,
    store: Arc<dyn Persistence>,
    queues: QueueManager,
    events: Arc<dyn EventPublisher>,
    client: Arc<dyn ClientSink>,
    /// Weak so a pending grace timer never keeps the actor alive.
    timer: mpsc::WeakSender<LifecycleCommand>,
    receiver: mpsc::Receiver<LifecycleCommand>,
}

impl LifecycleActor {
    async fn run(mut self) {
        tracing::info!("battle lifecycle started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                LifecycleCommand::Initialize { reply } => {
                    let result = self.handle_initialize().await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "battle initialization failed");
                    }
                    let _ = reply.send(result);
                }
                LifecycleCommand::Reinitialize { ended } => {
                    if self.state != BattleState::Ended || self.battle.id != ended {
                        tracing::debug!(battle_id = %ended, "grace timer fired for a stale battle");
                        continue;
                    }
                    if let Err(e) = self.handle_initialize().await {
                        tracing::error!(error = %e, "scheduled battle initialization failed");
                    }
                }
                LifecycleCommand::Start { request, reply } => {
                    let _ = reply.send(self.handle_start(*request).await);
                }
                LifecycleCommand::End { request, reply } => {
                    let _ = reply.send(self.handle_end(request).await);
                }
                LifecycleCommand::Destroyed { request, reply } => {
                    let _ = reply.send(self.handle_destroyed(request).await);
                }
                LifecycleCommand::AiSpawned { request, reply } => {
                    let _ = reply.send(self.handle_ai_spawned(*request).await);
                }
                LifecycleCommand::Ability { request, reply } => {
                    let _ = reply.send(self.handle_ability(*request).await);
                }
                LifecycleCommand::Ticks { ticks } => self.handle_ticks(ticks),
                LifecycleCommand::Snapshot { reply } => {
                    let _ = reply.send((self.state, self.battle.clone()));
                }
                LifecycleCommand::Shutdown => break,
            }
        }

        tracing::info!("battle lifecycle stopped");
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    async fn handle_initialize(&mut self) -> Result<BattleId, BattleError> {
        if self.state.is_running() {
            tracing::warn!(battle_id = %self.battle.id, "abandoning a started battle");
        }

        // Everything fallible that does not consume queue entries runs first.
        let map = self.store.random_map().await?;
        let factions = self.store.factions().await?;
        let admitted = self.queues.admit_all().await?;

        let battle = Battle {
            id: BattleId::random(),
            map: Some(map),
            war_machines: assign_slots(admitted.into_values().flatten()),
            factions: factions.into_iter().map(|f| (f.id, f)).collect(),
            ..Battle::default()
        };

        // The client must hear about the battle before we commit to it.
        if let Err(e) = self.announce(&battle).await {
            self.queues.requeue_admitted().await;
            return Err(e);
        }

        tracing::info!(
            battle_id = %battle.id,
            map = battle.map.as_ref().map(|m| m.name.as_str()).unwrap_or_default(),
            war_machines = battle.war_machines.len(),
            "battle initialized"
        );

        self.battle = battle;
        self.state = BattleState::Initialized;
        self.events
            .publish(EventKind::BattleInit, EventData::Battle(self.battle.clone()));

        Ok(self.battle.id)
    }

    async fn announce(&self, battle: &Battle) -> Result<(), BattleError> {
        let payload = serde_json::to_value(battle.init_payload())?;
        self.client
            .send(GameMessage::new(BattleCommand::INIT, payload))
            .await
    }

    async fn handle_start(&mut self, request: StartRequest) -> Result<BattleId, BattleError> {
        if request.battle_id.is_nil() {
            return Err(BattleError::MissingBattleId);
        }
        if request.map_id.is_nil() {
            return Err(BattleError::MissingMapId);
        }
        if request.war_machines.is_empty() {
            return Err(BattleError::NoWarMachines);
        }
        self.check_transition(BattleState::Started)?;
        self.check_battle_id(request.battle_id)?;

        let map = self.store.map(request.map_id).await?;
        let mut factions = self.store.factions().await?;
        factions.sort_by_key(|f| f.id);

        let war_machines = self.place_war_machines(&request, &factions).await?;

        let next = Battle {
            id: self.battle.id,
            map: Some(map),
            started_at: Some(Utc::now()),
            war_machines,
            factions: factions.into_iter().map(|f| (f.id, f)).collect(),
            ..Battle::default()
        };

        let mut tx = self.store.begin().await?;
        let result = record_start(tx.as_mut(), &next).await;
        finish(tx, result, "battle start").await?;

        tracing::info!(
            battle_id = %next.id,
            war_machines = next.war_machines.len(),
            "battle started"
        );

        self.battle = next;
        self.state = BattleState::Started;
        self.events
            .publish(EventKind::BattleStarted, EventData::Battle(self.battle.clone()));

        Ok(self.battle.id)
    }

    /// Resolves each requested machine and fills in what the client left
    /// out: faction round-robin, positions spaced along x, rotation 0.
    async fn place_war_machines(
        &self,
        request: &StartRequest,
        factions: &[Faction],
    ) -> Result<Vec<WarMachine>, BattleError> {
        let mut placed: Vec<WarMachine> = Vec::with_capacity(request.war_machines.len());
        let mut round_robin = factions.iter().cycle();

        for (index, entry) in request.war_machines.iter().enumerate() {
            let mut wm = match self.battle.war_machine(entry.id) {
                Some(wm) => wm.clone(),
                None => self
                    .store
                    .war_machine(entry.id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("war machine", entry.id))?,
            };

            if entry.participant_id != 0 {
                wm.participant_id = entry.participant_id;
            }
            if wm.participant_id == 0 {
                return Err(BattleError::MissingParticipantId(wm.id));
            }
            if placed.iter().any(|p| p.participant_id == wm.participant_id) {
                return Err(BattleError::ParticipantTaken(wm.participant_id));
            }

            if entry.faction_id.is_some() {
                wm.faction_id = entry.faction_id;
            }
            if wm.faction_id.is_none() {
                wm.faction_id = round_robin.next().map(|f| f.id);
            }

            let offset = i32::try_from(index)
                .unwrap_or(i32::MAX)
                .saturating_mul(self.config.position_spacing);
            wm.position = entry
                .position
                .or(wm.position)
                .or(Some(Vector3::new(offset, 0, 0)));
            wm.rotation = entry.rotation.or(wm.rotation).or(Some(0));

            placed.push(wm);
        }

        Ok(placed)
    }

    async fn handle_end(&mut self, request: EndRequest) -> Result<BattleId, BattleError> {
        if request.battle_id.is_nil() {
            return Err(BattleError::MissingBattleId);
        }
        self.check_transition(BattleState::Ended)?;
        self.check_battle_id(request.battle_id)?;

        let battle_id = self.battle.id;
        let ended_at = Utc::now();
        let winners: Vec<WarMachineId> =
            request.winning_war_machines.iter().map(|w| w.id).collect();

        let mut tx = self.store.begin().await?;
        let result = record_end(tx.as_mut(), battle_id, ended_at, &request, &winners).await;
        finish(tx, result, "battle end").await?;

        self.battle.ended_at = Some(ended_at);
        self.battle.winning_condition = request.win_condition;
        self.battle.winning_war_machines = winners;
        for winner in &request.winning_war_machines {
            if let Some(wm) = self
                .battle
                .war_machines
                .iter_mut()
                .find(|wm| wm.id == winner.id)
            {
                wm.health = winner.health;
            }
        }
        self.state = BattleState::Ended;

        let rewards = BattleRewardList::from_battle(&self.battle);
        tracing::info!(
            %battle_id,
            win_condition = request.win_condition.map(|c| c.as_str()).unwrap_or("NONE"),
            winners = self.battle.winning_war_machines.len(),
            "battle ended"
        );
        self.events.publish(
            EventKind::BattleEnded,
            EventData::BattleEnded {
                battle: self.battle.clone(),
                rewards,
            },
        );

        self.schedule_reinitialize(battle_id);
        Ok(battle_id)
    }

    fn schedule_reinitialize(&self, ended: BattleId) {
        let timer = self.timer.clone();
        let delay = self.config.grace_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(sender) = timer.upgrade() else {
                tracing::debug!(battle_id = %ended, "lifecycle gone before grace timer fired");
                return;
            };
            let _ = sender.send(LifecycleCommand::Reinitialize { ended }).await;
        });
    }

    // -----------------------------------------------------------------------
    // In-battle events
    // -----------------------------------------------------------------------

    async fn handle_destroyed(&mut self, request: DestroyedRequest) -> Result<BattleId, BattleError> {
        self.check_live(request.battle_id)?;
        let event = request
            .destroyed_war_machine_event
            .ok_or(BattleError::MissingEvent("destroyed war machine event"))?;

        let slot = event.destroyed_participant_id;
        if self.battle.destroyed.contains_key(&slot) {
            return Err(BattleError::AlreadyDestroyed(slot));
        }
        let destroyed = self
            .battle
            .participant(slot)
            .ok_or(BattleError::UnknownParticipant(slot))?
            .id;
        let killer = match event.killed_by_participant_id.filter(|s| *s != 0) {
            Some(s) => Some(
                self.battle
                    .participant(s)
                    .ok_or(BattleError::UnknownParticipant(s))?
                    .id,
            ),
            None => None,
        };
        let damage_records = event
            .damage_history
            .iter()
            .map(|entry| {
                let caused_by = entry
                    .instigator_participant_id
                    .and_then(|s| self.battle.participant(s))
                    .map(|wm| wm.id);
                entry.resolve(caused_by)
            })
            .collect();

        let record = DestroyedRecord {
            destroyed_war_machine: destroyed,
            killed_by_war_machine: killer,
            killed_by: event.killed_by,
            damage_records,
        };

        let battle_id = self.battle.id;
        let mut tx = self.store.begin().await?;
        let result = tx.insert_destroyed_event(battle_id, slot, &record).await;
        finish(tx, result, "war machine destroyed").await?;

        if let Some(wm) = self.battle.participant_mut(slot) {
            wm.health = 0;
            wm.shield = 0;
        }
        self.battle.destroyed.insert(slot, record.clone());

        tracing::info!(%battle_id, participant_id = slot, killed_by = %record.killed_by, "war machine destroyed");
        self.events.publish(
            EventKind::WarMachineDestroyed,
            EventData::Destroyed {
                battle_id,
                participant_id: slot,
                record,
            },
        );
        Ok(battle_id)
    }

    async fn handle_ai_spawned(&mut self, request: AiSpawnedRequest) -> Result<BattleId, BattleError> {
        self.check_live(request.battle_id)?;
        let event = request
            .spawned_ai_event
            .ok_or(BattleError::MissingEvent("spawned AI event"))?;

        if self.battle.participant(event.participant_id).is_some() {
            return Err(BattleError::ParticipantTaken(event.participant_id));
        }

        let mut ai = WarMachine::new(
            WarMachineId::random(),
            event.name,
            event.max_health,
            event.max_shield,
        );
        ai.model = event.model;
        ai.skin = event.skin;
        ai.faction_id = event.faction_id;
        ai.participant_id = event.participant_id;
        ai.position = event.position;
        ai.rotation = event.rotation;
        ai.is_ai = true;

        let battle_id = self.battle.id;
        let mut tx = self.store.begin().await?;
        let result = tx.insert_spawned_ai(battle_id, &ai).await;
        finish(tx, result, "AI spawned").await?;

        tracing::info!(%battle_id, participant_id = ai.participant_id, name = %ai.name, "AI spawned");
        self.battle.spawned_ai.push(ai.clone());
        self.events.publish(
            EventKind::AiSpawned,
            EventData::SpawnedAi {
                battle_id,
                war_machine: ai,
            },
        );
        Ok(battle_id)
    }

    async fn handle_ability(&mut self, request: AbilityRequest) -> Result<BattleId, BattleError> {
        self.check_live(request.battle_id)?;
        let event = request
            .ability_event
            .ok_or(BattleError::MissingEvent("ability event"))?;

        let battle_id = self.battle.id;
        let mut tx = self.store.begin().await?;
        let result = tx.insert_ability_event(battle_id, &event).await;
        finish(tx, result, "ability triggered").await?;

        let faction_id = event.faction_id;
        tracing::debug!(%battle_id, ability = %event.label, "ability triggered");
        self.battle.abilities.push(event);

        let actions = self
            .battle
            .abilities
            .iter()
            .filter(|a| a.faction_id == faction_id)
            .cloned()
            .collect();
        self.events.publish(
            EventKind::AbilityTriggered,
            EventData::FactionActions {
                battle_id,
                faction_id,
                actions,
            },
        );
        Ok(battle_id)
    }

    fn handle_ticks(&mut self, ticks: Vec<WarMachineTick>) {
        if self.battle.id.is_nil() {
            tracing::trace!(count = ticks.len(), "ticks before any battle, ignoring");
            return;
        }

        for tick in &ticks {
            let Some(wm) = self.battle.participant_mut(tick.participant_id) else {
                tracing::trace!(participant_id = tick.participant_id, "tick for unknown participant");
                continue;
            };
            if let Some((x, y)) = tick.position {
                let z = wm.position.map(|p| p.z).unwrap_or_default();
                wm.position = Some(Vector3::new(x, y, z));
            }
            if let Some(rotation) = tick.rotation {
                wm.rotation = Some(rotation);
            }
            if let Some(health) = tick.health {
                wm.health = health;
            }
            if let Some(shield) = tick.shield {
                wm.shield = shield;
            }
        }

        self.events.publish(
            EventKind::WarMachinePositionChanged,
            EventData::Ticks {
                battle_id: self.battle.id,
                ticks,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn check_transition(&self, target: BattleState) -> Result<(), BattleError> {
        if self.state.can_transition_to(target) {
            Ok(())
        } else {
            Err(BattleError::InvalidTransition {
                from: self.state,
                to: target,
            })
        }
    }

    fn check_battle_id(&self, got: BattleId) -> Result<(), BattleError> {
        if got == self.battle.id {
            Ok(())
        } else {
            Err(BattleError::BattleIdMismatch {
                expected: self.battle.id,
                got,
            })
        }
    }

    /// In-battle events only need the ID to match; a nil live ID never does.
    fn check_live(&self, got: BattleId) -> Result<(), BattleError> {
        if got.is_nil() {
            return Err(BattleError::MissingBattleId);
        }
        if self.battle.id.is_nil() {
            return Err(BattleError::BattleIdMismatch {
                expected: self.battle.id,
                got,
            });
        }
        self.check_battle_id(got)
    }
}

async fn record_start(tx: &mut dyn Transaction, battle: &Battle) -> Result<(), StoreError> {
    tx.insert_battle(battle).await?;
    tx.assign_war_machines(battle.id, &battle.war_machines).await?;
    tx.insert_state_event(battle.id, StateEvent::BattleStart).await
}

async fn record_end(
    tx: &mut dyn Transaction,
    battle_id: BattleId,
    ended_at: chrono::DateTime<Utc>,
    request: &EndRequest,
    winners: &[WarMachineId],
) -> Result<(), StoreError> {
    tx.end_battle(battle_id, ended_at, request.win_condition).await?;
    if !winners.is_empty() {
        tx.set_winners(battle_id, winners).await?;
    }
    tx.insert_state_event(battle_id, StateEvent::BattleEnd).await
}

/// Numbers admitted machines from slot 1 in admission order.
///
/// `QueueManager::start` keeps a round within the slot range; anything past
/// slot 255 is dropped with a warning.
fn assign_slots(admitted: impl IntoIterator<Item = WarMachine>) -> Vec<WarMachine> {
    let mut admitted = admitted.into_iter();
    let war_machines: Vec<WarMachine> = admitted
        .by_ref()
        .zip(1..=u8::MAX)
        .map(|(mut wm, slot)| {
            wm.participant_id = slot;
            wm
        })
        .collect();

    let dropped = admitted.count();
    if dropped > 0 {
        tracing::warn!(dropped, "no participant slot left for admitted war machines");
    }
    war_machines
}
