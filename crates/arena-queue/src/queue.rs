//! Faction queue actor: one Tokio task per faction owning its queue.
//!
//! Every read and write of a faction's queue goes through the actor's
//! channel, so admission, joins, and leaves are strictly serialized
//! without any lock around the queue itself.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use arena_events::{EventData, EventKind, EventPublisher};
use arena_protocol::{
    FactionId, OwnerQueuePositions, PlayerId, QueuePosition, QueueUpdate, QueuedWarMachine,
    WarMachine, WarMachineId,
};
use tokio::sync::{mpsc, oneshot};

use crate::{QueueConfig, QueueError, RosterProvider};

/// Commands sent to a faction queue actor.
pub(crate) enum QueueCommand {
    /// Take up to `amount` machines for the next battle, topping up with
    /// defaults so exactly `amount` come back.
    Admit {
        amount: usize,
        reply: oneshot::Sender<Vec<WarMachine>>,
    },

    /// Append a machine to the back of the queue.
    Join {
        war_machine: Box<WarMachine>,
        reply: oneshot::Sender<Result<usize, QueueError>>,
    },

    /// Withdraw a machine.
    Leave {
        war_machine_id: WarMachineId,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },

    /// Put the queued machines from the latest admission back at the head.
    Requeue {
        reply: oneshot::Sender<usize>,
    },

    Len {
        reply: oneshot::Sender<usize>,
    },

    Snapshot {
        reply: oneshot::Sender<Vec<QueuedWarMachine>>,
    },

    Shutdown,
}

/// Handle to a running faction queue actor.
///
/// Cheap to clone. The [`QueueManager`](crate::QueueManager) holds one per
/// faction.
#[derive(Clone)]
pub struct FactionQueueHandle {
    faction_id: FactionId,
    sender: mpsc::Sender<QueueCommand>,
}

impl FactionQueueHandle {
    pub fn faction_id(&self) -> FactionId {
        self.faction_id
    }

    /// Requests `amount` war machines for the next battle.
    ///
    /// Always resolves to exactly `amount` machines: queued ones first in
    /// enqueue order, then synthesized defaults. Waits while the actor
    /// retries the roster for defaults.
    pub async fn admit(&self, amount: usize) -> Result<Vec<WarMachine>, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.request(QueueCommand::Admit { amount, reply }, rx).await
    }

    /// Queues a war machine. Returns its zero-based position.
    pub async fn join(&self, war_machine: WarMachine) -> Result<usize, QueueError> {
        let (reply, rx) = oneshot::channel();
        let cmd = QueueCommand::Join {
            war_machine: Box::new(war_machine),
            reply,
        };
        self.request(cmd, rx).await?
    }

    /// Removes a war machine from the queue.
    pub async fn leave(&self, war_machine_id: WarMachineId) -> Result<(), QueueError> {
        let (reply, rx) = oneshot::channel();
        self.request(QueueCommand::Leave { war_machine_id, reply }, rx)
            .await?
    }

    /// Undoes the latest admission for machines that came from the queue.
    ///
    /// They go back to the head in their original order with their original
    /// enqueue times. Synthesized defaults are not requeued, and machines
    /// that joined again in the meantime are skipped. Returns how many were
    /// restored; a second call restores nothing.
    pub async fn requeue_admitted(&self) -> Result<usize, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.request(QueueCommand::Requeue { reply }, rx).await
    }

    /// Number of queued machines.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.request(QueueCommand::Len { reply }, rx).await
    }

    /// A copy of the queue, head first.
    pub async fn snapshot(&self) -> Result<Vec<QueuedWarMachine>, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.request(QueueCommand::Snapshot { reply }, rx).await
    }

    /// Stops the actor. Queued machines are dropped.
    pub async fn shutdown(&self) -> Result<(), QueueError> {
        self.sender
            .send(QueueCommand::Shutdown)
            .await
            .map_err(|_| QueueError::Unavailable(self.faction_id))
    }

    async fn request<T>(
        &self,
        cmd: QueueCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, QueueError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| QueueError::Unavailable(self.faction_id))?;
        rx.await.map_err(|_| QueueError::Unavailable(self.faction_id))
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct FactionQueueActor {
    faction_id: FactionId,
    config: QueueConfig,
    entries: VecDeque<QueuedWarMachine>,
    /// Entries taken off the queue by the latest admission.
    last_admitted: Vec<QueuedWarMachine>,
    roster: Arc<dyn RosterProvider>,
    events: Arc<dyn EventPublisher>,
    receiver: mpsc::Receiver<QueueCommand>,
}

impl FactionQueueActor {
    async fn run(mut self) {
        tracing::info!(faction_id = %self.faction_id, "faction queue started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                QueueCommand::Admit { amount, reply } => {
                    let admitted = self.handle_admit(amount).await;
                    let _ = reply.send(admitted);
                }
                QueueCommand::Join { war_machine, reply } => {
                    let _ = reply.send(self.handle_join(*war_machine));
                }
                QueueCommand::Leave {
                    war_machine_id,
                    reply,
                } => {
                    let _ = reply.send(self.handle_leave(war_machine_id));
                }
                QueueCommand::Requeue { reply } => {
                    let restored = self.handle_requeue().await;
                    let _ = reply.send(restored);
                }
                QueueCommand::Len { reply } => {
                    let _ = reply.send(self.entries.len());
                }
                QueueCommand::Snapshot { reply } => {
                    let _ = reply.send(self.entries.iter().cloned().collect());
                }
                QueueCommand::Shutdown => break,
            }
        }

        tracing::info!(faction_id = %self.faction_id, "faction queue stopped");
    }

    async fn handle_admit(&mut self, amount: usize) -> Vec<WarMachine> {
        let admitted = if self.entries.len() <= amount {
            self.last_admitted = self.entries.drain(..).collect();
            let mut admitted: Vec<WarMachine> =
                self.last_admitted.iter().map(|e| e.war_machine.clone()).collect();
            let queued = admitted.len();
            self.backfill(&mut admitted, amount).await;

            tracing::info!(
                faction_id = %self.faction_id,
                queued,
                synthesized = admitted.len() - queued,
                "queue drained into battle"
            );
            if let Err(e) = self.roster.queue_cleared(self.faction_id).await {
                tracing::error!(faction_id = %self.faction_id, error = %e, "queue cleared notification failed");
            }
            admitted
        } else {
            self.last_admitted = self.entries.drain(..amount).collect();
            let admitted: Vec<WarMachine> =
                self.last_admitted.iter().map(|e| e.war_machine.clone()).collect();
            let positions = self.owner_positions(&admitted);

            tracing::info!(
                faction_id = %self.faction_id,
                admitted = admitted.len(),
                remaining = self.entries.len(),
                "queue advanced"
            );
            if let Err(e) = self
                .roster
                .queue_positions_changed(self.faction_id, positions)
                .await
            {
                tracing::error!(faction_id = %self.faction_id, error = %e, "queue position notification failed");
            }
            admitted
        };

        self.publish_update();
        admitted
    }

    /// Tops `admitted` up to `amount` with default machines from the roster.
    ///
    /// Roster errors and short answers are retried after `backfill_delay`.
    async fn backfill(&self, admitted: &mut Vec<WarMachine>, amount: usize) {
        while admitted.len() < amount {
            let missing = amount - admitted.len();
            match self
                .roster
                .default_war_machines(self.faction_id, missing)
                .await
            {
                Ok(mut machines) => {
                    machines.truncate(missing);
                    for wm in &mut machines {
                        wm.faction_id = Some(self.faction_id);
                    }
                    admitted.extend(machines);
                }
                Err(e) => {
                    tracing::error!(
                        faction_id = %self.faction_id,
                        missing,
                        error = %e,
                        "default war machines unavailable"
                    );
                }
            }

            if admitted.len() < amount {
                tokio::time::sleep(self.config.backfill_delay).await;
            }
        }
    }

    async fn handle_requeue(&mut self) -> usize {
        let returning: Vec<QueuedWarMachine> = std::mem::take(&mut self.last_admitted)
            .into_iter()
            .filter(|r| !self.entries.iter().any(|e| e.war_machine.id == r.war_machine.id))
            .collect();
        if returning.is_empty() {
            return 0;
        }

        let restored = returning.len();
        for entry in returning.into_iter().rev() {
            self.entries.push_front(entry);
        }
        tracing::warn!(
            faction_id = %self.faction_id,
            restored,
            queued = self.entries.len(),
            "admitted war machines returned to queue"
        );

        let positions = self.owner_positions(&[]);
        if let Err(e) = self
            .roster
            .queue_positions_changed(self.faction_id, positions)
            .await
        {
            tracing::error!(faction_id = %self.faction_id, error = %e, "queue position notification failed");
        }
        self.publish_update();
        restored
    }

    fn handle_join(&mut self, mut war_machine: WarMachine) -> Result<usize, QueueError> {
        match war_machine.faction_id {
            Some(actual) if actual != self.faction_id => {
                return Err(QueueError::WrongFaction {
                    war_machine: war_machine.id,
                    expected: self.faction_id,
                    actual,
                });
            }
            Some(_) => {}
            None => war_machine.faction_id = Some(self.faction_id),
        }
        if self.entries.iter().any(|e| e.war_machine.id == war_machine.id) {
            return Err(QueueError::AlreadyQueued(war_machine.id, self.faction_id));
        }

        let war_machine_id = war_machine.id;
        self.entries.push_back(QueuedWarMachine::now(war_machine));
        let position = self.entries.len() - 1;
        tracing::debug!(
            faction_id = %self.faction_id,
            %war_machine_id,
            position,
            "war machine queued"
        );
        Ok(position)
    }

    fn handle_leave(&mut self, war_machine_id: WarMachineId) -> Result<(), QueueError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.war_machine.id == war_machine_id)
            .ok_or(QueueError::NotQueued(war_machine_id, self.faction_id))?;
        self.entries.remove(index);
        tracing::debug!(faction_id = %self.faction_id, %war_machine_id, "war machine left queue");
        Ok(())
    }

    /// Current positions grouped by owner. Admitted machines are listed
    /// with no position. Ownerless machines are skipped.
    fn owner_positions(&self, admitted: &[WarMachine]) -> Vec<OwnerQueuePositions> {
        let mut by_owner: BTreeMap<PlayerId, Vec<QueuePosition>> = BTreeMap::new();

        for wm in admitted {
            if let Some(owner) = wm.owned_by {
                by_owner.entry(owner).or_default().push(QueuePosition {
                    war_machine_id: wm.id,
                    position: None,
                });
            }
        }
        for (index, entry) in self.entries.iter().enumerate() {
            if let Some(owner) = entry.war_machine.owned_by {
                by_owner.entry(owner).or_default().push(QueuePosition {
                    war_machine_id: entry.war_machine.id,
                    position: Some(index),
                });
            }
        }

        by_owner
            .into_iter()
            .map(|(owner_id, positions)| OwnerQueuePositions {
                owner_id,
                positions,
            })
            .collect()
    }

    fn publish_update(&self) {
        let update = QueueUpdate {
            faction_id: self.faction_id,
            length: self.entries.len(),
            preview: self
                .entries
                .iter()
                .take(self.config.preview_len)
                .cloned()
                .collect(),
        };
        self.events
            .publish(EventKind::WarMachineQueueUpdated, EventData::QueueUpdated(update));
    }
}

/// Spawns a faction queue actor and returns a handle to it.
pub fn spawn_faction_queue(
    faction_id: FactionId,
    config: QueueConfig,
    roster: Arc<dyn RosterProvider>,
    events: Arc<dyn EventPublisher>,
) -> FactionQueueHandle {
    let config = config.validated();
    let (tx, rx) = mpsc::channel(config.channel_size);

    let actor = FactionQueueActor {
        faction_id,
        config,
        entries: VecDeque::new(),
        last_admitted: Vec::new(),
        roster,
        events,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    FactionQueueHandle {
        faction_id,
        sender: tx,
    }
}
