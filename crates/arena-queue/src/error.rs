//! Error types for the queue layer.

use arena_protocol::{FactionId, WarMachineId};

/// Errors from the roster/identity collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RosterError {
    /// The service could not be reached.
    #[error("roster service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an error.
    #[error("roster request failed: {0}")]
    Request(String),
}

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No queue actor exists for this faction.
    #[error("no queue for faction {0}")]
    UnknownFaction(FactionId),

    /// Queues cannot be started without at least one faction.
    #[error("no factions known")]
    NoFactions,

    /// The war machine is already waiting in this queue.
    #[error("war machine {0} already queued for faction {1}")]
    AlreadyQueued(WarMachineId, FactionId),

    /// The war machine is not in this queue.
    #[error("war machine {0} not queued for faction {1}")]
    NotQueued(WarMachineId, FactionId),

    /// The war machine belongs to another faction.
    #[error("war machine {war_machine} belongs to faction {actual}, not {expected}")]
    WrongFaction {
        war_machine: WarMachineId,
        expected: FactionId,
        actual: FactionId,
    },

    /// The war machine has no faction, so it cannot be routed to a queue.
    #[error("war machine {0} has no faction")]
    MissingFaction(WarMachineId),

    /// Factions times war machines per faction exceeds the slot range.
    #[error("battle of {war_machines} war machines exceeds {max} participant slots")]
    BattleTooLarge { war_machines: usize, max: usize },

    /// The queue actor's command channel is full or closed.
    #[error("queue for faction {0} is unavailable")]
    Unavailable(FactionId),
}
