//! Error types for the lifecycle layer.

use arena_protocol::{BattleId, WarMachineId};
use arena_queue::QueueError;

use crate::BattleState;

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The backend rejected or failed the operation.
    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Errors that can occur during lifecycle operations.
///
/// The first group are domain errors: the request was wrong and nothing
/// changed. The rest are collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("missing battle id")]
    MissingBattleId,

    #[error("missing map id")]
    MissingMapId,

    #[error("no war machines in request")]
    NoWarMachines,

    #[error("mismatch battleID, expected {expected}, got {got}")]
    BattleIdMismatch { expected: BattleId, got: BattleId },

    #[error("cannot move battle from {from} to {to}")]
    InvalidTransition { from: BattleState, to: BattleState },

    #[error("missing participant ID for war machine {0}")]
    MissingParticipantId(WarMachineId),

    #[error("participant {0} is not in this battle")]
    UnknownParticipant(u8),

    #[error("participant {0} was already destroyed")]
    AlreadyDestroyed(u8),

    #[error("participant slot {0} is already taken")]
    ParticipantTaken(u8),

    /// The request omitted the event body it exists to carry.
    #[error("missing {0}")]
    MissingEvent(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A payload for the game client could not be serialized.
    #[error("failed to encode client message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The outbound queue to the game client refused the message.
    #[error("game client unreachable: {0}")]
    Client(String),

    /// The lifecycle actor is not running.
    #[error("battle lifecycle is unavailable")]
    Unavailable,
}

impl BattleError {
    /// Returns `true` for errors caused by the request rather than by a
    /// collaborator.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::Queue(_) | Self::Encode(_) | Self::Client(_) | Self::Unavailable
        )
    }
}
