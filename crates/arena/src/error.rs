//! Unified error types for the orchestrator.

use arena_battle::BattleError;
use arena_protocol::{BattleCommand, ProtocolError};
use arena_queue::{QueueError, RosterError};
use arena_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Battle(#[from] BattleError),

    /// A command key was registered twice. This is a wiring bug.
    #[error("command {0} registered twice")]
    DuplicateCommand(BattleCommand),

    /// The builder was not given a required collaborator.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// The outbound queue did not accept a message in time.
    #[error("outbound queue unavailable: {0}")]
    Outbound(&'static str),
}

/// What a command handler can fail with.
///
/// The `Display` output is what the game client sees in the failure reply.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The payload did not match the command's request shape.
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Battle(#[from] BattleError),

    #[error("{0} is unavailable")]
    Unavailable(&'static str),
}

impl CommandError {
    /// Returns `true` when the client sent something wrong, as opposed to
    /// a collaborator failing.
    pub fn is_domain(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::Battle(e) => e.is_domain(),
            Self::Unavailable(_) => false,
        }
    }
}
