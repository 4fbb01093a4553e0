//! Lifecycle configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LifecycleConfig
// ---------------------------------------------------------------------------

/// Configuration for the battle lifecycle actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Pause between a battle ending and the next one being initialized.
    pub grace_delay: Duration,

    /// Distance between provisional spawn points along the x axis.
    pub position_spacing: i32,

    /// Command channel capacity.
    pub channel_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(10),
            position_spacing: 1000,
            channel_size: 64,
        }
    }
}

impl LifecycleConfig {
    /// Clamp values that would stall the actor.
    pub fn validated(mut self) -> Self {
        if self.channel_size == 0 {
            tracing::warn!("lifecycle channel_size is 0, using 1");
            self.channel_size = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// BattleState
// ---------------------------------------------------------------------------

/// The lifecycle state of the live battle.
///
/// ```text
/// Uninitialized → Initialized → Started → Ended
///                      ↑                    │
///                      └──── grace delay ───┘
/// ```
///
/// - **Uninitialized**: process just started, no battle prepared yet.
/// - **Initialized**: combatants admitted and sent to the game client,
///   waiting for it to start the battle.
/// - **Started**: battle persisted and running; in-battle events flow.
/// - **Ended**: results persisted. Re-initialized after the grace delay.
///
/// Initialize is accepted from every state, so the client can ask for a
/// fresh battle at any time. Every other transition follows [`next`](Self::next).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleState {
    Uninitialized,
    Initialized,
    Started,
    Ended,
}

impl BattleState {
    /// The state that normally follows this one.
    pub fn next(self) -> Self {
        match self {
            Self::Uninitialized => Self::Initialized,
            Self::Initialized => Self::Started,
            Self::Started => Self::Ended,
            Self::Ended => Self::Initialized,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        target == Self::Initialized || self.next() == target
    }

    /// Returns `true` while in-battle events are expected.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Started)
    }
}

impl std::fmt::Display for BattleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Started => write!(f, "Started"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}
