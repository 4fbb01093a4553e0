//! Queue configuration.

use std::time::Duration;

/// Settings shared by every faction queue actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// How many war machines each faction sends into a battle (`K`).
    pub war_machines_per_faction: usize,
    /// Pause between attempts to synthesize default war machines.
    pub backfill_delay: Duration,
    /// Command channel capacity per actor.
    pub channel_size: usize,
    /// How many queue entries a queue-updated event carries.
    pub preview_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            war_machines_per_faction: 2,
            backfill_delay: Duration::from_millis(200),
            channel_size: 64,
            preview_len: 5,
        }
    }
}

impl QueueConfig {
    /// Creates a config admitting `k` war machines per faction.
    pub fn with_battle_size(k: usize) -> Self {
        Self {
            war_machines_per_faction: k,
            ..Self::default()
        }
    }

    /// Clamp values that would stall the actor.
    ///
    /// - `war_machines_per_faction` is at least 1.
    /// - `channel_size` is at least 1 (tokio panics on zero).
    pub fn validated(mut self) -> Self {
        if self.war_machines_per_faction == 0 {
            tracing::warn!("war_machines_per_faction is 0, using 1");
            self.war_machines_per_faction = 1;
        }
        if self.channel_size == 0 {
            tracing::warn!("queue channel_size is 0, using 1");
            self.channel_size = 1;
        }
        self
    }
}
