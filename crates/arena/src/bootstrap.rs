//! Process startup: wait for the faction roster, start the queues, and
//! start the reward accounting job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arena_events::EventPublisher;
use arena_protocol::FactionId;
use arena_queue::{QueueConfig, QueueError, QueueManager, RosterProvider};
use arena_retry::{retry_forever, Backoff};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{ArenaError, CancelScope};

/// Consumer of the periodic queue length snapshot.
#[async_trait]
pub trait RewardAccounting: Send + Sync + 'static {
    async fn settle(&self, lengths: &BTreeMap<FactionId, usize>);
}

/// Logs each snapshot. Used when no accounting service is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRewards;

#[async_trait]
impl RewardAccounting for LogRewards {
    async fn settle(&self, lengths: &BTreeMap<FactionId, usize>) {
        let queued: usize = lengths.values().sum();
        tracing::info!(factions = lengths.len(), queued, "queue lengths sampled for rewards");
    }
}

/// Waits for the faction roster, then starts one queue actor per faction.
///
/// The roster is polled with `backoff` until it returns at least one
/// faction. This never gives up: without factions there is nothing to
/// orchestrate, so startup simply waits.
///
/// # Errors
/// Only if the queues cannot be started once factions are known.
pub async fn bootstrap(
    roster: Arc<dyn RosterProvider>,
    events: Arc<dyn EventPublisher>,
    queue_config: QueueConfig,
    backoff: &mut Backoff,
) -> Result<QueueManager, ArenaError> {
    let factions = retry_forever(backoff, "faction roster", || {
        let roster = Arc::clone(&roster);
        async move {
            let factions = roster.factions().await?;
            if factions.is_empty() {
                return Err(ArenaError::Queue(QueueError::NoFactions));
            }
            Ok::<_, ArenaError>(factions)
        }
    })
    .await;

    tracing::info!(factions = factions.len(), "faction roster loaded");
    Ok(QueueManager::start(&factions, queue_config, roster, events)?)
}

/// Samples every queue length each `interval` and hands the snapshot to
/// `accounting` until `scope` is cancelled.
pub fn spawn_reward_accounting(
    queues: QueueManager,
    accounting: Arc<dyn RewardAccounting>,
    interval: Duration,
    scope: CancelScope,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                _ = ticker.tick() => {
                    let lengths = queues.lengths().await;
                    accounting.settle(&lengths).await;
                }
            }
        }
        tracing::debug!("reward accounting stopped");
    })
}
