//! The roster/identity collaborator.
//!
//! Factions and default war machines come from an external service. The
//! queue actors talk to it through [`RosterProvider`]; [`StaticRoster`]
//! is an in-process implementation for development and tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use arena_protocol::{Faction, FactionId, OwnerQueuePositions, WarMachine, WarMachineId};
use async_trait::async_trait;

use crate::RosterError;

/// Source of factions and default war machines, and sink for queue
/// change notifications.
#[async_trait]
pub trait RosterProvider: Send + Sync + 'static {
    /// Lists every faction.
    async fn factions(&self) -> Result<Vec<Faction>, RosterError>;

    /// Fetches up to `amount` default war machines for a faction.
    ///
    /// May return fewer than asked for; callers top up on later attempts.
    async fn default_war_machines(
        &self,
        faction_id: FactionId,
        amount: usize,
    ) -> Result<Vec<WarMachine>, RosterError>;

    /// The faction's queue was emptied into a battle.
    async fn queue_cleared(&self, faction_id: FactionId) -> Result<(), RosterError>;

    /// Queue positions moved for the listed owners.
    async fn queue_positions_changed(
        &self,
        faction_id: FactionId,
        positions: Vec<OwnerQueuePositions>,
    ) -> Result<(), RosterError>;
}

/// A call [`StaticRoster`] received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterCall {
    Factions,
    DefaultWarMachines { faction_id: FactionId, amount: usize },
    QueueCleared(FactionId),
    QueuePositionsChanged(FactionId, Vec<OwnerQueuePositions>),
}

/// In-memory roster with a fixed faction list.
///
/// Every call is recorded. Failures can be injected per operation: each
/// `fail_next_*` call makes that many upcoming requests fail.
#[derive(Debug, Default)]
pub struct StaticRoster {
    factions: Vec<Faction>,
    calls: Mutex<Vec<RosterCall>>,
    fail_factions: AtomicU32,
    empty_factions: AtomicU32,
    fail_defaults: AtomicU32,
    /// Cap on machines returned per default request. 0 means no cap.
    per_request_cap: AtomicUsize,
    synthesized: AtomicUsize,
}

impl StaticRoster {
    pub fn new(factions: Vec<Faction>) -> Self {
        Self {
            factions,
            ..Self::default()
        }
    }

    /// Makes the next `n` faction listings fail.
    pub fn fail_next_factions(&self, n: u32) {
        self.fail_factions.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` faction listings come back empty.
    pub fn empty_next_factions(&self, n: u32) {
        self.empty_factions.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` default war machine requests fail.
    pub fn fail_next_defaults(&self, n: u32) {
        self.fail_defaults.store(n, Ordering::SeqCst);
    }

    /// Limits how many machines a single default request returns.
    pub fn cap_defaults_per_request(&self, cap: usize) {
        self.per_request_cap.store(cap, Ordering::SeqCst);
    }

    /// Everything called so far.
    pub fn calls(&self) -> Vec<RosterCall> {
        self.lock_calls().clone()
    }

    /// Total default war machines handed out.
    pub fn synthesized(&self) -> usize {
        self.synthesized.load(Ordering::SeqCst)
    }

    fn record(&self, call: RosterCall) {
        self.lock_calls().push(call);
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<RosterCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decrements `counter` if positive and reports whether it was.
    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn factions(&self) -> Result<Vec<Faction>, RosterError> {
        self.record(RosterCall::Factions);
        if Self::take_one(&self.fail_factions) {
            return Err(RosterError::Unreachable("injected failure".into()));
        }
        if Self::take_one(&self.empty_factions) {
            return Ok(Vec::new());
        }
        Ok(self.factions.clone())
    }

    async fn default_war_machines(
        &self,
        faction_id: FactionId,
        amount: usize,
    ) -> Result<Vec<WarMachine>, RosterError> {
        self.record(RosterCall::DefaultWarMachines { faction_id, amount });
        if Self::take_one(&self.fail_defaults) {
            return Err(RosterError::Request("injected failure".into()));
        }

        let cap = self.per_request_cap.load(Ordering::SeqCst);
        let amount = if cap == 0 { amount } else { amount.min(cap) };
        let label = self
            .factions
            .iter()
            .find(|f| f.id == faction_id)
            .map_or("Unknown", |f| f.label.as_str());

        let machines = (0..amount)
            .map(|_| {
                let n = self.synthesized.fetch_add(1, Ordering::SeqCst) + 1;
                let mut wm = WarMachine::new(
                    WarMachineId::random(),
                    format!("{label} Default #{n}"),
                    1000,
                    1000,
                );
                wm.faction_id = Some(faction_id);
                wm
            })
            .collect();
        Ok(machines)
    }

    async fn queue_cleared(&self, faction_id: FactionId) -> Result<(), RosterError> {
        self.record(RosterCall::QueueCleared(faction_id));
        Ok(())
    }

    async fn queue_positions_changed(
        &self,
        faction_id: FactionId,
        positions: Vec<OwnerQueuePositions>,
    ) -> Result<(), RosterError> {
        self.record(RosterCall::QueuePositionsChanged(faction_id, positions));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faction(label: &str) -> Faction {
        Faction {
            id: FactionId::random(),
            label: label.into(),
        }
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let roster = StaticRoster::new(vec![faction("Red")]);
        roster.fail_next_factions(1);
        roster.empty_next_factions(1);

        assert!(roster.factions().await.is_err());
        assert!(roster.factions().await.unwrap().is_empty());
        assert_eq!(roster.factions().await.unwrap().len(), 1);
        assert_eq!(roster.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_defaults_carry_faction_and_respect_cap() {
        let red = faction("Red");
        let roster = StaticRoster::new(vec![red.clone()]);
        roster.cap_defaults_per_request(1);

        let machines = roster.default_war_machines(red.id, 3).await.unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].faction_id, Some(red.id));
        assert_eq!(machines[0].name, "Red Default #1");
        assert_eq!(roster.synthesized(), 1);
        assert_eq!(
            roster.calls(),
            vec![RosterCall::DefaultWarMachines { faction_id: red.id, amount: 3 }]
        );
    }
}
