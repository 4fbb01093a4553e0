//! Battle queue admission control.
//!
//! Each faction has a queue of war machines waiting for a battle, owned by
//! its own actor task. When the lifecycle asks for the next battle's
//! combatants, each actor hands over exactly `K` machines: queued ones
//! first, in enqueue order, then defaults synthesized from the roster.
//!
//! # Key types
//!
//! - [`QueueManager`] - starts one actor per faction and routes to them
//! - [`FactionQueueHandle`] - talk to one running faction queue
//! - [`RosterProvider`] - the external roster/identity collaborator
//! - [`StaticRoster`] - in-memory roster with call recording
//! - [`QueueConfig`] - battle size, backfill delay, channel size

mod config;
mod error;
mod manager;
mod queue;
mod roster;

pub use config::QueueConfig;
pub use error::{QueueError, RosterError};
pub use manager::{QueueManager, MAX_PARTICIPANTS};
pub use queue::{spawn_faction_queue, FactionQueueHandle};
pub use roster::{RosterCall, RosterProvider, StaticRoster};
