//! Wire protocol and shared data model for the arena orchestrator.
//!
//! This crate answers "what goes over the wire?" for the link between
//! the orchestrator and the game client:
//!
//! - **Frames** - the one-byte [`NetMessageType`] tag and [`decode_binary`]
//! - **Envelopes** - [`Request`] inbound, [`GameMessage`] and
//!   [`CommandReply`] outbound, keyed by [`BattleCommand`]
//! - **Telemetry** - the hand-parsed [`WarMachineTick`] layout
//! - **Data model** - [`Battle`], [`WarMachine`], destruction records,
//!   queue positions, and the identity newtypes
//! - **Codec** - the [`Codec`] trait and [`JsonCodec`]
//!
//! Nothing here does I/O.

mod codec;
mod error;
mod frame;
mod ids;
mod message;
mod telemetry;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::{decode_binary, decode_text, encode_json_frame, Frame, NetMessageType};
pub use ids::{BattleId, FactionId, MapId, PlayerId, WarMachineId};
pub use message::{BattleCommand, CommandReply, GameMessage, Request};
pub use telemetry::{decode_war_machine_ticks, encode_war_machine_ticks, WarMachineTick};
pub use types::{
    AbilityEvent, Battle, BattleRewardList, DamageRecord, DestroyedRecord, Faction, GameMap,
    InitBattlePayload, OwnerQueuePositions, QueuePosition, QueueUpdate, QueuedWarMachine, Vector3,
    WarMachine, WinCondition,
};
