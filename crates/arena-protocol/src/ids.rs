//! Identity newtypes.
//!
//! Every entity the orchestrator talks about is keyed by a UUID, but a
//! battle ID and a faction ID must never be interchangeable, so each gets
//! its own wrapper. They serialize as the bare UUID string.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// The all-zero identifier, used for "not set".
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns `true` for the all-zero identifier.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifies one battle. Regenerated by every initialize.
    BattleId
);
uuid_id!(
    /// Identifies a faction (team).
    FactionId
);
uuid_id!(
    /// Identifies a player who owns war machines.
    PlayerId
);
uuid_id!(
    /// Identifies a war machine (combatant).
    WarMachineId
);
uuid_id!(
    /// Identifies a battle map.
    MapId
);
