//! Command envelopes exchanged with the game client.
//!
//! Every JSON message in either direction names a battle command. Inbound
//! messages arrive as a [`Request`]; the server sends [`GameMessage`]s on
//! its own initiative and [`CommandReply`]s in answer to requests.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// A battle command key such as `BATTLE:START`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleCommand(Cow<'static, str>);

impl BattleCommand {
    /// Client announces it is ready for the next battle.
    pub const READY: Self = Self::from_static("BATTLE:READY");
    /// Next battle setup. Sent by the server, also accepted inbound.
    pub const INIT: Self = Self::from_static("BATTLE:INIT");
    pub const START: Self = Self::from_static("BATTLE:START");
    pub const END: Self = Self::from_static("BATTLE:END");
    pub const WAR_MACHINE_DESTROYED: Self = Self::from_static("BATTLE:WAR_MACHINE_DESTROYED");
    pub const AI_SPAWNED: Self = Self::from_static("BATTLE:AI_SPAWNED");
    pub const ABILITY: Self = Self::from_static("BATTLE:ABILITY");

    /// Creates a command key from a string literal.
    pub const fn from_static(key: &'static str) -> Self {
        Self(Cow::Borrowed(key))
    }

    /// Creates a command key from an owned string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Cow::Owned(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BattleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for BattleCommand {
    fn from(key: &'static str) -> Self {
        Self::from_static(key)
    }
}

/// An inbound command envelope.
///
/// `payload` is kept as raw JSON; each command handler decodes the shape
/// it expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default = "empty_command")]
    pub battle_command: BattleCommand,
    #[serde(default)]
    pub payload: Value,
}

fn empty_command() -> BattleCommand {
    BattleCommand::from_static("")
}

impl Request {
    pub fn new(command: BattleCommand, payload: Value) -> Self {
        Self {
            battle_command: command,
            payload,
        }
    }

    /// Rejects envelopes that do not name a command.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.battle_command.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "missing battleCommand".into(),
            ));
        }
        Ok(())
    }
}

/// A message the server pushes to the game client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMessage {
    pub battle_command: BattleCommand,
    pub payload: Value,
}

impl GameMessage {
    pub fn new(command: BattleCommand, payload: Value) -> Self {
        Self {
            battle_command: command,
            payload,
        }
    }
}

/// The answer to one inbound command.
///
/// On failure `payload` carries the error message as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub battle_command: BattleCommand,
    pub success: bool,
    pub payload: Value,
}

impl CommandReply {
    pub fn success(command: BattleCommand, payload: Value) -> Self {
        Self {
            battle_command: command,
            success: true,
            payload,
        }
    }

    pub fn failure(command: BattleCommand, message: impl fmt::Display) -> Self {
        Self {
            battle_command: command,
            success: false,
            payload: Value::String(message.to_string()),
        }
    }
}
