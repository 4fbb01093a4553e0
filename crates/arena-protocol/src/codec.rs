//! Body serialization for the game client link.
//!
//! Framing (type tags, telemetry layouts) lives in [`crate::frame`]; this
//! module only turns envelope bodies into bytes and back. The game client
//! speaks JSON, so [`JsonCodec`] is the only implementation.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Turns envelope bodies into bytes and back.
///
/// One instance is shared by the receive loop, the send pump and the
/// command handlers, hence the `Send + Sync + 'static` bound.
pub trait Codec: Send + Sync + 'static {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Fails with [`ProtocolError::Decode`] when `data` does not
    /// deserialize into `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Like [`encode`](Self::encode), for WebSocket text frames.
    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        let bytes = self.encode(value)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidMessage(format!("codec produced non UTF-8 text: {e}")))
    }
}

/// `serde_json` backed [`Codec`].
///
/// ```rust
/// use arena_protocol::{BattleCommand, Codec, GameMessage, JsonCodec};
///
/// let msg = GameMessage::new(BattleCommand::INIT, serde_json::json!({"mapName": "Desert"}));
/// let text = JsonCodec.encode_text(&msg).unwrap();
/// assert!(text.contains("\"battleCommand\":\"BATTLE:INIT\""));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    // Skips the UTF-8 re-check: serde_json only emits valid UTF-8.
    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }
}
