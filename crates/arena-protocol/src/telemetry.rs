//! Decoding of the high-rate war machine tick.
//!
//! Ticks skip JSON entirely. After the type tag the body is:
//!
//! ```text
//! count: u8
//! repeat count times:
//!     participant_id: u8
//!     sync: u8
//!     [x: i32, y: i32, rotation: i32]   when sync >= 100
//!     [health: i32]                     when sync % 10 == 1
//!     [shield: i32]                     when (sync / 10) % 10 == 1
//! ```
//!
//! All integers are big-endian.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// One war machine's state change from a tick frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMachineTick {
    #[serde(rename = "participantID")]
    pub participant_id: u8,
    /// Ground-plane position. Ticks never carry a height.
    pub position: Option<(i32, i32)>,
    pub rotation: Option<i32>,
    pub health: Option<i32>,
    pub shield: Option<i32>,
}

/// Decodes a tick body (the frame without its type tag).
pub fn decode_war_machine_ticks(body: &[u8]) -> Result<Vec<WarMachineTick>, ProtocolError> {
    let mut cursor = Cursor { data: body, offset: 0 };
    let count = cursor.u8()?;

    let mut ticks = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let participant_id = cursor.u8()?;
        let sync = cursor.u8()?;
        let mut tick = WarMachineTick {
            participant_id,
            ..WarMachineTick::default()
        };

        if sync >= 100 {
            let x = cursor.i32()?;
            let y = cursor.i32()?;
            tick.position = Some((x, y));
            tick.rotation = Some(cursor.i32()?);
        }
        if sync % 10 == 1 {
            tick.health = Some(cursor.i32()?);
        }
        if (sync / 10) % 10 == 1 {
            tick.shield = Some(cursor.i32()?);
        }
        ticks.push(tick);
    }
    Ok(ticks)
}

/// Encodes ticks into a tick body. Used by tests and tooling that stand in
/// for the game client.
pub fn encode_war_machine_ticks(ticks: &[WarMachineTick]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + ticks.len() * 22);
    out.push(u8::try_from(ticks.len()).unwrap_or(u8::MAX));
    for tick in ticks.iter().take(usize::from(u8::MAX)) {
        let mut sync = 0u8;
        if tick.position.is_some() || tick.rotation.is_some() {
            sync += 100;
        }
        if tick.shield.is_some() {
            sync += 10;
        }
        if tick.health.is_some() {
            sync += 1;
        }
        out.push(tick.participant_id);
        out.push(sync);
        if sync >= 100 {
            let (x, y) = tick.position.unwrap_or_default();
            out.extend_from_slice(&x.to_be_bytes());
            out.extend_from_slice(&y.to_be_bytes());
            out.extend_from_slice(&tick.rotation.unwrap_or_default().to_be_bytes());
        }
        if let Some(health) = tick.health {
            out.extend_from_slice(&health.to_be_bytes());
        }
        if let Some(shield) = tick.shield {
            out.extend_from_slice(&shield.to_be_bytes());
        }
    }
    out
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.offset + N;
        let bytes = self
            .data
            .get(self.offset..end)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
            .ok_or(ProtocolError::Truncated {
                kind: "war machine tick",
                offset: self.offset,
                needed: N,
                len: self.data.len(),
            })?;
        self.offset = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.take::<4>()?))
    }
}
