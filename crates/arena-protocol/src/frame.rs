//! Binary framing.
//!
//! Every binary frame from the game client starts with a one-byte
//! [`NetMessageType`] tag. Tag 0 carries a JSON [`Request`]; the others
//! carry fixed-layout telemetry that is parsed by hand for throughput.
//! Text frames hold a bare JSON request with no tag.

use std::fmt;

use crate::telemetry::{decode_war_machine_ticks, WarMachineTick};
use crate::{Codec, ProtocolError, Request};

/// The frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NetMessageType {
    Json = 0,
    WarMachineTick = 1,
    LiveVotingTick = 2,
    AbilityRightRatioTick = 3,
    VotePriceTick = 4,
    VotePriceForecastTick = 5,
    AbilityTargetPriceTick = 6,
    ViewerLiveCountTick = 7,
    SpoilOfWarTick = 8,
}

impl NetMessageType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for NetMessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => Self::Json,
            1 => Self::WarMachineTick,
            2 => Self::LiveVotingTick,
            3 => Self::AbilityRightRatioTick,
            4 => Self::VotePriceTick,
            5 => Self::VotePriceForecastTick,
            6 => Self::AbilityTargetPriceTick,
            7 => Self::ViewerLiveCountTick,
            8 => Self::SpoilOfWarTick,
            other => return Err(ProtocolError::UnknownTag(other)),
        })
    }
}

impl fmt::Display for NetMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::WarMachineTick => "war_machine_tick",
            Self::LiveVotingTick => "live_voting_tick",
            Self::AbilityRightRatioTick => "ability_right_ratio_tick",
            Self::VotePriceTick => "vote_price_tick",
            Self::VotePriceForecastTick => "vote_price_forecast_tick",
            Self::AbilityTargetPriceTick => "ability_target_price_tick",
            Self::ViewerLiveCountTick => "viewer_live_count_tick",
            Self::SpoilOfWarTick => "spoil_of_war_tick",
        };
        f.write_str(name)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A JSON command for the dispatcher.
    Command(Request),
    /// Telemetry for the live battle.
    WarMachineTicks(Vec<WarMachineTick>),
    /// A recognised tag this server does not consume.
    Reserved(NetMessageType),
}

/// Decodes a tagged binary frame.
///
/// # Errors
/// [`ProtocolError::EmptyFrame`] for a zero-length frame,
/// [`ProtocolError::UnknownTag`] for a tag outside the table, and decode or
/// truncation errors from the body.
pub fn decode_binary<C: Codec>(codec: &C, data: &[u8]) -> Result<Frame, ProtocolError> {
    let (&tag, body) = data.split_first().ok_or(ProtocolError::EmptyFrame)?;
    match NetMessageType::try_from(tag)? {
        NetMessageType::Json => decode_request(codec, body).map(Frame::Command),
        NetMessageType::WarMachineTick => {
            decode_war_machine_ticks(body).map(Frame::WarMachineTicks)
        }
        reserved => Ok(Frame::Reserved(reserved)),
    }
}

/// Decodes an untagged text frame.
pub fn decode_text<C: Codec>(codec: &C, text: &str) -> Result<Frame, ProtocolError> {
    decode_request(codec, text.as_bytes()).map(Frame::Command)
}

/// Prefixes an encoded request with the JSON tag.
pub fn encode_json_frame<C: Codec>(codec: &C, request: &Request) -> Result<Vec<u8>, ProtocolError> {
    let body = codec.encode(request)?;
    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.push(NetMessageType::Json.tag());
    frame.extend_from_slice(&body);
    Ok(frame)
}

fn decode_request<C: Codec>(codec: &C, body: &[u8]) -> Result<Request, ProtocolError> {
    let request: Request = codec.decode(body)?;
    request.validate()?;
    Ok(request)
}
