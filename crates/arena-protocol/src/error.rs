/// Why an inbound frame or outbound body could not be processed.
///
/// All of these are scoped to a single frame. The connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("cannot serialize body: {0}")]
    Encode(serde_json::Error),

    /// Body is not JSON, or lacks a field the target type requires.
    #[error("cannot parse body: {0}")]
    Decode(serde_json::Error),

    /// Binary frame of length zero, so no type tag to route on.
    #[error("binary frame has no type tag")]
    EmptyFrame,

    #[error("no frame type registered for tag {0}")]
    UnknownTag(u8),

    /// A war machine tick frame is shorter than its header announced.
    #[error("{kind} frame cut short: reading {needed} bytes at {offset} of {len}")]
    Truncated {
        kind: &'static str,
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// Parses, but cannot be dispatched (for example a blank
    /// `battleCommand`). Answered with a failure reply.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
