//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
///
/// A frame that fails to decode is a *malformed event*: the gateway logs
/// it and keeps the connection open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound message failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not valid JSON, has an unknown `type`, or is missing
    /// a required field.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame decoded but cannot be honored as sent, e.g. an empty
    /// frame or a `roomId` that does not match the connection's room.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
