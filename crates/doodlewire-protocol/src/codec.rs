//! Codec trait and the JSON implementation.
//!
//! The gateway never touches `serde_json` directly: it holds something
//! that implements [`Codec`] and asks it to turn frames into
//! [`ClientMessage`](crate::ClientMessage)s and
//! [`ServerMessage`](crate::ServerMessage)s into text.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts between Rust values and text frames.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a received frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or do
    /// not match `T` (unknown `type`, missing required field, ...).
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON via `serde_json`.
///
/// ```rust
/// use doodlewire_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec
///     .decode(br#"{"type":"start_round","roomId":"R1"}"#)
///     .unwrap();
/// assert_eq!(msg.kind(), "start_round");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::InvalidMessage("empty frame".into()));
        }
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
