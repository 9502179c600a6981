//! Unified error type for Doodlewire.

use doodlewire_protocol::ProtocolError;
use doodlewire_room::RoomError;
use doodlewire_transport::TransportError;

use crate::RecognitionError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DoodlewireError {
    /// A transport-level error (accept, handshake, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, duplicate name, ...).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The recognizer failed.
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// Binding or serving the HTTP listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
