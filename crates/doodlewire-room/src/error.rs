//! Error types for the room layer.

use doodlewire_protocol::{ConnectionId, RoomId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (never created, or already destroyed).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Another player in the room already uses this name.
    #[error("player name {player_name:?} is already taken in room {room_id}")]
    DuplicatePlayerName {
        room_id: RoomId,
        player_name: String,
    },

    /// Player names must contain something other than whitespace.
    #[error("player name must not be empty")]
    EmptyPlayerName,

    /// A connection's outbound channel is closed.
    #[error("channel of {0} is closed")]
    ChannelUnavailable(ConnectionId),

    /// The room's event queue is closed. The room is shutting down.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    /// `true` for errors that mean "there is no such room (any more)".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unavailable(_))
    }
}
