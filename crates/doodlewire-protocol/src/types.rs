//! Message types for Doodlewire's real-time channel.
//!
//! Every frame is a JSON object with a `type` discriminator in
//! snake_case and camelCase fields, e.g.
//!
//! ```json
//! {"type":"draw_action","roomId":"AB12CD","payload":{"x":1,"y":2}}
//! ```
//!
//! Payloads of strokes and chat lines are opaque to the server: they are
//! carried as [`serde_json::Value`] and relayed verbatim.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique, server-generated room identifier.
///
/// Opaque to clients. Serialized as a bare string thanks to
/// `#[serde(transparent)]`, so `RoomId("AB12CD")` is just `"AB12CD"`
/// on the wire.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages a client sends over its real-time channel.
///
/// Room-scoped variants carry an optional `roomId`. The gateway always
/// acts on the room the connection is bound to; a `roomId` that names a
/// different room makes the message invalid for this connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a room under a display name.
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId, player_name: String },

    /// Ask the room to start a round (ignored unless the room is idle).
    #[serde(rename_all = "camelCase")]
    StartRound { room_id: Option<RoomId> },

    /// A stroke, relayed to every other connection in the room.
    #[serde(rename_all = "camelCase")]
    DrawAction {
        room_id: Option<RoomId>,
        payload: Value,
    },

    /// A chat line, relayed to every connection in the room.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room_id: Option<RoomId>,
        payload: Value,
    },

    /// Reset a finished game back to idle.
    #[serde(rename_all = "camelCase")]
    RestartGame { room_id: Option<RoomId> },

    /// Unbind without closing the socket.
    LeaveRoom,
}

impl ClientMessage {
    /// The room this message names, if any.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::JoinRoom { room_id, .. } => Some(room_id),
            Self::StartRound { room_id }
            | Self::DrawAction { room_id, .. }
            | Self::ChatMessage { room_id, .. }
            | Self::RestartGame { room_id } => room_id.as_ref(),
            Self::LeaveRoom => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::StartRound { .. } => "start_round",
            Self::DrawAction { .. } => "draw_action",
            Self::ChatMessage { .. } => "chat_message",
            Self::RestartGame { .. } => "restart_game",
            Self::LeaveRoom => "leave_room",
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The round timer expired with no matching guess.
    TimeOut,
    /// A recognizer guess contained the target word.
    Matched,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeOut => f.write_str("time_out"),
            Self::Matched => f.write_str("matched"),
        }
    }
}

/// Events the server fans out to the connections of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Someone bound a connection to the room. `players` is the full list.
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player_name: String,
        players: Vec<String>,
    },

    /// A player's last connection went away. `players` is the full list.
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_name: String,
        players: Vec<String>,
    },

    /// A round began. The word is sent to everyone; guessing is done by
    /// the recognizer, not by the other players.
    RoundStarted {
        drawer: String,
        word: String,
        timestamp: u64,
    },

    /// A round ended.
    #[serde(rename_all = "camelCase")]
    RoundEnded {
        reason: EndReason,
        rounds_played: u32,
        max_rounds: u32,
        game_over: bool,
        timestamp: u64,
    },

    /// A relayed stroke.
    #[serde(rename_all = "camelCase")]
    DrawAction { player_name: String, action: Value },

    /// A relayed chat line.
    #[serde(rename_all = "camelCase")]
    ChatMessage { player_name: String, message: Value },

    /// The recognizer's guess for the current drawing.
    AiGuess { guess: String, timestamp: u64 },

    /// A finished game was reset and the room is idle again.
    #[serde(rename_all = "camelCase")]
    GameReset {
        rounds_played: u32,
        max_rounds: u32,
        timestamp: u64,
    },
}

impl ServerMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundEnded { .. } => "round_ended",
            Self::DrawAction { .. } => "draw_action",
            Self::ChatMessage { .. } => "chat_message",
            Self::AiGuess { .. } => "ai_guess",
            Self::GameReset { .. } => "game_reset",
        }
    }
}

/// Milliseconds since the Unix epoch, used for every `timestamp` field.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
