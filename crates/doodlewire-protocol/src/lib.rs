//! Wire protocol for Doodlewire.
//!
//! - **Types** ([`ClientMessage`], [`ServerMessage`], [`RoomId`],
//!   [`EndReason`]): what travels over a room's real-time channel.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   become text frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong doing so.
//!
//! ```text
//! Transport (frames) → Protocol (messages) → Room (state, fan-out)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientMessage, EndReason, RoomId, ServerMessage, unix_millis,
};

/// Connection identity, re-exported so upper layers need not depend on
/// the transport crate to name a channel.
pub use doodlewire_transport::ConnectionId;
