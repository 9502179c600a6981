//! Rooms for Doodlewire.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! members, its live connections, its round state machine and at most one
//! pending timer.
//!
//! # Key types
//!
//! - [`RoomStore`]: creates rooms, binds connections, routes events
//! - [`RoomHandle`]: sends events to a running room actor
//! - [`RoundMachine`]: the pure round state machine
//! - [`ConnectionRegistry`]: per-room fan-out with dead-channel pruning
//! - [`RoomConfig`]: rounds per game, round duration, grace delay

mod config;
mod error;
mod registry;
mod room;
mod round;
mod store;
mod words;

pub use config::RoomConfig;
pub use error::RoomError;
pub use registry::{ConnectionRegistry, ConnectionSender};
pub use room::{Relay, RoomHandle, RoomInfo};
pub use round::{ActiveRound, PhaseKind, RoundEffect, RoundMachine, RoundPhase, StartRejected};
pub use store::RoomStore;
pub use words::{WORD_BANK, pick_word};
