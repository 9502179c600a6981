//! # Doodlewire
//!
//! Room and round coordinator for a multiplayer drawing-guessing game.
//!
//! Players share a room; one of them draws a secret word while strokes
//! and chat are fanned out to everyone else over WebSocket. A pluggable
//! [`Recognizer`] turns canvas snapshots into guesses, and a guess that
//! contains the word ends the round. Rounds run on server-side timers and
//! the game stops after a fixed number of rounds until someone restarts it.
//!
//! The crate wires the layers together:
//!
//! ```text
//! doodlewire-transport → doodlewire-protocol → handler → doodlewire-room
//!                                                 api ↗
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use doodlewire::prelude::*;
//!
//! # async fn run() -> Result<(), DoodlewireError> {
//! let store = RoomStore::new(RoomConfig::default());
//! let app = router(store.clone(), Arc::new(StaticRecognizer::default()));
//!
//! let server = DoodlewireServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .store(store)
//!     .build()
//!     .await?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! tokio::spawn(async move { axum::serve(listener, app).await });
//! server.run().await
//! # }
//! ```

pub mod api;
mod error;
mod handler;
pub mod recognizer;
mod server;

pub use api::router;
pub use error::DoodlewireError;
pub use recognizer::{FALLBACK_GUESS, RecognitionError, Recognizer, StaticRecognizer};
pub use server::{DoodlewireServer, DoodlewireServerBuilder};

/// Convenience re-exports for embedding the server.
pub mod prelude {
    pub use crate::{
        DoodlewireError, DoodlewireServer, DoodlewireServerBuilder, RecognitionError, Recognizer,
        StaticRecognizer, router,
    };
    pub use doodlewire_protocol::{ClientMessage, EndReason, RoomId, ServerMessage};
    pub use doodlewire_room::{RoomConfig, RoomError, RoomInfo, RoomStore};
}
