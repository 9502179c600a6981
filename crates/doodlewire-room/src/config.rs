//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room created from one store.
///
/// Fixed at room creation: changing the store's config later does not
/// affect rooms that already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Rounds in one game. Reaching it ends the game.
    pub max_rounds: u32,

    /// How long a round runs before it ends with `time_out`.
    pub round_duration: Duration,

    /// Pause between a round ending and the next one starting.
    pub grace_delay: Duration,

    /// Capacity of each room's event queue. Senders wait when it is full.
    pub event_queue_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            round_duration: Duration::from_secs(60),
            grace_delay: Duration::from_secs(5),
            event_queue_size: 64,
        }
    }
}

impl RoomConfig {
    /// Clamps values that would make a room unusable.
    ///
    /// A game needs at least one round and a queue needs at least one
    /// slot (`mpsc::channel(0)` panics).
    pub fn validated(mut self) -> Self {
        if self.max_rounds == 0 {
            tracing::warn!("max_rounds must be at least 1, using 1");
            self.max_rounds = 1;
        }
        if self.event_queue_size == 0 {
            tracing::warn!("event_queue_size must be at least 1, using 1");
            self.event_queue_size = 1;
        }
        self
    }
}
