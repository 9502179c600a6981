//! Live connections of one room.

use std::collections::BTreeMap;

use doodlewire_protocol::{ConnectionId, ServerMessage};
use tokio::sync::mpsc;

use crate::RoomError;

/// Channel the room uses to push events to one connection's writer.
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Binding {
    player_name: String,
    sender: ConnectionSender,
}

/// Connections bound to a room, each carrying a player name.
///
/// Several connections may carry the same name (one player with two
/// tabs). Fan-out order is connection-id order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    bindings: BTreeMap<ConnectionId, Binding>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection. Rebinding an already-bound connection replaces
    /// its name and sender and returns the name it carried before.
    pub fn bind(
        &mut self,
        connection_id: ConnectionId,
        player_name: String,
        sender: ConnectionSender,
    ) -> Option<String> {
        self.bindings
            .insert(
                connection_id,
                Binding {
                    player_name,
                    sender,
                },
            )
            .map(|previous| previous.player_name)
    }

    /// Removes a connection and returns the name it carried.
    pub fn unbind(&mut self, connection_id: ConnectionId) -> Option<String> {
        self.bindings
            .remove(&connection_id)
            .map(|binding| binding.player_name)
    }

    /// Sends a copy of `message` to every connection except `excluding`.
    ///
    /// Connections whose channel is closed are removed on the way and
    /// returned with the name they carried.
    pub fn broadcast(
        &mut self,
        message: &ServerMessage,
        excluding: Option<ConnectionId>,
    ) -> Vec<(ConnectionId, String)> {
        let mut dead = Vec::new();
        for (id, binding) in &self.bindings {
            if Some(*id) == excluding {
                continue;
            }
            if binding.sender.send(message.clone()).is_err() {
                tracing::debug!(
                    error = %RoomError::ChannelUnavailable(*id),
                    kind = message.kind(),
                    "dropping dead connection"
                );
                dead.push(*id);
            }
        }

        dead.into_iter()
            .filter_map(|id| self.unbind(id).map(|name| (id, name)))
            .collect()
    }

    /// `true` if any connection still carries `player_name`.
    pub fn has_player(&self, player_name: &str) -> bool {
        self.bindings
            .values()
            .any(|binding| binding.player_name == player_name)
    }

    /// The name a connection carries, if it is bound here.
    pub fn player_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.bindings
            .get(&connection_id)
            .map(|binding| binding.player_name.as_str())
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.bindings.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
