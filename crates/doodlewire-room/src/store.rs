//! Room store: creates rooms, tracks which connection is bound where, and
//! routes operations to the owning room actor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use doodlewire_protocol::{ConnectionId, RoomId};
use doodlewire_timer::TimerManager;
use rand::Rng;

use crate::room::{RoomDirectory, spawn_room};
use crate::{ConnectionSender, Relay, RoomConfig, RoomError, RoomHandle, RoomInfo};

const ROOM_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ROOM_ID_LEN: usize = 6;

/// Entry point for room operations from the gateway and the HTTP API.
///
/// Cheap to clone; clones share the same rooms. The two maps are only
/// locked for short, synchronous sections and never across an `.await`.
#[derive(Clone)]
pub struct RoomStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    rooms: Arc<RoomDirectory>,
    /// Which room each connection is bound to. A connection is in at
    /// most one room at a time.
    bindings: Mutex<HashMap<ConnectionId, RoomId>>,
    config: RoomConfig,
    timers: TimerManager,
}

impl RoomStore {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                rooms: Arc::new(Mutex::new(HashMap::new())),
                bindings: Mutex::new(HashMap::new()),
                config: config.validated(),
                timers: TimerManager::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    /// Creates a room with `creator` as its first member.
    ///
    /// # Errors
    /// [`RoomError::EmptyPlayerName`] for a blank name; no room is
    /// created in that case.
    pub async fn create_room(&self, creator: &str) -> Result<(RoomId, Vec<String>), RoomError> {
        if creator.trim().is_empty() {
            return Err(RoomError::EmptyPlayerName);
        }

        let handle = {
            let mut rooms = lock(&self.inner.rooms);
            let room_id = loop {
                let candidate = generate_room_id(&mut rand::rng());
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
            };
            let handle = spawn_room(
                room_id.clone(),
                &self.inner.config,
                self.inner.timers.clone(),
                Arc::downgrade(&self.inner.rooms),
            );
            rooms.insert(room_id, handle.clone());
            handle
        };
        tracing::info!(room_id = %handle.room_id(), creator, "room created");

        let players = handle.add_player(creator).await?;
        Ok((handle.room_id().clone(), players))
    }

    /// Adds a member by name, without a connection.
    ///
    /// # Errors
    /// [`RoomError::NotFound`], [`RoomError::DuplicatePlayerName`],
    /// [`RoomError::EmptyPlayerName`].
    pub async fn join_room(&self, room_id: &RoomId, player_name: &str) -> Result<Vec<String>, RoomError> {
        let handle = self.handle(room_id)?;
        handle
            .add_player(player_name)
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    /// The member list of a room.
    pub async fn players(&self, room_id: &RoomId) -> Result<Vec<String>, RoomError> {
        Ok(self.room_info(room_id).await?.players)
    }

    pub async fn room_info(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        let handle = self.handle(room_id)?;
        handle
            .info()
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    /// Snapshots of every room, ordered by id. Rooms that shut down while
    /// being queried are skipped.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let handles: Vec<RoomHandle> = lock(&self.inner.rooms).values().cloned().collect();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        infos
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        lock(&self.inner.rooms).contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        lock(&self.inner.rooms).len()
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Binds a connection to a room under a player name.
    ///
    /// A connection bound to a different room is unbound from it first.
    /// Returns the room's member list after the bind.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room does not exist and
    /// [`RoomError::EmptyPlayerName`] for a blank name. The connection's
    /// current binding is left alone in both cases.
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        room_id: &RoomId,
        player_name: &str,
        sender: ConnectionSender,
    ) -> Result<Vec<String>, RoomError> {
        if player_name.trim().is_empty() {
            return Err(RoomError::EmptyPlayerName);
        }
        let handle = self.handle(room_id)?;

        if let Some(current) = self.room_of(connection_id) {
            if current != *room_id {
                self.unbind(connection_id).await;
            }
        }

        let players = handle
            .bind(connection_id, player_name, sender)
            .await
            .map_err(|e| not_found_if_gone(e, room_id))?;
        lock(&self.inner.bindings).insert(connection_id, room_id.clone());
        Ok(players)
    }

    /// Unbinds a connection from whatever room it is in and waits for the
    /// room to process it. Returns `true` if the room shut down as a result.
    pub async fn unbind(&self, connection_id: ConnectionId) -> bool {
        let Some(room_id) = lock(&self.inner.bindings).remove(&connection_id) else {
            return false;
        };
        let Ok(handle) = self.handle(&room_id) else {
            return false;
        };
        handle.unbind(connection_id).await.unwrap_or(false)
    }

    /// The room a connection is bound to.
    pub fn room_of(&self, connection_id: ConnectionId) -> Option<RoomId> {
        lock(&self.inner.bindings).get(&connection_id).cloned()
    }

    // -----------------------------------------------------------------------
    // Room events
    // -----------------------------------------------------------------------

    pub async fn start_round(&self, room_id: &RoomId) -> Result<(), RoomError> {
        self.handle(room_id)?
            .start_round()
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    pub async fn restart(&self, room_id: &RoomId) -> Result<(), RoomError> {
        self.handle(room_id)?
            .restart()
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    pub async fn relay(
        &self,
        room_id: &RoomId,
        from: ConnectionId,
        relay: Relay,
    ) -> Result<(), RoomError> {
        self.handle(room_id)?
            .relay(from, relay)
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    /// Delivers a recognizer guess to a room.
    pub async fn submit_guess(&self, room_id: &RoomId, guess: String) -> Result<(), RoomError> {
        self.handle(room_id)?
            .submit_guess(guess)
            .await
            .map_err(|e| not_found_if_gone(e, room_id))
    }

    fn handle(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        lock(&self.inner.rooms)
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found_if_gone(error: RoomError, room_id: &RoomId) -> RoomError {
    match error {
        RoomError::Unavailable(_) => RoomError::NotFound(room_id.clone()),
        other => other,
    }
}

/// Six characters from `0-9A-Z`.
fn generate_room_id<R: Rng + ?Sized>(rng: &mut R) -> RoomId {
    let id: String = (0..ROOM_ID_LEN)
        .map(|_| char::from(ROOM_ID_ALPHABET[rng.random_range(0..ROOM_ID_ALPHABET.len())]))
        .collect();
    RoomId(id)
}
