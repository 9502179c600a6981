//! Room actor: an isolated Tokio task that owns one room.
//!
//! Membership, connections, round progress and the room's single timer
//! live inside the task. Everything else talks to it through a
//! [`RoomHandle`], which pushes [`RoomEvent`]s onto a bounded queue.
//! Timer fires come back through the same queue, so they are ordered
//! with socket traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError, Weak};

use doodlewire_protocol::{ConnectionId, RoomId, ServerMessage, unix_millis};
use doodlewire_timer::{TimerHandle, TimerId, TimerManager};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::round::{PhaseKind, RoundEffect, RoundMachine};
use crate::{ConnectionRegistry, ConnectionSender, RoomConfig, RoomError};

/// Rooms by id. The store owns it; actors hold a weak reference so they
/// can remove themselves when they shut down.
pub(crate) type RoomDirectory = Mutex<HashMap<RoomId, RoomHandle>>;

/// Events delivered to a room actor.
pub(crate) enum RoomEvent {
    /// Add a name to the member list without a connection.
    AddPlayer {
        player_name: String,
        reply: oneshot::Sender<Result<Vec<String>, RoomError>>,
    },

    /// Bind a connection under a player name.
    Bind {
        connection_id: ConnectionId,
        player_name: String,
        sender: ConnectionSender,
        reply: oneshot::Sender<Result<Vec<String>, RoomError>>,
    },

    /// Unbind a connection. Replies `true` if the room shut down.
    Unbind {
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },

    StartRound,

    Restart,

    /// Forward a stroke or chat line from one of the room's connections.
    Relay { from: ConnectionId, relay: Relay },

    /// A recognizer guess for the current drawing.
    AiGuess { guess: String },

    /// The timer with this id fired.
    TimerFired { timer_id: TimerId },

    GetInfo { reply: oneshot::Sender<RoomInfo> },
}

/// What a connection asked the room to relay.
#[derive(Debug, Clone)]
pub enum Relay {
    /// Goes to every connection except the sender.
    Draw(Value),
    /// Goes to every connection.
    Chat(Value),
}

/// A snapshot of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub players: Vec<String>,
    pub rounds_played: u32,
    pub max_rounds: u32,
    pub phase: PhaseKind,
    /// The current drawer while a round is active.
    pub drawer: Option<String>,
    pub connections: usize,
    /// The id of the room's pending timer, if one is scheduled.
    #[serde(skip)]
    pub pending_timer: Option<TimerId>,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor.
///
/// Cheap to clone: it is an `mpsc::Sender` wrapper.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Adds a player by name. Returns the member list.
    ///
    /// # Errors
    /// [`RoomError::DuplicatePlayerName`] if the name is taken,
    /// [`RoomError::EmptyPlayerName`] for a blank name.
    pub async fn add_player(&self, player_name: &str) -> Result<Vec<String>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::AddPlayer {
            player_name: player_name.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Binds a connection. Returns the member list after the bind.
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        player_name: &str,
        sender: ConnectionSender,
    ) -> Result<Vec<String>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::Bind {
            connection_id,
            player_name: player_name.to_string(),
            sender,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Unbinds a connection and waits until the room has processed it.
    ///
    /// Returns `true` if that was the room's last connection and the
    /// room has shut down.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::Unbind {
            connection_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Asks the room to start a round (fire-and-forget).
    pub async fn start_round(&self) -> Result<(), RoomError> {
        self.send(RoomEvent::StartRound).await
    }

    /// Asks the room to reset a finished game (fire-and-forget).
    pub async fn restart(&self) -> Result<(), RoomError> {
        self.send(RoomEvent::Restart).await
    }

    /// Relays a stroke or chat line from `from` (fire-and-forget).
    pub async fn relay(&self, from: ConnectionId, relay: Relay) -> Result<(), RoomError> {
        self.send(RoomEvent::Relay { from, relay }).await
    }

    /// Delivers a recognizer guess (fire-and-forget).
    pub async fn submit_guess(&self, guess: String) -> Result<(), RoomError> {
        self.send(RoomEvent::AiGuess { guess }).await
    }

    /// Requests a snapshot of the room.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::GetInfo { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    async fn send(&self, event: RoomEvent) -> Result<(), RoomError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

struct RoomActor {
    room_id: RoomId,
    /// Members in join order.
    players: Vec<String>,
    connections: ConnectionRegistry,
    rounds: RoundMachine,
    timers: TimerManager,
    /// At most one pending timer per room.
    timer: Option<TimerHandle>,
    rng: StdRng,
    /// Set once the last connection is gone.
    closing: bool,
    directory: Weak<RoomDirectory>,
    /// Timer callbacks hold a weak sender so a pending timer never keeps
    /// the room alive.
    events: mpsc::WeakSender<RoomEvent>,
    receiver: mpsc::Receiver<RoomEvent>,
}

impl RoomActor {
    async fn run(mut self) {
        info!(room_id = %self.room_id, "room actor started");

        while let Some(event) = self.receiver.recv().await {
            self.handle(event);
            if self.closing {
                break;
            }
        }

        self.teardown();
        info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Cancels the pending timer and removes the room from the directory.
    /// Runs once; later calls do nothing.
    fn teardown(&mut self) {
        self.cancel_timer();
        let directory = std::mem::take(&mut self.directory);
        if let Some(directory) = directory.upgrade() {
            directory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.room_id);
            info!(room_id = %self.room_id, "room destroyed");
        }
    }

    fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::AddPlayer { player_name, reply } => {
                let _ = reply.send(self.handle_add_player(player_name));
            }
            RoomEvent::Bind {
                connection_id,
                player_name,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_bind(connection_id, player_name, sender));
            }
            RoomEvent::Unbind {
                connection_id,
                reply,
            } => {
                self.handle_unbind(connection_id);
                if self.closing {
                    self.teardown();
                }
                let _ = reply.send(self.closing);
            }
            RoomEvent::StartRound => {
                let result =
                    self.rounds
                        .start_round(&self.players, &mut self.rng, unix_millis());
                match result {
                    Ok(effects) => self.apply(effects),
                    Err(reason) => {
                        debug!(room_id = %self.room_id, %reason, "start_round ignored");
                    }
                }
            }
            RoomEvent::Restart => {
                let effects = self.rounds.restart(unix_millis());
                if effects.is_empty() {
                    debug!(
                        room_id = %self.room_id,
                        phase = %self.rounds.phase(),
                        "restart ignored"
                    );
                }
                self.apply(effects);
            }
            RoomEvent::Relay { from, relay } => self.handle_relay(from, relay),
            RoomEvent::AiGuess { guess } => {
                info!(room_id = %self.room_id, %guess, "ai guess");
                let effects = self.rounds.on_guess(&guess, unix_millis());
                self.apply(effects);
            }
            RoomEvent::TimerFired { timer_id } => {
                if self.timer.as_ref().map(TimerHandle::id) != Some(timer_id) {
                    debug!(room_id = %self.room_id, timer = %timer_id, "stale timer event discarded");
                    return;
                }
                self.timer = None;
                let effects =
                    self.rounds
                        .on_timer_fired(&self.players, &mut self.rng, unix_millis());
                self.apply(effects);
            }
            RoomEvent::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
        }
    }

    fn handle_add_player(&mut self, player_name: String) -> Result<Vec<String>, RoomError> {
        let player_name = normalize_name(player_name)?;
        if self.players.contains(&player_name) {
            return Err(RoomError::DuplicatePlayerName {
                room_id: self.room_id.clone(),
                player_name,
            });
        }
        info!(room_id = %self.room_id, player = %player_name, "player added");
        self.players.push(player_name);
        Ok(self.players.clone())
    }

    fn handle_bind(
        &mut self,
        connection_id: ConnectionId,
        player_name: String,
        sender: ConnectionSender,
    ) -> Result<Vec<String>, RoomError> {
        let player_name = normalize_name(player_name)?;

        let mut outbound = VecDeque::new();
        if let Some(previous) =
            self.connections
                .bind(connection_id, player_name.clone(), sender)
        {
            if previous != player_name {
                outbound.extend(self.departed(previous));
            }
        }
        if !self.players.contains(&player_name) {
            self.players.push(player_name.clone());
        }
        info!(
            room_id = %self.room_id,
            %connection_id,
            player = %player_name,
            connections = self.connections.len(),
            "connection bound"
        );

        outbound.push_back((
            ServerMessage::PlayerJoined {
                player_name,
                players: self.players.clone(),
            },
            None,
        ));
        self.deliver(outbound);
        Ok(self.players.clone())
    }

    fn handle_unbind(&mut self, connection_id: ConnectionId) {
        let Some(player_name) = self.connections.unbind(connection_id) else {
            return;
        };
        info!(
            room_id = %self.room_id,
            %connection_id,
            player = %player_name,
            connections = self.connections.len(),
            "connection unbound"
        );

        if self.connections.is_empty() {
            self.closing = true;
            return;
        }
        if let Some(left) = self.departed(player_name) {
            self.deliver(VecDeque::from([left]));
        }
    }

    fn handle_relay(&mut self, from: ConnectionId, relay: Relay) {
        let Some(player_name) = self.connections.player_of(from).map(str::to_string) else {
            debug!(room_id = %self.room_id, connection_id = %from, "relay from unbound connection dropped");
            return;
        };
        let outbound = match relay {
            Relay::Draw(action) => (
                ServerMessage::DrawAction {
                    player_name,
                    action,
                },
                Some(from),
            ),
            Relay::Chat(message) => (
                ServerMessage::ChatMessage {
                    player_name,
                    message,
                },
                None,
            ),
        };
        self.deliver(VecDeque::from([outbound]));
    }

    /// Removes a player whose last connection went away and returns the
    /// `player_left` event, or `None` if another connection still
    /// carries the name.
    fn departed(&mut self, player_name: String) -> Option<(ServerMessage, Option<ConnectionId>)> {
        if self.connections.has_player(&player_name) {
            return None;
        }
        self.players.retain(|p| *p != player_name);
        info!(room_id = %self.room_id, player = %player_name, "player left");
        Some((
            ServerMessage::PlayerLeft {
                player_name,
                players: self.players.clone(),
            },
            None,
        ))
    }

    fn apply(&mut self, effects: Vec<RoundEffect>) {
        for effect in effects {
            match effect {
                RoundEffect::Broadcast(message) => {
                    if let ServerMessage::RoundStarted { drawer, .. } = &message {
                        info!(room_id = %self.room_id, %drawer, "round started");
                    }
                    if let ServerMessage::RoundEnded {
                        reason,
                        rounds_played,
                        game_over,
                        ..
                    } = &message
                    {
                        info!(room_id = %self.room_id, %reason, rounds_played, game_over, "round ended");
                    }
                    self.deliver(VecDeque::from([(message, None)]));
                }
                RoundEffect::ScheduleExpiry(delay) | RoundEffect::ScheduleNextRound(delay) => {
                    self.schedule(delay);
                }
                RoundEffect::CancelTimer => self.cancel_timer(),
            }
        }
    }

    /// Broadcasts each queued message. Connections found dead on the way
    /// are pruned and their `player_left` events queued behind.
    fn deliver(&mut self, mut queue: VecDeque<(ServerMessage, Option<ConnectionId>)>) {
        while let Some((message, excluding)) = queue.pop_front() {
            let pruned = self.connections.broadcast(&message, excluding);
            if pruned.is_empty() {
                continue;
            }
            if self.connections.is_empty() {
                self.closing = true;
                return;
            }
            for (_, player_name) in pruned {
                queue.extend(self.departed(player_name));
            }
        }
    }

    fn schedule(&mut self, delay: std::time::Duration) {
        self.cancel_timer();
        let events = self.events.clone();
        let handle = self
            .timers
            .schedule(self.room_id.as_str(), delay, move |timer_id| async move {
                if let Some(events) = events.upgrade() {
                    let _ = events.send(RoomEvent::TimerFired { timer_id }).await;
                }
            });
        self.timer = Some(handle);
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            players: self.players.clone(),
            rounds_played: self.rounds.rounds_played(),
            max_rounds: self.rounds.max_rounds(),
            phase: self.rounds.phase().kind(),
            drawer: self.rounds.current_round().map(|round| round.drawer.clone()),
            connections: self.connections.len(),
            pending_timer: self.timer.as_ref().map(TimerHandle::id),
        }
    }
}

fn normalize_name(player_name: String) -> Result<String, RoomError> {
    let trimmed = player_name.trim();
    if trimmed.is_empty() {
        return Err(RoomError::EmptyPlayerName);
    }
    if trimmed.len() == player_name.len() {
        Ok(player_name)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Spawns a room actor and returns a handle to it.
pub(crate) fn spawn_room(
    room_id: RoomId,
    config: &RoomConfig,
    timers: TimerManager,
    directory: Weak<RoomDirectory>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.event_queue_size.max(1));

    let actor = RoomActor {
        room_id: room_id.clone(),
        players: Vec::new(),
        connections: ConnectionRegistry::new(),
        rounds: RoundMachine::new(config),
        timers,
        timer: None,
        rng: StdRng::from_os_rng(),
        closing: false,
        directory,
        events: tx.downgrade(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
