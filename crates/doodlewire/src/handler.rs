//! Per-connection gateway: binding, message routing and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler,
//! plus a writer task that drains the connection's outbound channel. The
//! flow is:
//!   1. Bind from `?roomId=..&playerName=..` if both are present
//!   2. Loop: receive frames → decode → bind / relay / forward to the room
//!   3. On close or error: unbind and wait for the room

use std::sync::Arc;

use doodlewire_protocol::{ClientMessage, Codec, ConnectionId, RoomId, ServerMessage};
use doodlewire_room::Relay;
use doodlewire_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::DoodlewireError;
use crate::server::ServerState;

/// Drop guard that unbinds the connection if the handler exits without
/// doing it itself (e.g. it panicked).
///
/// `Drop` is synchronous, so the fallback spawns a fire-and-forget task.
struct ConnectionGuard<C: Codec> {
    connection_id: ConnectionId,
    state: Arc<ServerState<C>>,
    armed: bool,
}

impl<C: Codec> ConnectionGuard<C> {
    fn new(connection_id: ConnectionId, state: Arc<ServerState<C>>) -> Self {
        Self {
            connection_id,
            state,
            armed: true,
        }
    }

    /// Unbinds and waits until the room has processed it.
    async fn release(mut self) {
        self.armed = false;
        self.state.store.unbind(self.connection_id).await;
    }
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let connection_id = self.connection_id;
        let store = self.state.store.clone();
        tokio::spawn(async move {
            store.unbind(connection_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), DoodlewireError> {
    let conn = Arc::new(conn);
    let connection_id = conn.id();
    tracing::info!(%connection_id, peer = ?conn.info().peer, "connection accepted");

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), Arc::clone(&state), rx));
    let guard = ConnectionGuard::new(connection_id, Arc::clone(&state));

    let mut bound: Option<RoomId> = None;
    let info = conn.info();
    if let (Some(room_id), Some(player_name)) =
        (info.query_param("roomId"), info.query_param("playerName"))
    {
        join(&state, connection_id, &mut bound, RoomId::from(room_id), player_name, &tx).await;
    }

    let result = receive_loop(&conn, &state, connection_id, &mut bound, &tx).await;

    // Unbind first so the room stops fanning out to us, then let the
    // writer flush what is already queued.
    guard.release().await;
    drop(tx);
    let _ = writer.await;

    if result.is_ok() {
        tracing::info!(%connection_id, "connection closed");
    }
    result
}

async fn receive_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    connection_id: ConnectionId,
    bound: &mut Option<RoomId>,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<(), DoodlewireError> {
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "malformed message dropped");
                continue;
            }
        };
        tracing::trace!(%connection_id, kind = msg.kind(), "message received");

        dispatch(state, connection_id, bound, tx, msg).await;
    }
}

/// Routes one decoded message.
async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    connection_id: ConnectionId,
    bound: &mut Option<RoomId>,
    tx: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::JoinRoom {
            room_id,
            player_name,
        } => join(state, connection_id, bound, room_id, &player_name, tx).await,
        ClientMessage::LeaveRoom => {
            if bound.take().is_some() {
                state.store.unbind(connection_id).await;
                tracing::info!(%connection_id, "left room");
            }
        }
        msg => forward(state, connection_id, bound, msg).await,
    }
}

/// Forwards a room-scoped message to the connection's room.
async fn forward<C: Codec>(
    state: &ServerState<C>,
    connection_id: ConnectionId,
    bound: &mut Option<RoomId>,
    msg: ClientMessage,
) {
    let Some(room_id) = target_room(bound.as_ref(), msg.room_id()) else {
        tracing::debug!(%connection_id, kind = msg.kind(), "message outside the bound room dropped");
        return;
    };

    let store = &state.store;
    let result = match msg {
        ClientMessage::StartRound { .. } => store.start_round(&room_id).await,
        ClientMessage::RestartGame { .. } => store.restart(&room_id).await,
        ClientMessage::DrawAction { payload, .. } => {
            store.relay(&room_id, connection_id, Relay::Draw(payload)).await
        }
        ClientMessage::ChatMessage { payload, .. } => {
            store.relay(&room_id, connection_id, Relay::Chat(payload)).await
        }
        ClientMessage::JoinRoom { .. } | ClientMessage::LeaveRoom => Ok(()),
    };
    if let Err(e) = result {
        tracing::debug!(%connection_id, %room_id, error = %e, "event dropped");
        if e.is_not_found() {
            *bound = None;
        }
    }
}

/// The room a room-scoped message applies to: the connection's room, as
/// long as the message does not name a different one.
fn target_room(bound: Option<&RoomId>, named: Option<&RoomId>) -> Option<RoomId> {
    let bound = bound?;
    match named {
        Some(named) if named != bound => None,
        _ => Some(bound.clone()),
    }
}

/// Binds the connection to `room_id`. On failure `bound` is re-read from
/// the store, since the connection may already have left its old room.
async fn join<C: Codec>(
    state: &ServerState<C>,
    connection_id: ConnectionId,
    bound: &mut Option<RoomId>,
    room_id: RoomId,
    player_name: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    match state
        .store
        .bind(connection_id, &room_id, player_name, tx.clone())
        .await
    {
        Ok(players) => {
            tracing::info!(
                %connection_id,
                %room_id,
                player = %player_name,
                players = players.len(),
                "connection joined room"
            );
            *bound = Some(room_id);
        }
        Err(e) => {
            tracing::debug!(%connection_id, %room_id, error = %e, "join dropped");
            *bound = state.store.room_of(connection_id);
        }
    }
}

/// Encodes room events and writes them to the socket until every sender
/// is gone or the socket fails.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) {
    let connection_id = conn.id();
    while let Some(msg) = rx.recv().await {
        let text = match state.codec.encode(&msg) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&text).await {
            tracing::debug!(%connection_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
