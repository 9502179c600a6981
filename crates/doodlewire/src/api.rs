//! HTTP bookkeeping API.
//!
//! Room creation and lookups happen here over plain JSON; everything that
//! happens during a game goes over the WebSocket gateway. Both surfaces
//! share one [`RoomStore`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use doodlewire_protocol::{RoomId, unix_millis};
use doodlewire_room::{RoomError, RoomInfo, RoomStore};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::recognizer::{Recognizer, spawn_recognition};

/// Shared state for the HTTP handlers.
pub struct ApiState<R> {
    store: RoomStore,
    recognizer: Arc<R>,
}

// Derived Clone would require `R: Clone`.
impl<R> Clone for ApiState<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            recognizer: Arc::clone(&self.recognizer),
        }
    }
}

/// Builds the bookkeeping router.
pub fn router<R: Recognizer>(store: RoomStore, recognizer: Arc<R>) -> Router {
    let state = ApiState { store, recognizer };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        // Rooms
        .route("/api/rooms", get(list_rooms::<R>).post(create_room::<R>))
        .route("/api/rooms/:room_id/join", post(join_room::<R>))
        .route("/api/rooms/:room_id/players", get(list_players::<R>))
        // Recognition
        .route("/api/recognize", post(recognize::<R>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Errors ============

/// A failed API call, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Room(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Room(RoomError::DuplicatePlayerName { .. }) => StatusCode::CONFLICT,
            Self::Room(RoomError::EmptyPlayerName) => StatusCode::BAD_REQUEST,
            Self::Room(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// ============ Request / Response Types ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRequest {
    pub player_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognizeRequest {
    pub room_id: String,
    pub image_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: RoomId,
    pub players: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayersResponse {
    pub players: Vec<String>,
}

// ============ Handlers ============

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": unix_millis(),
    }))
}

async fn create_room<R>(
    State(state): State<ApiState<R>>,
    Json(payload): Json<PlayerRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    let (room_id, players) = state.store.create_room(&payload.player_name).await?;
    Ok(Json(RoomResponse { room_id, players }))
}

async fn list_rooms<R>(State(state): State<ApiState<R>>) -> Json<Vec<RoomInfo>> {
    Json(state.store.list_rooms().await)
}

async fn join_room<R>(
    State(state): State<ApiState<R>>,
    Path(room_id): Path<String>,
    Json(payload): Json<PlayerRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    let room_id = RoomId::from(room_id);
    let players = state.store.join_room(&room_id, &payload.player_name).await?;
    tracing::info!(%room_id, player = %payload.player_name, "player joined over http");
    Ok(Json(RoomResponse { room_id, players }))
}

async fn list_players<R>(
    State(state): State<ApiState<R>>,
    Path(room_id): Path<String>,
) -> Result<Json<PlayersResponse>, ApiError> {
    let players = state.store.players(&RoomId::from(room_id)).await?;
    Ok(Json(PlayersResponse { players }))
}

/// Accepts an image and answers right away; the guess reaches the room
/// later as `ai_guess`.
async fn recognize<R: Recognizer>(
    State(state): State<ApiState<R>>,
    Json(payload): Json<RecognizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.room_id.is_empty() || payload.image_data.is_empty() {
        return Err(ApiError::BadRequest(
            "roomId and imageData are required".to_string(),
        ));
    }
    let room_id = RoomId::from(payload.room_id);
    if !state.store.contains(&room_id) {
        return Err(RoomError::NotFound(room_id).into());
    }

    spawn_recognition(
        Arc::clone(&state.recognizer),
        state.store.clone(),
        room_id,
        payload.image_data,
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true })),
    ))
}
