//! WebRTC signaling HTTP endpoints
//!
//! Every route lives under `/api/webrtc/rooms/{room_id}` and identifies the
//! caller through [`Caller`]:
//! - `join` / `leave` drive room membership
//! - `offer` / `answer` / `ice-candidate(s)` relay negotiation material
//! - `reset-connection` discards pending negotiation
//! - `status` returns a diagnostic snapshot
//!
//! The presence stream (`events`) is served from [`super::events`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::identity::Caller;
use super::{AppError, AppResult, AppState};
use telesignal_core::models::{IceCandidateEntry, RoomExpiration, RoomId, RoomInfo, SignalEntry};

pub fn create_webrtc_router() -> Router<AppState> {
    Router::new()
        .route("/api/webrtc/generate-room", get(generate_room))
        .route("/api/webrtc/rooms/{room_id}/join", post(join_room))
        .route("/api/webrtc/rooms/{room_id}/leave", post(leave_room))
        .route(
            "/api/webrtc/rooms/{room_id}/reset-connection",
            post(reset_connection),
        )
        .route(
            "/api/webrtc/rooms/{room_id}/offer",
            post(send_offer).get(get_offer),
        )
        .route(
            "/api/webrtc/rooms/{room_id}/answer",
            post(send_answer).get(get_answer),
        )
        .route(
            "/api/webrtc/rooms/{room_id}/ice-candidate",
            post(send_ice_candidate),
        )
        .route(
            "/api/webrtc/rooms/{room_id}/ice-candidates",
            get(get_ice_candidates),
        )
        .route("/api/webrtc/rooms/{room_id}/status", get(room_status))
}

/// `{status: "..."}` acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRoomResponse {
    pub room_id: RoomId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub status: String,
    pub participants: usize,
    pub is_rejoin: bool,
    pub room_info: RoomInfo,
    pub should_initiate_offer: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub status: String,
    pub participants: usize,
    pub room_expiration: Option<RoomExpiration>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OfferRequest {
    pub offer: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OfferResponse {
    pub offer: Option<SignalEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub answer: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: Option<SignalEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub candidate: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IceCandidatesResponse {
    pub candidates: Vec<IceCandidateEntry>,
}

/// Suggest a fresh human-readable room id
///
/// Path: `GET /api/webrtc/generate-room`
pub async fn generate_room() -> impl IntoResponse {
    Json(GenerateRoomResponse {
        room_id: RoomId::generate(),
    })
}

/// Join (or rejoin) a room, creating it on first use
///
/// Path: `POST /api/webrtc/rooms/{room_id}/join`
pub async fn join_room(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    let outcome = state.sessions.handle_join(&room_id, &participant);

    Ok(Json(JoinResponse {
        status: "joined".to_string(),
        participants: outcome.participant_count,
        is_rejoin: outcome.is_rejoin,
        room_info: outcome.room_info,
        should_initiate_offer: outcome.should_initiate_offer,
    }))
}

/// Path: `POST /api/webrtc/rooms/{room_id}/leave`
pub async fn leave_room(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    let outcome = state.sessions.handle_leave(&room_id, &participant);

    Ok(Json(LeaveResponse {
        status: "left".to_string(),
        participants: outcome.participant_count,
        room_expiration: outcome.room_expiration,
    }))
}

/// Drop pending offer, answer and candidates so the pair can renegotiate.
/// A room that does not exist is treated as already reset.
///
/// Path: `POST /api/webrtc/rooms/{room_id}/reset-connection`
pub async fn reset_connection(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    info!(room_id = %room_id, participant_id = %participant, "Connection reset requested");
    state.relay.reset_connection(&room_id);
    Ok(StatusResponse::new("connection-reset"))
}

/// Path: `POST /api/webrtc/rooms/{room_id}/offer`
pub async fn send_offer(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    payload: Result<Json<OfferRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;
    let room_id = RoomId::from_string(room_id);
    state.relay.set_offer(&room_id, body.offer, &participant)?;
    Ok(StatusResponse::new("offer-sent"))
}

/// Path: `GET /api/webrtc/rooms/{room_id}/offer`
pub async fn get_offer(
    Caller(_participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    Ok(Json(OfferResponse {
        offer: state.relay.get_offer(&room_id),
    }))
}

/// Path: `POST /api/webrtc/rooms/{room_id}/answer`
pub async fn send_answer(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;
    let room_id = RoomId::from_string(room_id);
    state.relay.set_answer(&room_id, body.answer, &participant)?;
    Ok(StatusResponse::new("answer-sent"))
}

/// Path: `GET /api/webrtc/rooms/{room_id}/answer`
pub async fn get_answer(
    Caller(_participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    Ok(Json(AnswerResponse {
        answer: state.relay.get_answer(&room_id),
    }))
}

/// Path: `POST /api/webrtc/rooms/{room_id}/ice-candidate`
pub async fn send_ice_candidate(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    payload: Result<Json<IceCandidateRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = payload?;
    let room_id = RoomId::from_string(room_id);
    state
        .relay
        .add_ice_candidate(&room_id, body.candidate, &participant)?;
    Ok(StatusResponse::new("ice-candidate-sent"))
}

/// Candidates from the other side of the call; the caller's own are excluded
///
/// Path: `GET /api/webrtc/rooms/{room_id}/ice-candidates`
pub async fn get_ice_candidates(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    Ok(Json(IceCandidatesResponse {
        candidates: state.relay.get_ice_candidates(&room_id, &participant),
    }))
}

/// Path: `GET /api/webrtc/rooms/{room_id}/status`
pub async fn room_status(
    Caller(_participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    let status = state
        .sessions
        .room_status(&room_id)
        .ok_or_else(|| AppError::not_found(format!("Room {room_id} not found")))?;
    Ok(Json(status))
}
