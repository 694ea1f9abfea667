//! Presence push over Server-Sent Events
//!
//! `GET /api/webrtc/rooms/{room_id}/events` streams
//! `data: {"type":"participant_count","count":N}` frames: one immediately,
//! then one after every join or leave in the room. The stream ends when the
//! room is cleaned up; a client disconnect unsubscribes.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use super::identity::Caller;
use super::{AppError, AppResult, AppState};
use telesignal_core::models::RoomId;

pub async fn room_events(
    Caller(participant): Caller,
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, telesignal_core::Error>>>> {
    let room_id = RoomId::from_string(room_id);
    let (subscription, events) = state
        .presence
        .subscribe_channel(&room_id)
        .map_err(|_| AppError::internal_server_error("Failed to open presence stream"))?;

    info!(
        room_id = %room_id,
        participant_id = %participant,
        subscription_id = subscription.id(),
        "Presence stream opened"
    );

    let stream = UnboundedReceiverStream::new(events).map(move |event| {
        // Unsubscribes when the response body is dropped
        let _subscription = &subscription;
        event.to_json().map(|json| Event::default().data(json))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
