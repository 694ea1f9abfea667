// Module: http
// HTTP/JSON signaling API plus the SSE presence stream

pub mod error;
pub mod events;
pub mod health;
pub mod identity;
pub mod webrtc;

use axum::{routing::get, Router};
use std::sync::Arc;
use telesignal_core::service::{PresenceBroadcaster, SessionManager, SignalingRelay};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};
pub use identity::{Caller, HeaderIdentityResolver, IdentityResolver};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub relay: SignalingRelay,
    pub presence: Arc<PresenceBroadcaster>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Health check and metrics endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Signaling routes
        .merge(webrtc::create_webrtc_router())
        // Presence push
        .route("/api/webrtc/rooms/{room_id}/events", get(events::room_events));

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use telesignal_core::{
        config::SignalingConfig,
        service::{RoomStore, RoomTimeouts},
        timer::TokioScheduler,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let config = SignalingConfig::default();
        let store = Arc::new(RoomStore::new());
        let presence = Arc::new(PresenceBroadcaster::new(store.clone()));
        let sessions = SessionManager::new(
            store.clone(),
            presence.clone(),
            Arc::new(TokioScheduler),
            RoomTimeouts::from(&config),
        );
        create_router(AppState {
            sessions,
            relay: SignalingRelay::new(store, &config),
            presence,
            identity: Arc::new(HeaderIdentityResolver),
        })
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        participant: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = participant {
            builder = builder.header(identity::PARTICIPANT_HEADER, id);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    const ROOM: &str = "/api/webrtc/rooms/room-42";

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_call_walkthrough() {
        let app = app();

        let (status, body) =
            call(&app, Method::POST, &format!("{ROOM}/join"), Some("A"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "joined");
        assert_eq!(body["participants"], 1);
        assert_eq!(body["shouldInitiateOffer"], true);
        assert!(body["roomInfo"]["createdAt"].is_i64());

        let (_, body) = call(&app, Method::POST, &format!("{ROOM}/join"), Some("B"), None).await;
        assert_eq!(body["participants"], 2);
        assert_eq!(body["shouldInitiateOffer"], false);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/offer"),
            Some("A"),
            Some(json!({"offer": "X"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "offer-sent"}));

        let (_, body) = call(&app, Method::GET, &format!("{ROOM}/offer"), Some("B"), None).await;
        assert_eq!(body["offer"]["sdp"], "X");
        assert_eq!(body["offer"]["from"], "A");
        assert!(body["offer"]["timestamp"].is_i64());

        let (_, body) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/answer"),
            Some("B"),
            Some(json!({"answer": {"type": "answer", "sdp": "Y"}})),
        )
        .await;
        assert_eq!(body, json!({"status": "answer-sent"}));

        let (_, body) = call(&app, Method::GET, &format!("{ROOM}/answer"), Some("A"), None).await;
        assert_eq!(body["answer"]["sdp"]["sdp"], "Y");

        let (_, body) = call(&app, Method::POST, &format!("{ROOM}/leave"), Some("A"), None).await;
        assert_eq!(body["status"], "left");
        assert_eq!(body["participants"], 1);
        assert_eq!(body["roomExpiration"]["hasExpireTimer"], true);

        let (_, body) = call(&app, Method::GET, &format!("{ROOM}/offer"), Some("B"), None).await;
        assert_eq!(body, json!({"offer": null}));
        let (_, body) = call(&app, Method::GET, &format!("{ROOM}/answer"), Some("B"), None).await;
        assert_eq!(body, json!({"answer": null}));
    }

    #[tokio::test]
    async fn test_ice_candidates_exclude_caller() {
        let app = app();
        call(&app, Method::POST, &format!("{ROOM}/join"), Some("A"), None).await;
        call(&app, Method::POST, &format!("{ROOM}/join"), Some("B"), None).await;

        let (_, body) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/ice-candidate"),
            Some("A"),
            Some(json!({"candidate": {"candidate": "candidate:1", "sdpMid": "0"}})),
        )
        .await;
        assert_eq!(body, json!({"status": "ice-candidate-sent"}));

        let (_, body) =
            call(&app, Method::GET, &format!("{ROOM}/ice-candidates"), Some("A"), None).await;
        assert_eq!(body, json!({"candidates": []}));

        let (_, body) =
            call(&app, Method::GET, &format!("{ROOM}/ice-candidates"), Some("B"), None).await;
        assert_eq!(body["candidates"][0]["candidate"]["sdpMid"], "0");
        assert_eq!(body["candidates"][0]["from"], "A");
    }

    #[tokio::test]
    async fn test_signaling_without_room_is_not_found() {
        let app = app();
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/offer"),
            Some("A"),
            Some(json!({"offer": "X"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/ice-candidate"),
            Some("A"),
            Some(json!({"candidate": "c"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, &format!("{ROOM}/status"), Some("A"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let app = app();
        let (status, body) = call(&app, Method::POST, &format!("{ROOM}/join"), None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = app();
        call(&app, Method::POST, &format!("{ROOM}/join"), Some("A"), None).await;
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("{ROOM}/offer"),
            Some("A"),
            Some(json!({"sdp": "missing offer field"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_leave_and_reset_of_unknown_room() {
        let app = app();
        let (status, body) =
            call(&app, Method::POST, &format!("{ROOM}/leave"), Some("A"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["participants"], 0);
        assert_eq!(body["roomExpiration"], Value::Null);

        let (status, body) =
            call(&app, Method::POST, &format!("{ROOM}/reset-connection"), Some("A"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "connection-reset"}));
    }

    #[tokio::test]
    async fn test_status_and_generate_room() {
        let app = app();
        call(&app, Method::POST, &format!("{ROOM}/join"), Some("provider-123456789"), None).await;

        let (status, body) =
            call(&app, Method::GET, &format!("{ROOM}/status"), Some("A"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roomId"], "room-42");
        assert_eq!(body["participantCount"], 1);
        assert_eq!(body["participants"][0]["identifier"], "provider...");

        let (status, body) = call(&app, Method::GET, "/api/webrtc/generate-room", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roomId"].as_str().unwrap().split('-').count(), 3);
    }

    #[tokio::test]
    async fn test_events_stream_starts_with_current_count() {
        let app = app();
        call(&app, Method::POST, &format!("{ROOM}/join"), Some("A"), None).await;

        let request = Request::get(format!("{ROOM}/events?participant=B"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let chunk = frame.into_data().unwrap();
        assert_eq!(
            std::str::from_utf8(&chunk).unwrap(),
            "data: {\"type\":\"participant_count\",\"count\":1}\n\n"
        );
    }
}
