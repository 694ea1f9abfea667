//! Caller identity
//!
//! Authentication happens upstream. Handlers only need an opaque participant
//! identifier, produced by an [`IdentityResolver`] and extracted through
//! [`Caller`].

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;
use telesignal_core::{models::ParticipantId, Error, Result};

use super::{AppError, AppState};

/// Header set by the upstream gateway for authenticated callers
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// Maps an incoming request to the participant making it
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, parts: &Parts) -> Result<ParticipantId>;
}

#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    #[serde(default)]
    guest: bool,
    guest_id: Option<String>,
    participant: Option<String>,
}

/// Trusts identifiers forwarded by an authenticating gateway.
///
/// Regular callers are read from the `x-participant-id` header, falling back
/// to the `participant` query parameter for `EventSource` clients that cannot
/// set headers. Guests (`?guest=true`) must supply `guest_id` and are
/// namespaced as `guest:<id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentityResolver;

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, parts: &Parts) -> Result<ParticipantId> {
        let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .map_err(|e| Error::InvalidInput(format!("Invalid query string: {e}")))?;

        if query.guest {
            let guest_id = non_empty(query.guest_id)
                .ok_or_else(|| Error::Unauthorized("Guest access requires guest_id".into()))?;
            return Ok(ParticipantId::from(format!("guest:{guest_id}")));
        }

        let from_header = parts
            .headers
            .get(PARTICIPANT_HEADER)
            .map(|value| {
                value
                    .to_str()
                    .map(str::to_string)
                    .map_err(|e| Error::InvalidInput(format!("Invalid participant header: {e}")))
            })
            .transpose()?;

        non_empty(from_header)
            .or_else(|| non_empty(query.participant))
            .map(ParticipantId::from)
            .ok_or_else(|| Error::Unauthorized("Missing participant identity".into()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The participant making the request
#[derive(Debug, Clone)]
pub struct Caller(pub ParticipantId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let participant = app_state.identity.resolve(parts).await?;
        Ok(Self(participant))
    }
}
