//! Offer/answer/ICE relay
//!
//! Signaling writes require the room to exist; they never create it. Reads
//! return whatever is pending. Staleness thresholds only produce warnings,
//! entries are never dropped for age.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::RoomStore;
use crate::config::SignalingConfig;
use crate::metrics;
use crate::models::{DescriptionKind, IceCandidateEntry, ParticipantId, RoomId, SignalEntry};
use crate::{Error, Result};

#[derive(Clone)]
pub struct SignalingRelay {
    store: Arc<RoomStore>,
    stale_signal_after: Duration,
    stale_candidate_after: Duration,
}

impl SignalingRelay {
    pub fn new(store: Arc<RoomStore>, config: &SignalingConfig) -> Self {
        Self {
            store,
            stale_signal_after: config.stale_signal_warn(),
            stale_candidate_after: config.stale_candidate_warn(),
        }
    }

    pub fn set_offer(
        &self,
        room_id: &RoomId,
        offer: serde_json::Value,
        from: &ParticipantId,
    ) -> Result<()> {
        self.set_description(room_id, DescriptionKind::Offer, offer, from)
    }

    pub fn get_offer(&self, room_id: &RoomId) -> Option<SignalEntry> {
        self.get_description(room_id, DescriptionKind::Offer)
    }

    pub fn set_answer(
        &self,
        room_id: &RoomId,
        answer: serde_json::Value,
        from: &ParticipantId,
    ) -> Result<()> {
        self.set_description(room_id, DescriptionKind::Answer, answer, from)
    }

    pub fn get_answer(&self, room_id: &RoomId) -> Option<SignalEntry> {
        self.get_description(room_id, DescriptionKind::Answer)
    }

    fn set_description(
        &self,
        room_id: &RoomId,
        kind: DescriptionKind,
        sdp: serde_json::Value,
        from: &ParticipantId,
    ) -> Result<()> {
        self.store
            .with_room(room_id, |room| {
                let now = Utc::now();
                if let Some(existing) = room.description(kind) {
                    info!(
                        room_id = %room_id,
                        kind = kind.as_str(),
                        previous_from = %existing.from,
                        new_from = %from,
                        previous_age_ms = existing.age(now).as_millis() as u64,
                        "Overwriting pending description"
                    );
                }

                *room.description_slot(kind) = Some(SignalEntry {
                    sdp,
                    from: from.clone(),
                    timestamp: now,
                });

                if let Some(participant) = room.participants.get_mut(from) {
                    participant.record_description(kind, now);
                }
            })
            .ok_or_else(|| Error::room_not_found(room_id))?;

        metrics::SIGNALING_MESSAGES_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();
        debug!(room_id = %room_id, kind = kind.as_str(), from = %from, "Description stored");
        Ok(())
    }

    fn get_description(&self, room_id: &RoomId, kind: DescriptionKind) -> Option<SignalEntry> {
        let entry = self
            .store
            .with_room(room_id, |room| room.description(kind).cloned())
            .flatten()?;

        let age = entry.age(Utc::now());
        if age > self.stale_signal_after {
            warn!(
                room_id = %room_id,
                kind = kind.as_str(),
                age_secs = age.as_secs(),
                "Returning stale description"
            );
        }
        Some(entry)
    }

    /// Append a candidate; duplicates are kept
    pub fn add_ice_candidate(
        &self,
        room_id: &RoomId,
        candidate: serde_json::Value,
        from: &ParticipantId,
    ) -> Result<()> {
        let total = self
            .store
            .with_room(room_id, |room| {
                room.ice_candidates.push(IceCandidateEntry {
                    candidate,
                    from: from.clone(),
                    timestamp: Utc::now(),
                });
                room.ice_candidates.len()
            })
            .ok_or_else(|| Error::room_not_found(room_id))?;

        metrics::SIGNALING_MESSAGES_TOTAL
            .with_label_values(&["ice_candidate"])
            .inc();
        debug!(room_id = %room_id, from = %from, total, "ICE candidate stored");
        Ok(())
    }

    /// Candidates submitted by anyone other than `requester`, in insertion
    /// order. Empty when the room does not exist.
    pub fn get_ice_candidates(
        &self,
        room_id: &RoomId,
        requester: &ParticipantId,
    ) -> Vec<IceCandidateEntry> {
        let candidates = self
            .store
            .with_room(room_id, |room| room.candidates_for(requester))
            .unwrap_or_default();

        let now = Utc::now();
        let stale = candidates
            .iter()
            .filter(|c| c.age(now) > self.stale_candidate_after)
            .count();
        if stale > 0 {
            warn!(
                room_id = %room_id,
                stale,
                total = candidates.len(),
                "Returning stale ICE candidates"
            );
        }
        candidates
    }

    /// Discard all pending signaling so the pair can renegotiate.
    /// Returns `false` if the room does not exist.
    pub fn reset_connection(&self, room_id: &RoomId) -> bool {
        match self.store.with_room(room_id, |room| room.clear_signaling()) {
            Some(cleared) => {
                info!(
                    room_id = %room_id,
                    had_offer = cleared.had_offer,
                    had_answer = cleared.had_answer,
                    ice_candidates = cleared.ice_candidates,
                    "Connection reset"
                );
                true
            }
            None => {
                debug!(room_id = %room_id, "Reset requested for unknown room");
                false
            }
        }
    }
}
