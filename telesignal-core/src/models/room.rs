use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{ParticipantId, RoomId};
use crate::timer::TimerHandle;

/// Participant connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Connected,
    Disconnected,
}

/// Which signaling material a participant contributed in the current
/// negotiation epoch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub has_active_session: bool,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_offer_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_answer_at: Option<DateTime<Utc>>,
}

/// One side of a call
#[derive(Debug, Clone)]
pub struct Participant {
    pub identifier: ParticipantId,
    pub joined_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: ParticipantStatus,
    pub session_data: SessionData,
}

impl Participant {
    #[must_use]
    pub fn new(identifier: ParticipantId, now: DateTime<Utc>) -> Self {
        Self {
            identifier,
            joined_at: now,
            last_seen_at: now,
            status: ParticipantStatus::Connected,
            session_data: SessionData::default(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ParticipantStatus::Connected
    }

    /// Reconnect and start a fresh negotiation epoch
    pub fn rejoin(&mut self, now: DateTime<Utc>) {
        self.status = ParticipantStatus::Connected;
        self.last_seen_at = now;
        self.session_data = SessionData::default();
    }

    pub fn disconnect(&mut self, now: DateTime<Utc>) {
        self.status = ParticipantStatus::Disconnected;
        self.last_seen_at = now;
    }

    pub(crate) fn record_description(&mut self, kind: DescriptionKind, now: DateTime<Utc>) {
        self.session_data.has_active_session = true;
        match kind {
            DescriptionKind::Offer => self.session_data.last_offer_at = Some(now),
            DescriptionKind::Answer => self.session_data.last_answer_at = Some(now),
        }
    }
}

/// The two SDP halves of a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    Offer,
    Answer,
}

impl DescriptionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
        }
    }
}

/// A pending offer or answer. The SDP payload is opaque and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEntry {
    pub sdp: serde_json::Value,
    pub from: ParticipantId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// An ICE candidate as submitted by a participant. The candidate payload is
/// opaque and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateEntry {
    pub candidate: serde_json::Value,
    pub from: ParticipantId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Age of a timestamped entry, clamped at zero for clock skew
#[must_use]
pub fn age_of(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(timestamp)
        .to_std()
        .unwrap_or_default()
}

impl SignalEntry {
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        age_of(self.timestamp, now)
    }
}

impl IceCandidateEntry {
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        age_of(self.timestamp, now)
    }
}

/// The two independent expiry timers of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Armed on the first leave
    FirstLeave,
    /// Armed whenever the connected count drops to zero
    Empty,
}

/// A timer plus the token identifying this particular arming
#[derive(Debug)]
pub struct ArmedTimer {
    pub token: u64,
    pub handle: TimerHandle,
}

/// What was discarded by a signaling reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedSignaling {
    pub had_offer: bool,
    pub had_answer: bool,
    pub ice_candidates: usize,
}

/// A single call session
#[derive(Debug)]
pub struct Room {
    pub participants: HashMap<ParticipantId, Participant>,
    pub created_at: DateTime<Utc>,
    pub first_leave_at: Option<DateTime<Utc>>,
    pub last_empty_at: Option<DateTime<Utc>>,
    pub expire_timer: Option<ArmedTimer>,
    pub empty_timer: Option<ArmedTimer>,
    pub pending_offer: Option<SignalEntry>,
    pub pending_answer: Option<SignalEntry>,
    pub ice_candidates: Vec<IceCandidateEntry>,
    next_timer_token: u64,
    closed: bool,
}

impl Room {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            participants: HashMap::new(),
            created_at: now,
            first_leave_at: None,
            last_empty_at: None,
            expire_timer: None,
            empty_timer: None,
            pending_offer: None,
            pending_answer: None,
            ice_candidates: Vec::new(),
            next_timer_token: 0,
            closed: false,
        }
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_connected()).count()
    }

    /// Connected participants other than `identifier`
    #[must_use]
    pub fn connected_count_excluding(&self, identifier: &ParticipantId) -> usize {
        self.participants
            .values()
            .filter(|p| p.is_connected() && p.identifier != *identifier)
            .count()
    }

    /// Whether the room has been cleaned up and detached from the store
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub(crate) fn next_timer_token(&mut self) -> u64 {
        self.next_timer_token += 1;
        self.next_timer_token
    }

    pub fn timer_slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::FirstLeave => &mut self.expire_timer,
            TimerKind::Empty => &mut self.empty_timer,
        }
    }

    #[must_use]
    pub fn timer_token(&self, kind: TimerKind) -> Option<u64> {
        let slot = match kind {
            TimerKind::FirstLeave => &self.expire_timer,
            TimerKind::Empty => &self.empty_timer,
        };
        slot.as_ref().map(|timer| timer.token)
    }

    /// Cancel both timers, if armed
    pub fn cancel_timers(&mut self) {
        if let Some(timer) = self.expire_timer.take() {
            timer.handle.cancel();
        }
        if let Some(timer) = self.empty_timer.take() {
            timer.handle.cancel();
        }
    }

    pub fn description_slot(&mut self, kind: DescriptionKind) -> &mut Option<SignalEntry> {
        match kind {
            DescriptionKind::Offer => &mut self.pending_offer,
            DescriptionKind::Answer => &mut self.pending_answer,
        }
    }

    #[must_use]
    pub const fn description(&self, kind: DescriptionKind) -> Option<&SignalEntry> {
        match kind {
            DescriptionKind::Offer => self.pending_offer.as_ref(),
            DescriptionKind::Answer => self.pending_answer.as_ref(),
        }
    }

    /// Drop the pending offer, pending answer and every ICE candidate
    pub fn clear_signaling(&mut self) -> ClearedSignaling {
        let cleared = ClearedSignaling {
            had_offer: self.pending_offer.take().is_some(),
            had_answer: self.pending_answer.take().is_some(),
            ice_candidates: self.ice_candidates.len(),
        };
        self.ice_candidates.clear();
        cleared
    }

    /// Candidates contributed by anyone other than `requester`
    #[must_use]
    pub fn candidates_for(&self, requester: &ParticipantId) -> Vec<IceCandidateEntry> {
        self.ice_candidates
            .iter()
            .filter(|entry| entry.from != *requester)
            .cloned()
            .collect()
    }

    /// Most recent activity of any participant, or creation time if nobody
    /// ever joined
    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.participants
            .values()
            .map(|p| p.last_seen_at)
            .max()
            .unwrap_or(self.created_at)
    }

    #[must_use]
    pub fn expiration(&self) -> RoomExpiration {
        RoomExpiration {
            first_leave_at: self.first_leave_at,
            last_empty_at: self.last_empty_at,
            has_expire_timer: self.expire_timer.is_some(),
            has_empty_timer: self.empty_timer.is_some(),
        }
    }

    #[must_use]
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            created_at: self.created_at,
            expiration: self.expiration(),
        }
    }

    #[must_use]
    pub fn status(&self, room_id: &RoomId) -> RoomStatus {
        let mut participants: Vec<ParticipantSummary> = self
            .participants
            .values()
            .map(|p| ParticipantSummary {
                identifier: p.identifier.redacted(),
                status: p.status,
                joined_at: p.joined_at,
                last_seen_at: p.last_seen_at,
                has_active_session: p.session_data.has_active_session,
            })
            .collect();
        participants.sort_by_key(|p| p.joined_at);

        RoomStatus {
            room_id: room_id.clone(),
            participant_count: self.connected_count(),
            total_participants: self.participants.len(),
            participants,
            created_at: self.created_at,
            expiration: self.expiration(),
            pending_offer: self.pending_offer.is_some(),
            pending_answer: self.pending_answer.is_some(),
            ice_candidates_count: self.ice_candidates.len(),
        }
    }
}

/// Expiry bookkeeping snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomExpiration {
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub first_leave_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_empty_at: Option<DateTime<Utc>>,
    pub has_expire_timer: bool,
    pub has_empty_timer: bool,
}

/// Lifecycle snapshot returned from a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub expiration: RoomExpiration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub identifier: String,
    pub status: ParticipantStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen_at: DateTime<Utc>,
    pub has_active_session: bool,
}

/// Diagnostic view of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub participant_count: usize,
    pub total_participants: usize,
    pub participants: Vec<ParticipantSummary>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub expiration: RoomExpiration,
    pub pending_offer: bool,
    pub pending_answer: bool,
    pub ice_candidates_count: usize,
}
