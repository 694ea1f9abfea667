//! Room membership and expiry
//!
//! Join and leave mutate a room under its lock, then push the new count to
//! presence subscribers once the lock is released. Rooms expire on two
//! independent one-shot timers: one armed on the first leave, one armed each
//! time the room empties. Whichever fires first deletes the room.
//!
//! Offer role: the first connected participant in a room initiates the
//! offer; anyone joining while another participant is connected answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::presence::PresenceBroadcaster;
use super::store::{RoomStore, SharedRoom};
use crate::config::SignalingConfig;
use crate::metrics;
use crate::models::{
    age_of, ArmedTimer, Participant, ParticipantId, Room, RoomExpiration, RoomId, RoomInfo,
    RoomStatus, TimerKind,
};
use crate::timer::DelayScheduler;

/// Expiry durations for rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomTimeouts {
    pub expire_after_first_leave: Duration,
    pub expire_after_empty: Duration,
    /// `None` disables the idle sweep
    pub idle_room_ttl: Option<Duration>,
}

impl Default for RoomTimeouts {
    fn default() -> Self {
        Self::from(&SignalingConfig::default())
    }
}

impl From<&SignalingConfig> for RoomTimeouts {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            expire_after_first_leave: config.expire_after_first_leave(),
            expire_after_empty: config.expire_after_empty(),
            idle_room_ttl: config.idle_room_ttl(),
        }
    }
}

/// Why a room was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    FirstLeaveExpired,
    EmptyExpired,
    IdleSwept,
    Manual,
}

impl CleanupReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstLeaveExpired => "first_leave_expired",
            Self::EmptyExpired => "empty_expired",
            Self::IdleSwept => "idle_swept",
            Self::Manual => "manual",
        }
    }
}

impl From<TimerKind> for CleanupReason {
    fn from(kind: TimerKind) -> Self {
        match kind {
            TimerKind::FirstLeave => Self::FirstLeaveExpired,
            TimerKind::Empty => Self::EmptyExpired,
        }
    }
}

/// Result of a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub is_rejoin: bool,
    pub participant_count: usize,
    pub room_info: RoomInfo,
    pub should_initiate_offer: bool,
}

/// Result of a leave. `room_expiration` is `None` when the room did not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    pub participant_count: usize,
    pub room_expiration: Option<RoomExpiration>,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<RoomStore>,
    presence: Arc<PresenceBroadcaster>,
    scheduler: Arc<dyn DelayScheduler>,
    timeouts: RoomTimeouts,
}

impl SessionManager {
    pub fn new(
        store: Arc<RoomStore>,
        presence: Arc<PresenceBroadcaster>,
        scheduler: Arc<dyn DelayScheduler>,
        timeouts: RoomTimeouts,
    ) -> Self {
        Self {
            store,
            presence,
            scheduler,
            timeouts,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RoomStore> {
        &self.store
    }

    #[must_use]
    pub const fn timeouts(&self) -> &RoomTimeouts {
        &self.timeouts
    }

    /// Return the room, lazily creating it
    pub fn get_or_create_room(&self, room_id: &RoomId) -> SharedRoom {
        self.store.get_or_create(room_id).0
    }

    /// Add a participant to the room, or reconnect one already recorded there
    pub fn handle_join(&self, room_id: &RoomId, participant_id: &ParticipantId) -> JoinOutcome {
        let outcome = self.store.with_room_or_create(room_id, |room, _created| {
            let now = Utc::now();
            debug!(
                room_id = %room_id,
                room_age_ms = age_of(room.created_at, now).as_millis() as u64,
                total_participants = room.participants.len(),
                pending_offer_from = ?room.pending_offer.as_ref().map(|o| o.from.as_str()),
                pending_answer_from = ?room.pending_answer.as_ref().map(|a| a.from.as_str()),
                "Room state before join"
            );

            let should_initiate_offer = room.connected_count_excluding(participant_id) == 0;

            let is_rejoin = match room.participants.get_mut(participant_id) {
                Some(existing) => {
                    let previous = existing.status;
                    existing.rejoin(now);
                    info!(
                        room_id = %room_id,
                        participant_id = %participant_id,
                        previous_status = ?previous,
                        "Participant rejoined, session data reset"
                    );
                    true
                }
                None => {
                    room.participants.insert(
                        participant_id.clone(),
                        Participant::new(participant_id.clone(), now),
                    );
                    info!(
                        room_id = %room_id,
                        participant_id = %participant_id,
                        "Participant joined"
                    );
                    false
                }
            };

            Self::clear_empty_timer_locked(room_id, room);

            let participant_count = room.connected_count();
            info!(
                room_id = %room_id,
                participant_id = %participant_id,
                participant_count,
                should_initiate_offer,
                "Join complete"
            );

            JoinOutcome {
                is_rejoin,
                participant_count,
                room_info: room.info(),
                should_initiate_offer,
            }
        });

        self.presence.broadcast(room_id);
        outcome
    }

    /// Mark a participant disconnected and invalidate any in-flight negotiation
    pub fn handle_leave(&self, room_id: &RoomId, participant_id: &ParticipantId) -> LeaveOutcome {
        let outcome = self.store.with_room(room_id, |room| {
            let now = Utc::now();
            let Some(participant) = room.participants.get_mut(participant_id) else {
                debug!(
                    room_id = %room_id,
                    participant_id = %participant_id,
                    "Participant not found for leave"
                );
                return LeaveOutcome {
                    participant_count: room.connected_count(),
                    room_expiration: Some(room.expiration()),
                };
            };
            participant.disconnect(now);

            let cleared = room.clear_signaling();
            info!(
                room_id = %room_id,
                participant_id = %participant_id,
                had_offer = cleared.had_offer,
                had_answer = cleared.had_answer,
                ice_candidates = cleared.ice_candidates,
                "Participant left, signaling state cleared"
            );

            self.arm_expiration_timers(room_id, room);

            LeaveOutcome {
                participant_count: room.connected_count(),
                room_expiration: Some(room.expiration()),
            }
        });

        let outcome = outcome.unwrap_or_else(|| {
            debug!(
                room_id = %room_id,
                participant_id = %participant_id,
                "Room not found for leave"
            );
            LeaveOutcome {
                participant_count: 0,
                room_expiration: None,
            }
        });

        self.presence.broadcast(room_id);
        outcome
    }

    /// Arm expiry timers according to the room's current membership
    pub fn set_expiration_timers(&self, room_id: &RoomId) {
        self.store
            .with_room(room_id, |room| self.arm_expiration_timers(room_id, room));
    }

    fn arm_expiration_timers(&self, room_id: &RoomId, room: &mut Room) {
        let connected = room.connected_count();
        let total = room.participants.len();
        let now = Utc::now();

        if room.first_leave_at.is_none() && connected < total {
            room.first_leave_at = Some(now);
            let timer = self.arm_timer(room_id, room, TimerKind::FirstLeave);
            room.expire_timer = Some(timer);
            info!(
                room_id = %room_id,
                expires_in_secs = self.timeouts.expire_after_first_leave.as_secs(),
                "Armed first-leave expiration timer"
            );
        }

        if connected == 0 {
            room.last_empty_at = Some(now);
            if let Some(previous) = room.empty_timer.take() {
                previous.handle.cancel();
            }
            let timer = self.arm_timer(room_id, room, TimerKind::Empty);
            room.empty_timer = Some(timer);
            info!(
                room_id = %room_id,
                expires_in_secs = self.timeouts.expire_after_empty.as_secs(),
                "Armed empty-room expiration timer"
            );
        }
    }

    fn arm_timer(&self, room_id: &RoomId, room: &mut Room, kind: TimerKind) -> ArmedTimer {
        let delay = match kind {
            TimerKind::FirstLeave => self.timeouts.expire_after_first_leave,
            TimerKind::Empty => self.timeouts.expire_after_empty,
        };
        let token = room.next_timer_token();
        let manager = self.clone();
        let room_id = room_id.clone();
        let handle = self.scheduler.schedule(
            delay,
            Box::pin(async move {
                manager.on_timer_fired(&room_id, kind, token);
            }),
        );
        ArmedTimer { token, handle }
    }

    /// Cancel the empty-room timer once somebody is connected again
    pub fn clear_empty_timer(&self, room_id: &RoomId) {
        self.store
            .with_room(room_id, |room| Self::clear_empty_timer_locked(room_id, room));
    }

    fn clear_empty_timer_locked(room_id: &RoomId, room: &mut Room) {
        if let Some(timer) = room.empty_timer.take() {
            timer.handle.cancel();
            room.last_empty_at = None;
            info!(room_id = %room_id, "Cleared empty-room timer, participants rejoined");
        }
    }

    fn on_timer_fired(&self, room_id: &RoomId, kind: TimerKind, token: u64) {
        let Some(shared) = self.store.get(room_id) else {
            debug!(room_id = %room_id, ?kind, "Timer fired for a room that is already gone");
            return;
        };

        {
            let mut room = shared.lock();
            if room.is_closed() || room.timer_token(kind) != Some(token) {
                debug!(room_id = %room_id, ?kind, token, "Timer superseded, ignoring");
                return;
            }
            // This timer has fired; nothing left to cancel
            room.timer_slot(kind).take();
            info!(room_id = %room_id, ?kind, "Room expired");
            self.close_locked(room_id, &shared, &mut room, CleanupReason::from(kind));
        }

        self.presence.close_room(room_id);
    }

    /// Delete a room and cancel its timers. No-op if the room is already gone.
    pub fn cleanup_room(&self, room_id: &RoomId) -> bool {
        self.cleanup_room_with_reason(room_id, CleanupReason::Manual)
    }

    fn cleanup_room_with_reason(&self, room_id: &RoomId, reason: CleanupReason) -> bool {
        let Some(shared) = self.store.get(room_id) else {
            debug!(room_id = %room_id, "Room already deleted or never existed");
            return false;
        };

        {
            let mut room = shared.lock();
            if room.is_closed() {
                return false;
            }
            self.close_locked(room_id, &shared, &mut room, reason);
        }

        self.presence.close_room(room_id);
        true
    }

    fn close_locked(
        &self,
        room_id: &RoomId,
        shared: &SharedRoom,
        room: &mut Room,
        reason: CleanupReason,
    ) {
        let now = Utc::now();
        info!(
            room_id = %room_id,
            reason = reason.as_str(),
            room_age_secs = age_of(room.created_at, now).as_secs(),
            participants = room.participants.len(),
            first_leave_at = ?room.first_leave_at,
            last_empty_at = ?room.last_empty_at,
            had_offer = room.pending_offer.is_some(),
            had_answer = room.pending_answer.is_some(),
            ice_candidates = room.ice_candidates.len(),
            "Cleaning up room"
        );

        room.cancel_timers();
        room.mark_closed();
        self.store.remove(room_id, shared);
        metrics::ROOM_CLEANUPS_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Diagnostic snapshot of a room
    #[must_use]
    pub fn room_status(&self, room_id: &RoomId) -> Option<RoomStatus> {
        self.store.with_room(room_id, |room| room.status(room_id))
    }

    /// Delete rooms that no timer will ever reap: nobody connected, no timer
    /// armed, and no participant activity within the idle TTL.
    pub fn sweep_idle_rooms(&self) -> Vec<RoomId> {
        self.sweep_idle_rooms_at(Utc::now())
    }

    pub fn sweep_idle_rooms_at(&self, now: DateTime<Utc>) -> Vec<RoomId> {
        let Some(ttl) = self.timeouts.idle_room_ttl else {
            return Vec::new();
        };

        let mut swept = Vec::new();
        for (room_id, shared) in self.store.rooms() {
            let idle = {
                let room = shared.lock();
                !room.is_closed()
                    && room.connected_count() == 0
                    && room.expire_timer.is_none()
                    && room.empty_timer.is_none()
                    && age_of(room.last_activity_at(), now) >= ttl
            };
            if idle && self.cleanup_room_with_reason(&room_id, CleanupReason::IdleSwept) {
                swept.push(room_id);
            }
        }

        if !swept.is_empty() {
            info!(count = swept.len(), "Swept idle rooms");
        }
        swept
    }
}
