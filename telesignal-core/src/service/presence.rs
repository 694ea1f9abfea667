//! Live participant-count push
//!
//! Each room keeps a set of subscribers, each wrapping a [`PresenceSink`].
//! Every broadcast re-reads the connected count from the store while holding
//! the room's subscriber lock, so the last event a sink receives always
//! reflects the latest membership. Lock order is subscriber set, then room;
//! callers must not hold a room lock when calling in here.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::store::RoomStore;
use crate::metrics;
use crate::models::RoomId;

/// Identifier of one presence subscription
pub type SubscriptionId = String;

/// Event pushed to presence subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    ParticipantCount { count: usize },
}

impl PresenceEvent {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Text event-stream framing: `data: <json>\n\n`
    pub fn to_sse_frame(&self) -> crate::Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}

#[derive(Debug, Error)]
#[error("presence sink closed")]
pub struct SinkClosed;

/// Transport-independent receiver of presence events
pub trait PresenceSink: Send + Sync {
    fn deliver(&self, event: &PresenceEvent) -> Result<(), SinkClosed>;
}

impl PresenceSink for mpsc::UnboundedSender<PresenceEvent> {
    fn deliver(&self, event: &PresenceEvent) -> Result<(), SinkClosed> {
        self.send(event.clone()).map_err(|_| SinkClosed)
    }
}

struct Subscriber {
    id: SubscriptionId,
    sink: Box<dyn PresenceSink>,
}

#[derive(Default)]
struct SubscriberSet {
    subscribers: Vec<Subscriber>,
    /// Set once the set has been detached from the map
    retired: bool,
}

type SharedSubscribers = Arc<Mutex<SubscriberSet>>;

pub struct PresenceBroadcaster {
    store: Arc<RoomStore>,
    rooms: DashMap<RoomId, SharedSubscribers>,
}

impl PresenceBroadcaster {
    #[must_use]
    pub fn new(store: Arc<RoomStore>) -> Self {
        Self {
            store,
            rooms: DashMap::new(),
        }
    }

    /// Register a sink and immediately push it the current count.
    ///
    /// Fails without registering when the sink rejects the initial event.
    pub fn subscribe(
        &self,
        room_id: &RoomId,
        sink: Box<dyn PresenceSink>,
    ) -> Result<SubscriptionId, SinkClosed> {
        loop {
            let set = self.rooms.entry(room_id.clone()).or_default().value().clone();
            let mut guard = set.lock();
            if guard.retired {
                continue;
            }

            let count = self.store.connected_count(room_id);
            sink.deliver(&PresenceEvent::ParticipantCount { count })?;

            let id = nanoid::nanoid!(12);
            guard.subscribers.push(Subscriber {
                id: id.clone(),
                sink,
            });
            metrics::PRESENCE_SUBSCRIBERS.inc();

            info!(
                room_id = %room_id,
                subscription_id = %id,
                subscribers = guard.subscribers.len(),
                count,
                "Presence subscriber added"
            );
            return Ok(id);
        }
    }

    /// Subscribe with an in-process channel. The returned guard unsubscribes
    /// when dropped, so tying it to a connection's lifetime is enough.
    pub fn subscribe_channel(
        self: &Arc<Self>,
        room_id: &RoomId,
    ) -> Result<(PresenceSubscription, mpsc::UnboundedReceiver<PresenceEvent>), SinkClosed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(room_id, Box::new(tx))?;
        let subscription = PresenceSubscription {
            broadcaster: self.clone(),
            room_id: room_id.clone(),
            id,
        };
        Ok((subscription, rx))
    }

    /// Remove one subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, room_id: &RoomId, subscription_id: &str) {
        let Some(set) = self.rooms.get(room_id).map(|entry| entry.value().clone()) else {
            return;
        };
        let mut guard = set.lock();
        let before = guard.subscribers.len();
        guard.subscribers.retain(|sub| sub.id != subscription_id);
        let removed = before - guard.subscribers.len();
        if removed > 0 {
            metrics::PRESENCE_SUBSCRIBERS.sub(removed as i64);
            info!(
                room_id = %room_id,
                subscription_id = %subscription_id,
                remaining = guard.subscribers.len(),
                "Presence subscriber removed"
            );
        }
        self.retire_if_empty(room_id, &set, &mut guard);
    }

    /// Push the current connected count to every subscriber of the room.
    /// Sinks that fail are dropped. Returns the number of successful deliveries.
    pub fn broadcast(&self, room_id: &RoomId) -> usize {
        let Some(set) = self.rooms.get(room_id).map(|entry| entry.value().clone()) else {
            debug!(room_id = %room_id, "No presence subscribers to broadcast to");
            return 0;
        };
        let mut guard = set.lock();
        if guard.retired {
            return 0;
        }

        let count = self.store.connected_count(room_id);
        let event = PresenceEvent::ParticipantCount { count };

        let before = guard.subscribers.len();
        guard.subscribers.retain(|sub| match sub.sink.deliver(&event) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    room_id = %room_id,
                    subscription_id = %sub.id,
                    error = %err,
                    "Failed to push presence update, dropping subscriber"
                );
                false
            }
        });
        let delivered = guard.subscribers.len();
        metrics::PRESENCE_SUBSCRIBERS.sub((before - delivered) as i64);

        debug!(room_id = %room_id, count, delivered, "Broadcast participant count");
        self.retire_if_empty(room_id, &set, &mut guard);
        delivered
    }

    /// Drop every subscriber of a deleted room so their streams end.
    ///
    /// Skipped when a room with the same id is live again by the time the
    /// subscriber lock is taken: its subscribers belong to the new room.
    pub fn close_room(&self, room_id: &RoomId) {
        let Some(set) = self.rooms.get(room_id).map(|entry| entry.value().clone()) else {
            return;
        };
        let mut guard = set.lock();
        if guard.retired {
            return;
        }
        if self.store.contains(room_id) {
            debug!(room_id = %room_id, "Room was recreated, keeping presence subscribers");
            return;
        }

        guard.retired = true;
        self.rooms.remove_if(room_id, |_, current| Arc::ptr_eq(current, &set));
        let dropped = guard.subscribers.len();
        guard.subscribers.clear();
        metrics::PRESENCE_SUBSCRIBERS.sub(dropped as i64);
        if dropped > 0 {
            info!(room_id = %room_id, dropped, "Closed presence subscribers for removed room");
        }
    }

    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        let Some(set) = self.rooms.get(room_id).map(|entry| entry.value().clone()) else {
            return 0;
        };
        let count = set.lock().subscribers.len();
        count
    }

    /// Rooms with at least one subscriber set registered
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn retire_if_empty(
        &self,
        room_id: &RoomId,
        set: &SharedSubscribers,
        guard: &mut SubscriberSet,
    ) {
        if guard.subscribers.is_empty() && !guard.retired {
            guard.retired = true;
            self.rooms.remove_if(room_id, |_, current| Arc::ptr_eq(current, set));
            debug!(room_id = %room_id, "Room has no more presence subscribers, removed");
        }
    }
}

/// Keeps a channel subscription registered for as long as it lives
pub struct PresenceSubscription {
    broadcaster: Arc<PresenceBroadcaster>,
    room_id: RoomId,
    id: SubscriptionId,
}

impl PresenceSubscription {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn room_id(&self) -> &RoomId {
        &self.room_id
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(&self.room_id, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, ParticipantId};
    use chrono::Utc;

    struct FailingSink;

    impl PresenceSink for FailingSink {
        fn deliver(&self, _event: &PresenceEvent) -> Result<(), SinkClosed> {
            Err(SinkClosed)
        }
    }

    fn setup() -> (Arc<RoomStore>, Arc<PresenceBroadcaster>) {
        let store = Arc::new(RoomStore::new());
        let presence = Arc::new(PresenceBroadcaster::new(store.clone()));
        (store, presence)
    }

    fn add_connected(store: &RoomStore, room_id: &RoomId, who: &str) {
        store.with_room_or_create(room_id, |room, _| {
            let id = ParticipantId::from(who);
            room.participants.insert(id.clone(), Participant::new(id, Utc::now()));
        });
    }

    #[test]
    fn test_event_framing() {
        let event = PresenceEvent::ParticipantCount { count: 2 };
        assert_eq!(event.to_json().unwrap(), r#"{"type":"participant_count","count":2}"#);
        assert_eq!(
            event.to_sse_frame().unwrap(),
            "data: {\"type\":\"participant_count\",\"count\":2}\n\n"
        );
    }

    #[tokio::test]
    async fn test_subscribe_pushes_current_count() {
        let (store, presence) = setup();
        let room_id = RoomId::from("room-42");
        add_connected(&store, &room_id, "A");

        let (_sub, mut rx) = presence.subscribe_channel(&room_id).unwrap();
        assert_eq!(rx.recv().await, Some(PresenceEvent::ParticipantCount { count: 1 }));
        assert_eq!(presence.subscriber_count(&room_id), 1);
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_room_reports_zero() {
        let (store, presence) = setup();
        let room_id = RoomId::from("nobody-here");

        let (_sub, mut rx) = presence.subscribe_channel(&room_id).unwrap();
        assert_eq!(rx.recv().await, Some(PresenceEvent::ParticipantCount { count: 0 }));
        assert!(!store.contains(&room_id));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let (store, presence) = setup();
        let room_id = RoomId::from("room-42");

        let (_sub1, mut rx1) = presence.subscribe_channel(&room_id).unwrap();
        let (_sub2, mut rx2) = presence.subscribe_channel(&room_id).unwrap();
        rx1.recv().await;
        rx2.recv().await;

        add_connected(&store, &room_id, "A");
        add_connected(&store, &room_id, "B");
        assert_eq!(presence.broadcast(&room_id), 2);

        let expected = Some(PresenceEvent::ParticipantCount { count: 2 });
        assert_eq!(rx1.recv().await, expected);
        assert_eq!(rx2.recv().await, expected);
    }

    #[tokio::test]
    async fn test_failed_sink_is_removed_on_broadcast() {
        let (_store, presence) = setup();
        let room_id = RoomId::from("room-42");

        let (_sub, rx) = presence.subscribe_channel(&room_id).unwrap();
        drop(rx);

        assert_eq!(presence.broadcast(&room_id), 0);
        assert_eq!(presence.subscriber_count(&room_id), 0);
        assert_eq!(presence.room_count(), 0);
    }

    #[test]
    fn test_rejected_initial_push_does_not_register() {
        let (_store, presence) = setup();
        let room_id = RoomId::from("room-42");

        assert!(presence.subscribe(&room_id, Box::new(FailingSink)).is_err());
        assert_eq!(presence.subscriber_count(&room_id), 0);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let (_store, presence) = setup();
        let room_id = RoomId::from("room-42");

        let (sub, _rx) = presence.subscribe_channel(&room_id).unwrap();
        assert_eq!(presence.subscriber_count(&room_id), 1);

        drop(sub);
        assert_eq!(presence.subscriber_count(&room_id), 0);
        assert_eq!(presence.room_count(), 0);

        // Resubscribing after the set was retired starts a fresh one
        let (_sub, _rx) = presence.subscribe_channel(&room_id).unwrap();
        assert_eq!(presence.subscriber_count(&room_id), 1);
    }

    #[tokio::test]
    async fn test_close_room_ends_streams() {
        let (_store, presence) = setup();
        let room_id = RoomId::from("room-42");

        let (_sub, mut rx) = presence.subscribe_channel(&room_id).unwrap();
        rx.recv().await;

        presence.close_room(&room_id);
        assert_eq!(rx.recv().await, None);
        assert_eq!(presence.room_count(), 0);
    }

    #[tokio::test]
    async fn test_close_room_keeps_subscribers_of_recreated_room() {
        let (store, presence) = setup();
        let room_id = RoomId::from("room-42");

        // Room deleted, then recreated by a join before the close runs
        let (_sub, mut rx) = presence.subscribe_channel(&room_id).unwrap();
        rx.recv().await;
        add_connected(&store, &room_id, "A");

        presence.close_room(&room_id);
        assert_eq!(presence.subscriber_count(&room_id), 1);

        assert_eq!(presence.broadcast(&room_id), 1);
        assert_eq!(rx.recv().await, Some(PresenceEvent::ParticipantCount { count: 1 }));
    }
}
