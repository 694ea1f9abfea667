//! In-memory room registry
//!
//! The map itself is a `DashMap` so lazy creation and cleanup never block
//! unrelated rooms; each room's fields sit behind their own mutex. A cleaned
//! up room is marked closed under its lock before it is detached, so anyone
//! still holding the old `Arc` can tell it is gone.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use crate::metrics;
use crate::models::{Room, RoomId};

/// A room shared between the store, request handlers and timer callbacks
pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: DashMap<RoomId, SharedRoom>,
}

impl RoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<SharedRoom> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    /// Return the room, creating it first if it does not exist.
    /// The flag reports whether this call created it.
    pub fn get_or_create(&self, room_id: &RoomId) -> (SharedRoom, bool) {
        if let Some(room) = self.get(room_id) {
            return (room, false);
        }

        let mut created = false;
        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Room::new(Utc::now())))
            })
            .value()
            .clone();

        if created {
            info!(room_id = %room_id, "Creating new room");
            metrics::ROOMS_CREATED_TOTAL.inc();
            metrics::ROOMS_ACTIVE.inc();
        }

        (room, created)
    }

    /// Run `f` against a live room, creating it if needed.
    ///
    /// Retries when it races a cleanup that closed the room it looked up.
    pub fn with_room_or_create<R>(
        &self,
        room_id: &RoomId,
        f: impl FnOnce(&mut Room, bool) -> R,
    ) -> R {
        loop {
            let (shared, created) = self.get_or_create(room_id);
            let mut room = shared.lock();
            if room.is_closed() {
                continue;
            }
            return f(&mut room, created);
        }
    }

    /// Run `f` against a live room; `None` if it is absent or already closed
    pub fn with_room<R>(&self, room_id: &RoomId, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let shared = self.get(room_id)?;
        let mut room = shared.lock();
        if room.is_closed() {
            return None;
        }
        Some(f(&mut room))
    }

    /// Detach `room` from the map, but only if the entry still points at it
    pub fn remove(&self, room_id: &RoomId, room: &SharedRoom) -> bool {
        let removed = self
            .rooms
            .remove_if(room_id, |_, current| Arc::ptr_eq(current, room))
            .is_some();
        if removed {
            metrics::ROOMS_ACTIVE.dec();
        }
        removed
    }

    /// Connected participants in the room, 0 when the room does not exist
    #[must_use]
    pub fn connected_count(&self, room_id: &RoomId) -> usize {
        self.with_room(room_id, |room| room.connected_count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Snapshot of every room currently registered
    #[must_use]
    pub fn rooms(&self) -> Vec<(RoomId, SharedRoom)> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, ParticipantId};

    #[test]
    fn test_get_or_create_is_lazy_and_idempotent() {
        let store = RoomStore::new();
        let room_id = RoomId::from("room-42");
        assert!(store.get(&room_id).is_none());

        let (first, created) = store.get_or_create(&room_id);
        assert!(created);
        let (second, created_again) = store.get_or_create(&room_id);
        assert!(!created_again);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_only_matching_room() {
        let store = RoomStore::new();
        let room_id = RoomId::from("room-42");
        let (room, _) = store.get_or_create(&room_id);
        let stranger: SharedRoom = Arc::new(Mutex::new(Room::new(Utc::now())));

        assert!(!store.remove(&room_id, &stranger));
        assert!(store.contains(&room_id));
        assert!(store.remove(&room_id, &room));
        assert!(!store.contains(&room_id));
        assert!(!store.remove(&room_id, &room));
    }

    #[test]
    fn test_with_room_skips_closed_rooms() {
        let store = RoomStore::new();
        let room_id = RoomId::from("room-42");
        let (room, _) = store.get_or_create(&room_id);
        room.lock().mark_closed();

        assert!(store.with_room(&room_id, |_| ()).is_none());
        assert_eq!(store.connected_count(&room_id), 0);
    }

    #[test]
    fn test_with_room_or_create_replaces_closed_room() {
        let store = RoomStore::new();
        let room_id = RoomId::from("room-42");
        let (stale, _) = store.get_or_create(&room_id);
        {
            let mut guard = stale.lock();
            guard.mark_closed();
            store.remove(&room_id, &stale);
        }

        let created = store.with_room_or_create(&room_id, |room, created| {
            let id = ParticipantId::from("A");
            room.participants
                .insert(id.clone(), Participant::new(id, Utc::now()));
            created
        });

        assert!(created);
        assert_eq!(store.connected_count(&room_id), 1);
    }
}
