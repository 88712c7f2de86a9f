//! Room admission manager
//!
//! Enforces `occupants <= capacity` per room and "at most one room" per
//! identity. Lock order is always identity first, then room slots sorted by
//! room ID, so a move between two rooms happens under both room locks and no
//! reader can observe the identity in both.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use huddle_shared::{PresenceStore, RoomDefinition, RoomId, UserId};

use super::dispatcher::Dispatcher;
use super::events::RoomEvent;
use super::presence::{IdentityGuard, PresenceController};
use crate::error::{CoordinatorError, CoordinatorResult};

struct RoomSlot {
    definition: RoomDefinition,
    occupants: HashSet<UserId>,
}

/// Point-in-time view of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOccupancy {
    pub definition: RoomDefinition,
    pub occupants: Vec<UserId>,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Admitted { left: Option<RoomId> },
    AlreadyInside,
}

pub struct RoomAdmissionManager {
    presence: Arc<PresenceController>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn PresenceStore>,
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomSlot>>>>,
}

impl RoomAdmissionManager {
    pub fn new(
        presence: Arc<PresenceController>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            presence,
            dispatcher,
            store,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a room slot, loading its definition on first use
    async fn slot(&self, room_id: &RoomId) -> CoordinatorResult<Arc<Mutex<RoomSlot>>> {
        if let Some(slot) = self.rooms.read().await.get(room_id) {
            return Ok(Arc::clone(slot));
        }

        let definition = self
            .store
            .load_room(room_id)
            .await?
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.clone()))?;

        let mut rooms = self.rooms.write().await;
        let slot = rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::debug!(
                room_id = %room_id,
                capacity = definition.capacity,
                restricted = definition.restricted,
                "Loaded room definition"
            );
            Arc::new(Mutex::new(RoomSlot {
                definition,
                occupants: HashSet::new(),
            }))
        });
        Ok(Arc::clone(slot))
    }

    /// Admit an identity into a room, moving it out of any other room
    pub async fn join(&self, user_id: UserId, room_id: &RoomId) -> CoordinatorResult<JoinOutcome> {
        let mut guard = self.presence.lock(user_id).await;
        let target = self.slot(room_id).await?;

        let previous = guard.room().cloned();
        if previous.as_ref() == Some(room_id) {
            return Ok(JoinOutcome::AlreadyInside);
        }
        let source = match &previous {
            Some(old) => Some(self.slot(old).await?),
            None => None,
        };

        {
            // Both seats change under both locks, taken in room ID order
            let (mut target_room, source_room) = match (&previous, &source) {
                (Some(old), Some(source)) if old < room_id => {
                    let s = source.lock().await;
                    let t = target.lock().await;
                    (t, Some(s))
                }
                (Some(_), Some(source)) => {
                    let t = target.lock().await;
                    let s = source.lock().await;
                    (t, Some(s))
                }
                _ => (target.lock().await, None),
            };

            if target_room.occupants.len() >= target_room.definition.capacity as usize {
                tracing::info!(
                    user_id = %user_id,
                    room_id = %room_id,
                    capacity = target_room.definition.capacity,
                    "Room admission refused: room full"
                );
                return Err(CoordinatorError::RoomFull(room_id.clone()));
            }

            if let Some(mut source_room) = source_room {
                source_room.occupants.remove(&user_id);
            }
            target_room.occupants.insert(user_id);
        }

        if let Some(old) = guard.clear_room() {
            self.announce_left(user_id, &old).await;
        }
        self.presence.enter_meeting(&mut guard, room_id.clone()).await;
        self.dispatcher.subscribe_identity(&user_id, room_id).await;
        self.dispatcher
            .global(RoomEvent::RoomUserJoined {
                room_id: room_id.clone(),
                id: user_id,
            })
            .await;

        tracing::info!(
            user_id = %user_id,
            room_id = %room_id,
            left = ?previous,
            "Room admission granted"
        );

        Ok(JoinOutcome::Admitted { left: previous })
    }

    /// Leave a room. Idempotent: returns `false` if the identity was not in it.
    pub async fn leave(&self, user_id: UserId, room_id: &RoomId) -> CoordinatorResult<bool> {
        let mut guard = self.presence.lock(user_id).await;
        if guard.room() != Some(room_id) {
            // Unknown rooms still report RoomNotFound
            self.slot(room_id).await?;
            return Ok(false);
        }

        self.release_seat(&mut guard).await;
        self.presence.leave_meeting(&mut guard).await;
        tracing::info!(user_id = %user_id, room_id = %room_id, "Left room");
        self.presence.forget_if_idle(guard).await;
        Ok(true)
    }

    /// Release whatever seat the guarded identity holds and announce it.
    /// Presence status is left to the caller.
    pub(crate) async fn release_seat(&self, guard: &mut IdentityGuard) -> Option<RoomId> {
        let room_id = guard.room().cloned()?;
        let user_id = guard.user_id();

        let slot = self.rooms.read().await.get(&room_id).cloned();
        if let Some(slot) = slot {
            slot.lock().await.occupants.remove(&user_id);
        }
        guard.clear_room();
        self.announce_left(user_id, &room_id).await;
        Some(room_id)
    }

    async fn announce_left(&self, user_id: UserId, room_id: &RoomId) {
        self.dispatcher.unsubscribe_identity(&user_id, room_id).await;
        self.dispatcher
            .global(RoomEvent::RoomUserLeft {
                room_id: room_id.clone(),
                id: user_id,
            })
            .await;
    }

    /// Ask to be let in. Advisory only: occupants are notified and nothing
    /// about admission changes.
    pub async fn knock(&self, user_id: UserId, room_id: &RoomId) -> CoordinatorResult<usize> {
        let _guard = self.presence.lock(user_id).await;
        self.slot(room_id).await?;

        let notified = self
            .dispatcher
            .to_room(
                room_id,
                RoomEvent::RoomKnocked {
                    room_id: room_id.clone(),
                    user: user_id,
                },
            )
            .await;

        tracing::info!(
            user_id = %user_id,
            room_id = %room_id,
            notified,
            "Knocked on room"
        );
        Ok(notified)
    }

    /// Definition and current occupants of a room
    pub async fn occupancy(&self, room_id: &RoomId) -> CoordinatorResult<RoomOccupancy> {
        let slot = self.slot(room_id).await?;
        let room = slot.lock().await;
        let mut occupants: Vec<UserId> = room.occupants.iter().copied().collect();
        occupants.sort();
        Ok(RoomOccupancy {
            definition: room.definition.clone(),
            occupants,
        })
    }

    /// Number of rooms whose definition has been loaded
    pub async fn loaded_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Connection;
    use crate::websocket::registry::ConnectionRegistry;
    use huddle_shared::{MemoryStore, PresenceStatus};
    use tokio::sync::mpsc;

    fn manager() -> (RoomAdmissionManager, Arc<PresenceController>) {
        let store = Arc::new(MemoryStore::with_rooms([RoomDefinition {
            id: RoomId::from("war-room"),
            name: "War Room".to_string(),
            capacity: 1,
            restricted: true,
        }]));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(ConnectionRegistry::new())));
        let presence = Arc::new(PresenceController::new(
            Arc::clone(&dispatcher),
            store.clone(),
        ));
        let manager = RoomAdmissionManager::new(Arc::clone(&presence), dispatcher, store);
        (manager, presence)
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let (manager, presence) = manager();
        let alice = UserId::new();
        let atlantis = RoomId::from("atlantis");

        assert_eq!(
            manager.join(alice, &atlantis).await,
            Err(CoordinatorError::RoomNotFound(atlantis.clone()))
        );
        assert_eq!(
            manager.leave(alice, &atlantis).await,
            Err(CoordinatorError::RoomNotFound(atlantis.clone()))
        );
        assert!(manager.knock(alice, &atlantis).await.is_err());
        assert_eq!(presence.lock(alice).await.room(), None);
        assert_eq!(manager.loaded_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_restricted_room_still_admits() {
        let (manager, presence) = manager();
        let alice = UserId::new();
        let room_id = RoomId::from("war-room");

        assert_eq!(
            manager.join(alice, &room_id).await,
            Ok(JoinOutcome::Admitted { left: None })
        );
        assert_eq!(
            manager.join(alice, &room_id).await,
            Ok(JoinOutcome::AlreadyInside)
        );
        assert_eq!(presence.lock(alice).await.room(), Some(&room_id));
    }

    #[tokio::test]
    async fn test_refused_join_changes_nothing() {
        let (manager, presence) = manager();
        let room_id = RoomId::from("war-room");
        let alice = UserId::new();
        let bob = UserId::new();
        manager.join(alice, &room_id).await.unwrap();

        assert_eq!(
            manager.join(bob, &room_id).await,
            Err(CoordinatorError::RoomFull(room_id.clone()))
        );

        assert_eq!(presence.lock(bob).await.room(), None);
        assert_eq!(presence.presence_of(&bob).await.status, PresenceStatus::Offline);
        assert_eq!(
            manager.occupancy(&room_id).await.unwrap().occupants,
            vec![alice]
        );
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let (manager, presence) = manager();
        let room_id = RoomId::from("war-room");
        let alice = UserId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        presence
            .connect(Arc::new(Connection::new(alice, tx)))
            .await;
        manager.join(alice, &room_id).await.unwrap();

        assert_eq!(manager.leave(alice, &room_id).await, Ok(true));
        assert_eq!(manager.leave(alice, &room_id).await, Ok(false));
        assert_eq!(presence.presence_of(&alice).await.status, PresenceStatus::Online);
        assert!(manager.occupancy(&room_id).await.unwrap().occupants.is_empty());
    }

    #[tokio::test]
    async fn test_seat_without_socket_stays_offline() {
        let (manager, presence) = manager();
        let room_id = RoomId::from("war-room");
        let alice = UserId::new();

        manager.join(alice, &room_id).await.unwrap();
        assert_eq!(presence.presence_of(&alice).await.status, PresenceStatus::Offline);
        assert_eq!(
            manager.occupancy(&room_id).await.unwrap().occupants,
            vec![alice]
        );

        assert_eq!(manager.leave(alice, &room_id).await, Ok(true));
        assert_eq!(presence.presence_of(&alice).await.status, PresenceStatus::Offline);
        assert!(presence.snapshot().await.is_empty());
        assert_eq!(presence.tracked_identities().await, 0);
    }

    #[tokio::test]
    async fn test_release_seat_frees_capacity() {
        let (manager, presence) = manager();
        let room_id = RoomId::from("war-room");
        let alice = UserId::new();
        manager.join(alice, &room_id).await.unwrap();

        {
            let mut guard = presence.lock(alice).await;
            assert_eq!(manager.release_seat(&mut guard).await, Some(room_id.clone()));
            assert_eq!(manager.release_seat(&mut guard).await, None);
        }

        assert!(manager.join(UserId::new(), &room_id).await.is_ok());
    }
}
