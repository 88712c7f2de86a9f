//! Presence controller
//!
//! Owns the authoritative transient status of every identity. Each identity
//! has its own critical section; every transition, durable write and
//! broadcast for that identity happens while holding it, which gives a total
//! order per identity without serializing unrelated identities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

use huddle_shared::{PresenceRecord, PresenceStatus, PresenceStore, RoomId, UserId};

use super::admission::RoomAdmissionManager;
use super::connection::Connection;
use super::dispatcher::Dispatcher;
use super::events::{PresenceEvent, PresenceView};
use super::signaling::CallRelay;
use crate::error::{CoordinatorError, CoordinatorResult};

const PERSIST_BASE_DELAY_MS: u64 = 50;
const PERSIST_MAX_DELAY: Duration = Duration::from_millis(500);
/// Retries after the first attempt
const PERSIST_RETRIES: usize = 2;

/// Transient state of one identity
#[derive(Debug, Clone, Default)]
pub struct IdentityState {
    pub status: PresenceStatus,
    pub message: Option<String>,
    pub room: Option<RoomId>,
}

/// Exclusive access to one identity's state
pub struct IdentityGuard {
    user_id: UserId,
    state: OwnedMutexGuard<IdentityState>,
}

impl IdentityGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> PresenceStatus {
        self.state.status
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.state.room.as_ref()
    }

    /// Drop the room back-reference. Only the admission manager calls this,
    /// after removing the identity from the room's occupant set.
    pub(crate) fn clear_room(&mut self) -> Option<RoomId> {
        self.state.room.take()
    }

    pub(crate) fn set_room(&mut self, room_id: RoomId) {
        self.state.room = Some(room_id);
    }
}

pub struct PresenceController {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn PresenceStore>,
    identities: RwLock<HashMap<UserId, Arc<Mutex<IdentityState>>>>,
    /// Last published state of every non-offline identity, for snapshots
    published: RwLock<HashMap<UserId, PresenceView>>,
}

impl PresenceController {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<dyn PresenceStore>) -> Self {
        Self {
            dispatcher,
            store,
            identities: RwLock::new(HashMap::new()),
            published: RwLock::new(HashMap::new()),
        }
    }

    /// Enter the identity's critical section
    pub async fn lock(&self, user_id: UserId) -> IdentityGuard {
        let slot = {
            let identities = self.identities.read().await;
            identities.get(&user_id).cloned()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let mut identities = self.identities.write().await;
                Arc::clone(identities.entry(user_id).or_default())
            }
        };

        IdentityGuard {
            user_id,
            state: slot.lock_owned().await,
        }
    }

    /// Forget every durable status left over from a previous process
    pub async fn reset_durable_presence(&self) -> CoordinatorResult<u64> {
        let touched = self.store.reset_all_presence().await?;
        tracing::info!(identities = touched, "Reset durable presence to offline");
        Ok(touched)
    }

    /// Register a new connection; the first one brings the identity online
    pub async fn connect(&self, conn: Arc<Connection>) {
        let mut guard = self.lock(conn.user_id).await;
        let first = self.dispatcher.registry().register(Arc::clone(&conn)).await;

        // A tab opened mid-meeting follows the room it is already in
        if let Some(room_id) = guard.room().cloned() {
            self.dispatcher.channels().join(&room_id, Arc::clone(&conn)).await;
        }

        if first {
            // A seat taken over HTTP before any socket opened is kept
            guard.state.status = if guard.room().is_some() {
                PresenceStatus::InMeeting
            } else {
                PresenceStatus::Online
            };
            guard.state.message = None;
            self.publish(&guard).await;
            self.persist(&guard).await;
            self.dispatcher
                .global(PresenceEvent::UserOnline { id: conn.user_id })
                .await;
            tracing::info!(user_id = %conn.user_id, "User online");
        }
    }

    /// Unregister a connection. When it was the last one, any held seat is
    /// released (emitting `room_user_left`), the identity goes offline and
    /// its call sessions are abandoned, all before another tab of the same
    /// identity can register. Returns `true` if the identity went offline.
    pub async fn disconnect(
        &self,
        user_id: UserId,
        session_id: &Uuid,
        admission: &RoomAdmissionManager,
        calls: &CallRelay,
    ) -> bool {
        let mut guard = self.lock(user_id).await;
        self.dispatcher.channels().remove_connection(session_id).await;

        if !self.dispatcher.registry().unregister(&user_id, session_id).await {
            return false;
        }

        admission.release_seat(&mut guard).await;

        guard.state.status = PresenceStatus::Offline;
        guard.state.message = None;
        self.publish(&guard).await;
        self.persist(&guard).await;
        self.dispatcher
            .global(PresenceEvent::UserOffline { id: user_id })
            .await;
        tracing::info!(user_id = %user_id, "User offline");

        calls.abandon(user_id).await;
        self.forget_if_idle(guard).await;

        true
    }

    /// Explicit status request from a client
    pub async fn set_status(
        &self,
        user_id: UserId,
        status: PresenceStatus,
        message: Option<String>,
    ) -> CoordinatorResult<()> {
        if !status.is_selectable() {
            return Err(CoordinatorError::InvalidEvent(format!(
                "status '{}' cannot be requested",
                status
            )));
        }

        let mut guard = self.lock(user_id).await;
        if guard.status() == PresenceStatus::Offline {
            // Raced with the last connection closing
            tracing::debug!(user_id = %user_id, "Ignoring status change for offline user");
            return Ok(());
        }

        guard.state.status = status;
        guard.state.message = message.filter(|m| !m.trim().is_empty());
        self.commit_status_change(&guard).await;
        tracing::info!(user_id = %user_id, status = %status, "User presence updated");
        Ok(())
    }

    /// Admission granted: the identity is now in `room_id`. An identity
    /// with no live connection holds the seat but stays offline; its first
    /// socket brings it online as `in_meeting`.
    pub(crate) async fn enter_meeting(&self, guard: &mut IdentityGuard, room_id: RoomId) {
        guard.set_room(room_id);
        if self.is_reachable(guard).await {
            guard.state.status = PresenceStatus::InMeeting;
            self.commit_status_change(guard).await;
        } else {
            self.persist(guard).await;
        }
    }

    /// Seat released. A connected identity is back to `online`, one without
    /// connections stays offline.
    pub(crate) async fn leave_meeting(&self, guard: &mut IdentityGuard) {
        if self.is_reachable(guard).await {
            guard.state.status = PresenceStatus::Online;
            self.commit_status_change(guard).await;
        } else {
            guard.state.status = PresenceStatus::Offline;
            guard.state.message = None;
            self.persist(guard).await;
        }
    }

    /// Registry view of the identity. Connections only register and
    /// unregister under the identity guard, so this is stable while held.
    async fn is_reachable(&self, guard: &IdentityGuard) -> bool {
        self.dispatcher.registry().is_online(&guard.user_id).await
    }

    /// Drop the identity's slot once it is offline, holds no seat and nobody
    /// else is queued on it. A later `lock` recreates it in the default state.
    pub(crate) async fn forget_if_idle(&self, guard: IdentityGuard) {
        if guard.state.status != PresenceStatus::Offline || guard.state.room.is_some() {
            return;
        }

        let mut identities = self.identities.write().await;
        // One reference in the map, one inside the guard
        let unshared = identities
            .get(&guard.user_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 2);
        if unshared {
            identities.remove(&guard.user_id);
        }
    }

    /// Identities with a live critical-section slot
    pub async fn tracked_identities(&self) -> usize {
        self.identities.read().await.len()
    }

    async fn commit_status_change(&self, guard: &IdentityGuard) {
        self.publish(guard).await;
        self.persist(guard).await;
        self.dispatcher
            .global(PresenceEvent::UserStatusChanged {
                id: guard.user_id,
                status: guard.state.status,
                message: guard.state.message.clone(),
                room_id: guard.state.room.clone(),
            })
            .await;
    }

    async fn publish(&self, guard: &IdentityGuard) {
        let mut published = self.published.write().await;
        if guard.state.status == PresenceStatus::Offline {
            published.remove(&guard.user_id);
        } else {
            published.insert(guard.user_id, view_of(guard.user_id, &guard.state));
        }
    }

    /// Mirror the state to durable storage. A storage outage never blocks
    /// the in-memory transition.
    async fn persist(&self, guard: &IdentityGuard) {
        let record = PresenceRecord {
            user_id: guard.user_id,
            status: guard.state.status,
            message: guard.state.message.clone(),
            room_id: guard.state.room.clone(),
        };

        let strategy = ExponentialBackoff::from_millis(PERSIST_BASE_DELAY_MS)
            .max_delay(PERSIST_MAX_DELAY)
            .take(PERSIST_RETRIES)
            .map(jitter);

        if let Err(e) = Retry::spawn(strategy, || self.store.save_presence(&record)).await {
            tracing::error!(
                error = %e,
                user_id = %record.user_id,
                status = %record.status,
                "Failed to persist presence"
            );
        }
    }

    /// Current state of one identity
    pub async fn presence_of(&self, user_id: &UserId) -> PresenceView {
        let published = self.published.read().await;
        published.get(user_id).cloned().unwrap_or(PresenceView {
            id: *user_id,
            status: PresenceStatus::Offline,
            message: None,
            room_id: None,
        })
    }

    /// Every identity that is not offline
    pub async fn snapshot(&self) -> Vec<PresenceView> {
        self.published.read().await.values().cloned().collect()
    }
}

fn view_of(user_id: UserId, state: &IdentityState) -> PresenceView {
    PresenceView {
        id: user_id,
        status: state.status,
        message: state.message.clone(),
        room_id: state.room.clone(),
    }
}
