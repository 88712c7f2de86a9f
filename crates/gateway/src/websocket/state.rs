//! Coordinator state
//!
//! Wires the registry, dispatcher, presence controller, admission manager
//! and call relay together. Every component receives the same registry
//! instance explicitly; there is no process-wide map.

use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use huddle_shared::{PresenceStore, RoomId, UserId};

use super::admission::RoomAdmissionManager;
use super::connection::Connection;
use super::dispatcher::Dispatcher;
use super::events::{ServerEvent, SessionEvent};
use super::presence::PresenceController;
use super::registry::ConnectionRegistry;
use super::signaling::CallRelay;
use crate::error::{CoordinatorError, CoordinatorResult};

/// Shared coordination state for all connections
#[derive(Clone)]
pub struct Coordinator {
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub presence: Arc<PresenceController>,
    pub rooms: Arc<RoomAdmissionManager>,
    pub calls: Arc<CallRelay>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn PresenceStore>, strict_call_sessions: bool) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
        let presence = Arc::new(PresenceController::new(
            Arc::clone(&dispatcher),
            Arc::clone(&store),
        ));
        let rooms = Arc::new(RoomAdmissionManager::new(
            Arc::clone(&presence),
            Arc::clone(&dispatcher),
            store,
        ));
        let calls = Arc::new(CallRelay::new(
            Arc::clone(&dispatcher),
            strict_call_sessions,
        ));

        Self {
            registry,
            dispatcher,
            presence,
            rooms,
            calls,
        }
    }

    /// Register an authenticated connection. The connection is acknowledged,
    /// brought into the registry, then sent the current presence snapshot.
    pub async fn open_connection(
        &self,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(user_id, sender));
        let _ = conn.send(
            SessionEvent::Connected {
                session_id: conn.session_id,
            }
            .into(),
        );

        self.presence.connect(Arc::clone(&conn)).await;

        let _ = conn.send(
            SessionEvent::PresenceSnapshot {
                users: self.presence.snapshot().await,
            }
            .into(),
        );

        conn
    }

    /// Tear down a connection (close frame, transport error or heartbeat
    /// timeout all end up here). Returns `true` if the identity went offline.
    pub async fn close_connection(&self, conn: &Connection) -> bool {
        self.presence
            .disconnect(conn.user_id, &conn.session_id, &self.rooms, &self.calls)
            .await
    }

    /// Follow a room's channel without occupying it
    pub async fn watch_room(
        &self,
        conn: Arc<Connection>,
        room_id: &RoomId,
    ) -> CoordinatorResult<()> {
        self.rooms.occupancy(room_id).await?;
        self.dispatcher.channels().join(room_id, conn).await;
        Ok(())
    }

    pub async fn unwatch_room(&self, conn: &Connection, room_id: &RoomId) {
        self.dispatcher.channels().leave(room_id, conn).await;
    }

    /// Direct chat: delivered to the target and echoed to the sender's tabs
    pub async fn send_chat(
        &self,
        from: UserId,
        target: UserId,
        content: String,
    ) -> CoordinatorResult<usize> {
        if content.trim().is_empty() {
            return Err(CoordinatorError::InvalidEvent(
                "chat content must not be empty".to_string(),
            ));
        }

        let event = SessionEvent::ChatMessage {
            from_id: from,
            target_id: target,
            content,
            sent_at: OffsetDateTime::now_utc(),
        };

        let delivered = self.dispatcher.to_identity(&target, event.clone()).await;
        if target != from {
            self.dispatcher.to_identity(&from, event).await;
        }

        match delivered {
            0 => Err(CoordinatorError::TargetUnreachable),
            n => Ok(n),
        }
    }

    /// Get statistics about the coordinator
    pub async fn get_stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            active_connections: self.registry.connection_count().await,
            online_identities: self.registry.online_identities().await.len(),
            loaded_rooms: self.rooms.loaded_room_count().await,
            active_room_channels: self.dispatcher.channels().get_room_count().await,
            active_calls: self.calls.active_sessions().await,
        }
    }
}

/// Statistics about live coordination state
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CoordinatorStats {
    pub active_connections: usize,
    pub online_identities: usize,
    pub loaded_rooms: usize,
    pub active_room_channels: usize,
    pub active_calls: usize,
}
