//! Room notification channels
//!
//! Ephemeral pub/sub per room. Subscription is independent of formal
//! occupancy: occupants are subscribed on admission, and any connection may
//! watch a room it does not occupy.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use huddle_shared::RoomId;

use super::connection::Connection;
use super::events::ServerEvent;

/// Manages room channels for broadcasting events
#[derive(Default)]
pub struct RoomChannels {
    /// Map of room_id -> subscribed connections
    rooms: RwLock<HashMap<RoomId, Vec<Arc<Connection>>>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room channel (no-op if already subscribed)
    pub async fn join(&self, room_id: &RoomId, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let conns = rooms.entry(room_id.clone()).or_default();
        if conns.iter().any(|c| c.session_id == conn.session_id) {
            return;
        }
        conns.push(Arc::clone(&conn));
        let room_size = conns.len();
        drop(rooms);

        conn.subscribe(room_id.clone()).await;
        tracing::debug!(
            room_id = %room_id,
            session_id = %conn.session_id,
            room_size,
            "Connection joined room channel"
        );
    }

    /// Remove a connection from a room channel
    pub async fn leave(&self, room_id: &RoomId, conn: &Connection) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(room_id) {
            conns.retain(|c| c.session_id != conn.session_id);

            // Clean up empty channels
            if conns.is_empty() {
                rooms.remove(room_id);
                tracing::debug!(room_id = %room_id, "Removed empty room channel");
            }
        }
        drop(rooms);

        conn.unsubscribe(room_id).await;
    }

    /// Broadcast an event to all connections in a room channel.
    /// Returns the number of connections that accepted the event.
    ///
    /// Silently ignores send errors (closed connections will be cleaned up)
    pub async fn broadcast(&self, room_id: &RoomId, event: &ServerEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(room_id) else {
            tracing::debug!(
                room_id = %room_id,
                event_type = event.name(),
                "No subscribers for room channel"
            );
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;
        for conn in conns {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room_id = %room_id,
            event_type = event.name(),
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room channel"
        );

        success_count
    }

    /// Remove a connection from all room channels
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.session_id != *session_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                room_count = removed_from,
                "Removed connection from room channels"
            );
        }
    }

    /// Number of connections subscribed to a room channel
    pub async fn get_room_size(&self, room_id: &RoomId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(Vec::len).unwrap_or(0)
    }

    /// Number of rooms with at least one subscriber
    pub async fn get_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
