//! WebSocket connection management
//!
//! Represents one live transport session of an authenticated identity, with
//! its room channel subscriptions and liveness clock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use huddle_shared::{RoomId, UserId};

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Authenticated user ID
    pub user_id: UserId,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Room channels this connection listens to
    pub subscriptions: RwLock<HashSet<RoomId>>,

    connected_at: Instant,
    /// Milliseconds after `connected_at` at which a frame was last received
    last_seen_ms: AtomicU64,
}

impl Connection {
    /// Create a new connection
    pub fn new(user_id: UserId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            sender,
            subscriptions: RwLock::new(HashSet::new()),
            connected_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Record that the peer is alive
    pub fn touch(&self) {
        let elapsed = self.connected_at.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last frame was received
    pub fn idle_for(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.connected_at.elapsed().saturating_sub(last_seen)
    }

    /// Record a room channel subscription
    pub async fn subscribe(&self, room_id: RoomId) {
        tracing::debug!(
            session_id = %self.session_id,
            room_id = %room_id,
            "Subscribed to room channel"
        );
        self.subscriptions.write().await.insert(room_id);
    }

    /// Drop a room channel subscription
    pub async fn unsubscribe(&self, room_id: &RoomId) {
        let mut subs = self.subscriptions.write().await;
        if subs.remove(room_id) {
            tracing::debug!(
                session_id = %self.session_id,
                room_id = %room_id,
                "Unsubscribed from room channel"
            );
        }
    }

    /// Check if subscribed to a room channel
    pub async fn is_subscribed(&self, room_id: &RoomId) -> bool {
        self.subscriptions.read().await.contains(room_id)
    }

    /// Get all room channel subscriptions
    pub async fn get_subscriptions(&self) -> HashSet<RoomId> {
        self.subscriptions.read().await.clone()
    }
}
