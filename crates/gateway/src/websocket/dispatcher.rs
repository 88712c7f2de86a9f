//! Broadcast dispatcher
//!
//! Fire-and-forget fan-out in three modes: every connection, every
//! connection of one identity, or every subscriber of a room channel.
//! Nothing is buffered for absent targets and nothing is retried.

use std::sync::Arc;

use huddle_shared::{RoomId, UserId};

use super::channels::RoomChannels;
use super::connection::Connection;
use super::events::ServerEvent;
use super::registry::ConnectionRegistry;

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    channels: RoomChannels,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            channels: RoomChannels::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &RoomChannels {
        &self.channels
    }

    /// Deliver to every connected identity
    pub async fn global(&self, event: impl Into<ServerEvent>) -> usize {
        let event = event.into();
        let delivered = send_all(&self.registry.all_connections().await, &event);
        tracing::debug!(
            event_type = event.name(),
            recipients = delivered,
            "Broadcast event to all connections"
        );
        delivered
    }

    /// Deliver to every connection of one identity
    pub async fn to_identity(&self, user_id: &UserId, event: impl Into<ServerEvent>) -> usize {
        let event = event.into();
        let delivered = send_all(&self.registry.connections_of(user_id).await, &event);
        if delivered == 0 {
            tracing::debug!(
                user_id = %user_id,
                event_type = event.name(),
                "No live connection for identity; event dropped"
            );
        }
        delivered
    }

    /// Deliver to every subscriber of a room channel
    pub async fn to_room(&self, room_id: &RoomId, event: impl Into<ServerEvent>) -> usize {
        self.channels.broadcast(room_id, &event.into()).await
    }

    /// Subscribe every connection of an identity to a room channel
    pub async fn subscribe_identity(&self, user_id: &UserId, room_id: &RoomId) {
        for conn in self.registry.connections_of(user_id).await {
            self.channels.join(room_id, conn).await;
        }
    }

    /// Unsubscribe every connection of an identity from a room channel
    pub async fn unsubscribe_identity(&self, user_id: &UserId, room_id: &RoomId) {
        for conn in self.registry.connections_of(user_id).await {
            self.channels.leave(room_id, &conn).await;
        }
    }
}

fn send_all(conns: &[Arc<Connection>], event: &ServerEvent) -> usize {
    let mut delivered = 0;
    for conn in conns {
        match conn.send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(_) => {
                tracing::warn!(
                    session_id = %conn.session_id,
                    "Failed to send event to connection (likely closed)"
                );
            }
        }
    }
    delivered
}
