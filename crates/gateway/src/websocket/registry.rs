//! Connection registry
//!
//! Maps each identity to the set of its live connections. An identity is
//! reachable exactly when its set is non-empty.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use huddle_shared::UserId;

use super::connection::Connection;

/// Identity -> live connections, keyed by session ID
#[derive(Default)]
pub struct ConnectionRegistry {
    identities: RwLock<HashMap<UserId, HashMap<Uuid, Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `true` if it is the identity's first.
    pub async fn register(&self, conn: Arc<Connection>) -> bool {
        let mut identities = self.identities.write().await;
        let sessions = identities.entry(conn.user_id).or_default();
        let first = sessions.is_empty();
        sessions.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            user_connections = sessions.len(),
            "WebSocket connection added"
        );

        first
    }

    /// Remove a connection. Returns `true` if the identity has no
    /// connections left. Removing an unknown session returns `false`.
    pub async fn unregister(&self, user_id: &UserId, session_id: &Uuid) -> bool {
        let mut identities = self.identities.write().await;
        let Some(sessions) = identities.get_mut(user_id) else {
            return false;
        };
        if sessions.remove(session_id).is_none() {
            return false;
        }

        let remaining = sessions.len();
        if remaining == 0 {
            identities.remove(user_id);
        }

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            remaining_connections = remaining,
            "WebSocket connection removed"
        );

        remaining == 0
    }

    /// Get all connections for a specific user
    pub async fn connections_of(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        let identities = self.identities.read().await;
        identities
            .get(user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every live connection
    pub async fn all_connections(&self) -> Vec<Arc<Connection>> {
        let identities = self.identities.read().await;
        identities
            .values()
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.identities.read().await.contains_key(user_id)
    }

    pub async fn online_identities(&self) -> Vec<UserId> {
        self.identities.read().await.keys().copied().collect()
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let identities = self.identities.read().await;
        identities.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection(user_id: UserId) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Connection::new(user_id, tx))
    }

    #[tokio::test]
    async fn test_first_and_last_connection_reported() {
        let registry = ConnectionRegistry::new();
        let user_id = UserId::new();
        let tab1 = connection(user_id);
        let tab2 = connection(user_id);

        assert!(registry.register(Arc::clone(&tab1)).await);
        assert!(!registry.register(Arc::clone(&tab2)).await);
        assert_eq!(registry.connection_count().await, 2);

        assert!(!registry.unregister(&user_id, &tab1.session_id).await);
        assert!(registry.is_online(&user_id).await);

        assert!(registry.unregister(&user_id, &tab2.session_id).await);
        assert!(!registry.is_online(&user_id).await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_session_is_noop() {
        let registry = ConnectionRegistry::new();
        let user_id = UserId::new();
        let tab = connection(user_id);
        registry.register(Arc::clone(&tab)).await;

        assert!(!registry.unregister(&user_id, &Uuid::new_v4()).await);
        assert!(!registry.unregister(&UserId::new(), &tab.session_id).await);
        assert!(registry.is_online(&user_id).await);

        // Second removal of the same session must not report "empty" again
        assert!(registry.unregister(&user_id, &tab.session_id).await);
        assert!(!registry.unregister(&user_id, &tab.session_id).await);
    }

    #[tokio::test]
    async fn test_connections_of_is_per_identity() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new();
        let bob = UserId::new();

        registry.register(connection(alice)).await;
        registry.register(connection(alice)).await;
        registry.register(connection(bob)).await;

        assert_eq!(registry.connections_of(&alice).await.len(), 2);
        assert_eq!(registry.connections_of(&bob).await.len(), 1);
        assert_eq!(registry.all_connections().await.len(), 3);
        assert_eq!(registry.online_identities().await.len(), 2);
    }
}
