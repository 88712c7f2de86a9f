//! Application state

use std::sync::Arc;

use huddle_shared::PresenceStore;

use crate::auth::CredentialVerifier;
use crate::config::Config;
use crate::websocket::Coordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Coordinator,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub store: Arc<dyn PresenceStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PresenceStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let coordinator = Coordinator::new(Arc::clone(&store), config.strict_call_sessions);
        Self {
            config: Arc::new(config),
            coordinator,
            verifier,
            store,
        }
    }
}
