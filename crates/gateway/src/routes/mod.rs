//! API routes

pub mod health;
pub mod presence;
pub mod rooms;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health/stats", get(health::stats));

    // Authenticated API routes - under /api/v1
    let api_routes = Router::new()
        .route("/rooms/:room_id", get(rooms::get_room))
        .route("/rooms/:room_id/join", post(rooms::join_room))
        .route("/rooms/:room_id/leave", post(rooms::leave_room))
        .route("/rooms/:room_id/knock", post(rooms::knock_room))
        .route("/presence", get(presence::list_presence))
        // WebSocket (authenticates via token query parameter or Bearer header)
        .route("/ws", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use huddle_shared::{MemoryStore, RoomDefinition, RoomId, UserId};

    use crate::auth::{AuthenticatedIdentity, CredentialVerifier, JwtError};
    use crate::config::Config;
    use crate::state::AppState;

    /// Accepts tokens of the form `<role>:<uuid>`
    pub(crate) struct StubVerifier;

    impl CredentialVerifier for StubVerifier {
        fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, JwtError> {
            let (role, id) = token.split_once(':').ok_or(JwtError::Invalid)?;
            let user_id = id.parse().map_err(|_| JwtError::Invalid)?;
            Ok(AuthenticatedIdentity {
                user_id: UserId(user_id),
                role: role.to_string(),
            })
        }
    }

    pub(crate) fn bearer(role: &str, user_id: UserId) -> String {
        format!("Bearer {}:{}", role, user_id)
    }

    pub(crate) fn app_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_rooms([
            RoomDefinition {
                id: RoomId::from("war-room"),
                name: "War Room".to_string(),
                capacity: 2,
                restricted: false,
            },
            RoomDefinition {
                id: RoomId::from("ceo-office"),
                name: "CEO Office".to_string(),
                capacity: 4,
                restricted: true,
            },
        ]));
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            cors_allowed_origins: Vec::new(),
            database_url: "postgres://unused".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-jwt-secret-must-be-at-least-32-characters-long".to_string(),
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            strict_call_sessions: false,
        };
        let state = AppState::new(config, store.clone(), Arc::new(StubVerifier));
        (state, store)
    }
}
