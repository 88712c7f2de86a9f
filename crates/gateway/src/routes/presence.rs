//! Presence snapshot over HTTP

use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::AuthenticatedIdentity;
use crate::state::AppState;
use crate::websocket::events::PresenceView;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub users: Vec<PresenceView>,
}

/// Every identity that is not offline
pub async fn list_presence(
    State(state): State<AppState>,
    _caller: AuthenticatedIdentity,
) -> Json<PresenceResponse> {
    let mut users = state.coordinator.presence.snapshot().await;
    users.sort_by_key(|u| u.id);
    Json(PresenceResponse { users })
}
