//! Room admission over HTTP
//!
//! Same admission manager as the socket path, so capacity and single-room
//! occupancy hold whichever surface a request arrives on.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use huddle_shared::{RoomId, UserId};

use crate::auth::AuthenticatedIdentity;
use crate::error::{ApiResult, CoordinatorError};
use crate::state::AppState;
use crate::websocket::admission::JoinOutcome;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub restricted: bool,
    pub occupants: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub room_id: RoomId,
    pub already_inside: bool,
    /// Room released by this move, if any
    pub left: Option<RoomId>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    /// Identity to remove; defaults to the caller. Admin only when different.
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub room_id: RoomId,
    pub user_id: UserId,
    /// False when the identity was not in the room
    pub left: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockResponse {
    pub room_id: RoomId,
    pub notified: usize,
}

/// Room definition and current occupants
pub async fn get_room(
    State(state): State<AppState>,
    _caller: AuthenticatedIdentity,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    let occupancy = state.coordinator.rooms.occupancy(&RoomId(room_id)).await?;

    Ok(Json(RoomResponse {
        id: occupancy.definition.id,
        name: occupancy.definition.name,
        capacity: occupancy.definition.capacity,
        restricted: occupancy.definition.restricted,
        occupants: occupancy.occupants,
    }))
}

/// Join a room; joining the room already occupied is a no-op
pub async fn join_room(
    State(state): State<AppState>,
    caller: AuthenticatedIdentity,
    Path(room_id): Path<String>,
) -> ApiResult<Json<JoinResponse>> {
    let room_id = RoomId(room_id);
    let outcome = state
        .coordinator
        .rooms
        .join(caller.user_id, &room_id)
        .await?;

    let (already_inside, left) = match outcome {
        JoinOutcome::Admitted { left } => (false, left),
        JoinOutcome::AlreadyInside => (true, None),
    };

    Ok(Json(JoinResponse {
        room_id,
        already_inside,
        left,
    }))
}

/// Leave a room, optionally on behalf of another identity (admin only)
pub async fn leave_room(
    State(state): State<AppState>,
    caller: AuthenticatedIdentity,
    Path(room_id): Path<String>,
    body: Option<Json<LeaveRequest>>,
) -> ApiResult<Json<LeaveResponse>> {
    let room_id = RoomId(room_id);
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let target = request.user_id.unwrap_or(caller.user_id);

    if target != caller.user_id && !caller.is_admin() {
        tracing::warn!(
            user_id = %caller.user_id,
            target_id = %target,
            room_id = %room_id,
            "Refused to remove another user from a room"
        );
        return Err(CoordinatorError::NotAuthorized.into());
    }

    let left = state.coordinator.rooms.leave(target, &room_id).await?;

    Ok(Json(LeaveResponse {
        room_id,
        user_id: target,
        left,
    }))
}

/// Notify a room's occupants that the caller wants in
pub async fn knock_room(
    State(state): State<AppState>,
    caller: AuthenticatedIdentity,
    Path(room_id): Path<String>,
) -> ApiResult<Json<KnockResponse>> {
    let room_id = RoomId(room_id);
    let notified = state
        .coordinator
        .rooms
        .knock(caller.user_id, &room_id)
        .await?;

    Ok(Json(KnockResponse { room_id, notified }))
}
