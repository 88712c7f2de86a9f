//! WebSocket event types and serialization
//!
//! Every event is a JSON object discriminated by its `type` field. Events are
//! grouped into closed families (session, presence, room, call, signaling) so
//! that adding an event kind is a compile-time change.

use huddle_shared::{PresenceStatus, RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ClientEvent {
    Session(SessionCommand),
    Presence(PresenceCommand),
    Room(RoomCommand),
    Call(CallCommand),
    Signal(SignalCommand),
}

/// Connection-level commands
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Heartbeat ping to keep connection alive
    Ping,

    /// Follow a room's notification channel without occupying it
    #[serde(rename_all = "camelCase")]
    RoomWatch { room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    RoomUnwatch { room_id: RoomId },

    /// Direct chat message to another identity
    #[serde(rename_all = "camelCase")]
    ChatSend { target_id: UserId, content: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceCommand {
    StatusChange {
        status: PresenceStatus,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomCommand {
    #[serde(rename_all = "camelCase")]
    RoomJoin { room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    RoomLeave { room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    RoomKnock { room_id: RoomId },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallCommand {
    #[serde(rename_all = "camelCase")]
    CallInitiate { target_id: UserId, kind: CallKind },

    #[serde(rename_all = "camelCase")]
    CallAccept { caller_id: UserId },

    #[serde(rename_all = "camelCase")]
    CallReject { caller_id: UserId },

    #[serde(rename_all = "camelCase")]
    CallEnd { participant_ids: Vec<UserId> },
}

/// WebRTC negotiation payloads, relayed verbatim
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalCommand {
    #[serde(rename_all = "camelCase")]
    SignalOffer { target_id: UserId, payload: Value },

    #[serde(rename_all = "camelCase")]
    SignalAnswer { target_id: UserId, payload: Value },

    #[serde(rename_all = "camelCase")]
    SignalIce { target_id: UserId, payload: Value },
}

/// Media kind requested for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Audio,
    Video,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ServerEvent {
    Session(SessionEvent),
    Presence(PresenceEvent),
    Room(RoomEvent),
    Call(CallEvent),
    Signal(SignalEvent),
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection acknowledged
    #[serde(rename_all = "camelCase")]
    Connected { session_id: Uuid },

    /// Heartbeat response
    Pong,

    /// Error for the requesting connection only
    Error { code: String, message: String },

    /// Presence of every reachable identity (sent on initial connection)
    PresenceSnapshot { users: Vec<PresenceView> },

    #[serde(rename_all = "camelCase")]
    ChatMessage {
        from_id: UserId,
        target_id: UserId,
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        sent_at: OffsetDateTime,
    },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    UserOnline {
        id: UserId,
    },

    UserOffline {
        id: UserId,
    },

    #[serde(rename_all = "camelCase")]
    UserStatusChanged {
        id: UserId,
        status: PresenceStatus,
        message: Option<String>,
        room_id: Option<RoomId>,
    },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    #[serde(rename_all = "camelCase")]
    RoomUserJoined { room_id: RoomId, id: UserId },

    #[serde(rename_all = "camelCase")]
    RoomUserLeft { room_id: RoomId, id: UserId },

    #[serde(rename_all = "camelCase")]
    RoomKnocked { room_id: RoomId, user: UserId },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    #[serde(rename_all = "camelCase")]
    CallIncoming { from_id: UserId, kind: CallKind },

    #[serde(rename_all = "camelCase")]
    CallAccepted { from_id: UserId },

    #[serde(rename_all = "camelCase")]
    CallRejected { from_id: UserId },

    #[serde(rename_all = "camelCase")]
    CallEnded { from_id: UserId, reason: EndReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A participant hung up
    Hangup,
    /// A participant went offline mid-call
    Abandoned,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalEvent {
    #[serde(rename_all = "camelCase")]
    SignalOffer { from_id: UserId, payload: Value },

    #[serde(rename_all = "camelCase")]
    SignalAnswer { from_id: UserId, payload: Value },

    #[serde(rename_all = "camelCase")]
    SignalIce { from_id: UserId, payload: Value },
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// One identity's presence as shown to clients
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub id: UserId,
    pub status: PresenceStatus,
    pub message: Option<String>,
    pub room_id: Option<RoomId>,
}

impl ServerEvent {
    /// Wire name of the event, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Session(e) => match e {
                SessionEvent::Connected { .. } => "connected",
                SessionEvent::Pong => "pong",
                SessionEvent::Error { .. } => "error",
                SessionEvent::PresenceSnapshot { .. } => "presence_snapshot",
                SessionEvent::ChatMessage { .. } => "chat_message",
            },
            ServerEvent::Presence(e) => match e {
                PresenceEvent::UserOnline { .. } => "user_online",
                PresenceEvent::UserOffline { .. } => "user_offline",
                PresenceEvent::UserStatusChanged { .. } => "user_status_changed",
            },
            ServerEvent::Room(e) => match e {
                RoomEvent::RoomUserJoined { .. } => "room_user_joined",
                RoomEvent::RoomUserLeft { .. } => "room_user_left",
                RoomEvent::RoomKnocked { .. } => "room_knocked",
            },
            ServerEvent::Call(e) => match e {
                CallEvent::CallIncoming { .. } => "call_incoming",
                CallEvent::CallAccepted { .. } => "call_accepted",
                CallEvent::CallRejected { .. } => "call_rejected",
                CallEvent::CallEnded { .. } => "call_ended",
            },
            ServerEvent::Signal(e) => match e {
                SignalEvent::SignalOffer { .. } => "signal_offer",
                SignalEvent::SignalAnswer { .. } => "signal_answer",
                SignalEvent::SignalIce { .. } => "signal_ice",
            },
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Session(SessionEvent::Error {
            code: code.to_string(),
            message: message.into(),
        })
    }
}

impl From<SessionEvent> for ServerEvent {
    fn from(event: SessionEvent) -> Self {
        ServerEvent::Session(event)
    }
}

impl From<PresenceEvent> for ServerEvent {
    fn from(event: PresenceEvent) -> Self {
        ServerEvent::Presence(event)
    }
}

impl From<RoomEvent> for ServerEvent {
    fn from(event: RoomEvent) -> Self {
        ServerEvent::Room(event)
    }
}

impl From<CallEvent> for ServerEvent {
    fn from(event: CallEvent) -> Self {
        ServerEvent::Call(event)
    }
}

impl From<SignalEvent> for ServerEvent {
    fn from(event: SignalEvent) -> Self {
        ServerEvent::Signal(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_join_deserialization() {
        let json = r#"{"type":"room_join","roomId":"war-room"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Room(RoomCommand::RoomJoin { room_id }) => {
                assert_eq!(room_id, RoomId::from("war-room"));
            }
            other => panic!("Expected RoomJoin, got {:?}", other),
        }
    }

    #[test]
    fn test_status_change_deserialization() {
        let json = r#"{"type":"status_change","status":"busy","message":"focus time"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Presence(PresenceCommand::StatusChange { status, message }) => {
                assert_eq!(status, PresenceStatus::Busy);
                assert_eq!(message.as_deref(), Some("focus time"));
            }
            other => panic!("Expected StatusChange, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let json = r#"{"type":"status_change","status":"napping"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let json = r#"{"type":"room_teleport","roomId":"war-room"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_signal_payload_kept_verbatim() {
        let target = Uuid::new_v4();
        let json = json!({
            "type": "signal_offer",
            "targetId": target,
            "payload": {"sdp": "v=0\r\no=- 42 2 IN IP4 127.0.0.1", "extra": [1, 2, 3]}
        });
        let event: ClientEvent = serde_json::from_value(json).unwrap();
        match event {
            ClientEvent::Signal(SignalCommand::SignalOffer { target_id, payload }) => {
                assert_eq!(target_id, UserId(target));
                assert_eq!(payload["extra"], json!([1, 2, 3]));
            }
            other => panic!("Expected SignalOffer, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_deserialization() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Session(SessionCommand::Ping)));
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::from(SessionEvent::Pong);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_room_event_uses_camel_case_fields() {
        let id = UserId::new();
        let event = ServerEvent::from(RoomEvent::RoomUserJoined {
            room_id: RoomId::from("war-room"),
            id,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "room_user_joined");
        assert_eq!(value["roomId"], "war-room");
        assert_eq!(value["id"], json!(id));
        assert_eq!(event.name(), "room_user_joined");
    }

    #[test]
    fn test_status_changed_serialization() {
        let event = ServerEvent::from(PresenceEvent::UserStatusChanged {
            id: UserId::new(),
            status: PresenceStatus::InMeeting,
            message: None,
            room_id: Some(RoomId::from("war-room")),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user_status_changed");
        assert_eq!(value["status"], "in_meeting");
        assert_eq!(value["roomId"], "war-room");
    }
}
