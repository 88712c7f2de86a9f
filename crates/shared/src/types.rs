//! Common types used across Huddle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User (identity) ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Room ID wrapper
///
/// Rooms are addressed by their slug (e.g. `war-room`), which is what the
/// office layout and clients refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Presence status of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Offline,
    Online,
    Away,
    Busy,
    InMeeting,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Offline => "offline",
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
            PresenceStatus::InMeeting => "in_meeting",
        }
    }

    /// Whether a client may request this status directly.
    ///
    /// `offline` follows the connection set and `in_meeting` follows room
    /// admission, so neither can be chosen explicitly.
    pub fn is_selectable(&self) -> bool {
        matches!(
            self,
            PresenceStatus::Online | PresenceStatus::Away | PresenceStatus::Busy
        )
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(PresenceStatus::Offline),
            "online" => Ok(PresenceStatus::Online),
            "away" => Ok(PresenceStatus::Away),
            "busy" => Ok(PresenceStatus::Busy),
            "in_meeting" => Ok(PresenceStatus::InMeeting),
            _ => Err(format!("Invalid presence status: {}", s)),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Room definition as stored durably
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDefinition {
    pub id: RoomId,
    pub name: String,
    /// Maximum number of simultaneous occupants (always positive)
    pub capacity: u32,
    /// Restricted rooms are entered by invitation; outsiders knock
    pub restricted: bool,
}

/// Transient presence fields mirrored to durable storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub status: PresenceStatus,
    pub message: Option<String>,
    pub room_id: Option<RoomId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_status_round_trips_through_str() {
        for status in [
            PresenceStatus::Offline,
            PresenceStatus::Online,
            PresenceStatus::Away,
            PresenceStatus::Busy,
            PresenceStatus::InMeeting,
        ] {
            assert_eq!(status.as_str().parse::<PresenceStatus>(), Ok(status));
        }
        assert!("sleeping".parse::<PresenceStatus>().is_err());
    }

    #[test]
    fn test_selectable_statuses() {
        assert!(PresenceStatus::Away.is_selectable());
        assert!(PresenceStatus::Busy.is_selectable());
        assert!(PresenceStatus::Online.is_selectable());
        assert!(!PresenceStatus::Offline.is_selectable());
        assert!(!PresenceStatus::InMeeting.is_selectable());
    }

    #[test]
    fn test_presence_status_serializes_snake_case() {
        let json = serde_json::to_string(&PresenceStatus::InMeeting).unwrap();
        assert_eq!(json, r#""in_meeting""#);
    }

    #[test]
    fn test_room_id_is_transparent() {
        let json = serde_json::to_string(&RoomId::from("war-room")).unwrap();
        assert_eq!(json, r#""war-room""#);
    }
}
