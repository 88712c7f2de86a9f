//! Persistence seam for room definitions and identity presence
//!
//! The coordinator owns transient presence and occupancy in memory; storage
//! only supplies room definitions and mirrors presence for REST readers.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{HuddleError, HuddleResult};
use crate::types::{PresenceRecord, PresenceStatus, RoomDefinition, RoomId, UserId};

/// Durable storage consumed by the coordinator
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Look up a room definition; `None` if the room does not exist
    async fn load_room(&self, room_id: &RoomId) -> HuddleResult<Option<RoomDefinition>>;

    /// Persist the transient presence fields of one identity
    async fn save_presence(&self, record: &PresenceRecord) -> HuddleResult<()>;

    /// Mark every identity offline and clear room back-references.
    /// Returns the number of identities touched.
    async fn reset_all_presence(&self) -> HuddleResult<u64>;

    /// Cheap round trip used by readiness probes
    async fn health_check(&self) -> HuddleResult<()>;
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: String,
    name: String,
    capacity: i32,
    is_restricted: bool,
}

#[async_trait]
impl PresenceStore for PgStore {
    async fn load_room(&self, room_id: &RoomId) -> HuddleResult<Option<RoomDefinition>> {
        let row = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT id, name, capacity, is_restricted
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(room_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let capacity = u32::try_from(row.capacity)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                HuddleError::Validation(format!(
                    "room {} has non-positive capacity {}",
                    row.id, row.capacity
                ))
            })?;

        Ok(Some(RoomDefinition {
            id: RoomId(row.id),
            name: row.name,
            capacity,
            restricted: row.is_restricted,
        }))
    }

    async fn save_presence(&self, record: &PresenceRecord) -> HuddleResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
              presence_status = $2,
              status_message = $3,
              current_room_id = $4,
              updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record.user_id.0)
        .bind(record.status.as_str())
        .bind(record.message.as_deref())
        .bind(record.room_id.as_ref().map(RoomId::as_str))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_all_presence(&self) -> HuddleResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
              presence_status = 'offline',
              current_room_id = NULL,
              updated_at = NOW()
            WHERE presence_status <> 'offline' OR current_room_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> HuddleResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory store for tests and single-node development
#[derive(Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<RoomId, RoomDefinition>>,
    presence: RwLock<HashMap<UserId, PresenceRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with room definitions
    pub fn with_rooms(rooms: impl IntoIterator<Item = RoomDefinition>) -> Self {
        let map = rooms.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            rooms: RwLock::new(map),
            ..Self::default()
        }
    }

    pub async fn add_room(&self, room: RoomDefinition) {
        self.rooms.write().await.insert(room.id.clone(), room);
    }

    /// Seed a presence row, e.g. a stale status left by a previous process
    pub async fn seed_presence(&self, record: PresenceRecord) {
        self.presence.write().await.insert(record.user_id, record);
    }

    pub async fn presence_of(&self, user_id: &UserId) -> Option<PresenceRecord> {
        self.presence.read().await.get(user_id).cloned()
    }

    /// Make every subsequent write fail (storage outage)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn load_room(&self, room_id: &RoomId) -> HuddleResult<Option<RoomDefinition>> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }

    async fn save_presence(&self, record: &PresenceRecord) -> HuddleResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HuddleError::Storage("write rejected".to_string()));
        }
        self.presence
            .write()
            .await
            .insert(record.user_id, record.clone());
        Ok(())
    }

    async fn reset_all_presence(&self) -> HuddleResult<u64> {
        let mut presence = self.presence.write().await;
        let mut touched = 0;
        for record in presence.values_mut() {
            if record.status != PresenceStatus::Offline || record.room_id.is_some() {
                record.status = PresenceStatus::Offline;
                record.room_id = None;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn health_check(&self) -> HuddleResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HuddleError::Storage("store unavailable".to_string()));
        }
        Ok(())
    }
}
