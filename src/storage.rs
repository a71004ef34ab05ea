//! Persistence adapter — durable room state plus the durable alarm.
//!
//! DESIGN
//! ======
//! Rooms depend on this contract, never on a concrete store: one opaque JSON
//! value per room under a single key, and one pending alarm entry per room.
//! The alarm is a one-shot timer; [`RoomStorage::take_due_alarms`] claims due
//! entries atomically so the dispatcher fires each one exactly once, and the
//! tick handler re-arms the next one.
//!
//! `PgStorage` is the production implementation. `MemStorage` backs local
//! development (no `DATABASE_URL`) and the test suite; it is not durable
//! across process restarts, which is the whole point of the Postgres one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Store contract for room state and liveness alarms.
#[async_trait]
pub trait RoomStorage: Send + Sync {
    /// Fetch the persisted state value for a room, if any.
    async fn get(&self, room_id: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Write-through the full state value for a room.
    async fn put(&self, room_id: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// The room's pending alarm fire time (epoch ms), if one is scheduled.
    async fn alarm(&self, room_id: &str) -> Result<Option<i64>, StorageError>;

    /// Schedule (or replace) the room's one-shot alarm.
    async fn schedule_alarm(&self, room_id: &str, fire_at_ms: i64) -> Result<(), StorageError>;

    /// Drop the room's pending alarm, if any.
    async fn cancel_alarm(&self, room_id: &str) -> Result<(), StorageError>;

    /// Claim every alarm due at or before `now_ms`. Claimed alarms are
    /// removed; the caller owns firing them.
    async fn take_due_alarms(&self, now_ms: i64) -> Result<Vec<String>, StorageError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

/// Postgres-backed store. Tables are created by `src/db/migrations`.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomStorage for PgStorage {
    async fn get(&self, room_id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT state FROM room_state WHERE room_id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, room_id: &str, value: serde_json::Value) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO room_state (room_id, state, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (room_id) DO UPDATE SET state = EXCLUDED.state, updated_at = now()",
        )
        .bind(room_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn alarm(&self, room_id: &str) -> Result<Option<i64>, StorageError> {
        let fire_at: Option<i64> =
            sqlx::query_scalar("SELECT fire_at_ms FROM room_alarms WHERE room_id = $1")
                .bind(room_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(fire_at)
    }

    async fn schedule_alarm(&self, room_id: &str, fire_at_ms: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO room_alarms (room_id, fire_at_ms) VALUES ($1, $2) \
             ON CONFLICT (room_id) DO UPDATE SET fire_at_ms = EXCLUDED.fire_at_ms",
        )
        .bind(room_id)
        .bind(fire_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_alarm(&self, room_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM room_alarms WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take_due_alarms(&self, now_ms: i64) -> Result<Vec<String>, StorageError> {
        let rooms: Vec<String> =
            sqlx::query_scalar("DELETE FROM room_alarms WHERE fire_at_ms <= $1 RETURNING room_id")
                .bind(now_ms)
                .fetch_all(&self.pool)
                .await?;
        Ok(rooms)
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// In-memory store for development and tests.
#[derive(Default)]
pub struct MemStorage {
    state: Mutex<HashMap<String, serde_json::Value>>,
    alarms: Mutex<HashMap<String, i64>>,
}

impl MemStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStorage for MemStorage {
    async fn get(&self, room_id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.state.lock().expect("state lock").get(room_id).cloned())
    }

    async fn put(&self, room_id: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.state.lock().expect("state lock").insert(room_id.to_string(), value);
        Ok(())
    }

    async fn alarm(&self, room_id: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.alarms.lock().expect("alarms lock").get(room_id).copied())
    }

    async fn schedule_alarm(&self, room_id: &str, fire_at_ms: i64) -> Result<(), StorageError> {
        self.alarms.lock().expect("alarms lock").insert(room_id.to_string(), fire_at_ms);
        Ok(())
    }

    async fn cancel_alarm(&self, room_id: &str) -> Result<(), StorageError> {
        self.alarms.lock().expect("alarms lock").remove(room_id);
        Ok(())
    }

    async fn take_due_alarms(&self, now_ms: i64) -> Result<Vec<String>, StorageError> {
        let mut alarms = self.alarms.lock().expect("alarms lock");
        let due: Vec<String> = alarms
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now_ms)
            .map(|(room, _)| room.clone())
            .collect();
        for room in &due {
            alarms.remove(room);
        }
        Ok(due)
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
