//! Room state manager — the in-memory counter map and its persistence.
//!
//! DESIGN
//! ======
//! The counter map is a write-through cache: storage is the single source of
//! truth, reloaded by `initialize` on every actor activation, and the whole
//! map is persisted synchronously after every applied mutation. Counts are
//! clamped to `[0, MAX_COUNT]`; a delta against a name outside the current
//! map is a silent no-op (the vocabulary is fixed, counters are never created
//! dynamically).
//!
//! ERROR HANDLING
//! ==============
//! Storage failures propagate. During `initialize` that fails the activation
//! (the hosting runtime retries on the next event); during `apply_delta` the
//! caller logs and skips the broadcast for that mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::protocol::{MAX_COUNT, Reaction};
use crate::storage::{RoomStorage, StorageError};
use crate::vocab::Vocabulary;

/// Which way a delta moves a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increment,
    Decrement,
}

/// Per-room counter state. Owned by the room actor; never shared.
pub struct RoomState {
    room_id: String,
    counts: BTreeMap<String, u8>,
    storage: Arc<dyn RoomStorage>,
    vocab: Arc<dyn Vocabulary>,
}

impl RoomState {
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        storage: Arc<dyn RoomStorage>,
        vocab: Arc<dyn Vocabulary>,
    ) -> Self {
        Self { room_id: room_id.into(), counts: BTreeMap::new(), storage, vocab }
    }

    /// Load the persisted map, seeding it from the vocabulary catalog on
    /// first activation. Idempotent; called on every (re)activation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the load, the decode of a persisted value,
    /// or the seed write fails.
    pub async fn initialize(&mut self) -> Result<(), StorageError> {
        match self.storage.get(&self.room_id).await? {
            Some(value) => {
                self.counts = serde_json::from_value(value)?;
            }
            None => {
                self.counts = self
                    .vocab
                    .catalog()
                    .iter()
                    .filter(|name| self.vocab.is_valid_name(name.as_str()))
                    .map(|name| (name.clone(), 0))
                    .collect();
                self.persist().await?;
                info!(room_id = %self.room_id, reactions = self.counts.len(), "seeded room state");
            }
        }
        Ok(())
    }

    /// Current snapshot in stable (name) order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Reaction> {
        self.counts
            .iter()
            .map(|(name, count)| Reaction { name: name.clone(), count: *count })
            .collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Reaction> {
        self.counts.get(name).map(|count| Reaction { name: name.to_string(), count: *count })
    }

    /// Apply one clamped step to a counter and persist the whole map.
    ///
    /// Returns `false` without touching storage when `name` is not in the
    /// map. A step that clamps onto the same value (decrement at 0,
    /// increment at the cap) still counts as applied: it persists and the
    /// caller broadcasts it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write-through fails. The in-memory
    /// count has already moved by then; clients converge on the next
    /// successful broadcast.
    pub async fn apply_delta(&mut self, name: &str, direction: Direction) -> Result<bool, StorageError> {
        let Some(count) = self.counts.get_mut(name) else {
            return Ok(false);
        };

        *count = match direction {
            Direction::Increment => count.saturating_add(1).min(MAX_COUNT),
            Direction::Decrement => count.saturating_sub(1),
        };

        self.persist().await?;
        Ok(true)
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let value = serde_json::to_value(&self.counts)?;
        self.storage.put(&self.room_id, value).await
    }
}

#[cfg(test)]
#[path = "reactions_test.rs"]
mod tests;
