//! Hosting runtime — room registry, activation, and the transport-side
//! connection table.
//!
//! DESIGN
//! ======
//! Each room id maps to a [`RoomSlot`]. The slot splits ownership the way
//! the lifecycle demands it:
//!
//! - `connections` belongs to the transport layer. It survives the room
//!   actor hibernating, so attachments (and the sockets behind them) outlive
//!   any one actor incarnation.
//! - `actor` is the mailbox of the current actor incarnation, if one is
//!   running. Event delivery lazily (re)spawns the actor, which reloads its
//!   state from storage; in-memory room state never outlives the actor.
//!
//! Events for one room flow through one mpsc mailbox and are handled
//! sequentially, so room updates are linearizable without locks around the
//! counter map itself.
//!
//! ERROR HANDLING
//! ==============
//! Activation failure (storage down during initialize) drops the triggering
//! event with a warning; the next delivered event retries activation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

use crate::liveness::{self, Attachment};
use crate::protocol::{Message, Reaction};
use crate::room::RoomEvent;
use crate::storage::RoomStorage;
use crate::vocab::Vocabulary;

const MAILBOX_CAPACITY: usize = 256;
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_ROOM_IDLE_EVICT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room did not respond")]
    Unavailable,
}

/// Parse an environment variable, falling back to `default`.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TIMINGS
// =============================================================================

/// The tunable clocks: heartbeat cadence, eviction timeout, and how long an
/// idle actor lingers before hibernating.
#[derive(Debug, Clone, Copy)]
pub struct RoomTimings {
    pub heartbeat_interval_ms: i64,
    pub liveness_timeout_ms: i64,
    pub idle_evict_ms: u64,
}

impl RoomTimings {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            heartbeat_interval_ms: env_parse(
                "HEARTBEAT_INTERVAL_MS",
                liveness::DEFAULT_HEARTBEAT_INTERVAL_MS,
            ),
            liveness_timeout_ms: env_parse(
                "LIVENESS_TIMEOUT_MS",
                liveness::DEFAULT_LIVENESS_TIMEOUT_MS,
            ),
            idle_evict_ms: env_parse("ROOM_IDLE_EVICT_MS", DEFAULT_ROOM_IDLE_EVICT_MS),
        }
    }
}

impl Default for RoomTimings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: liveness::DEFAULT_HEARTBEAT_INTERVAL_MS,
            liveness_timeout_ms: liveness::DEFAULT_LIVENESS_TIMEOUT_MS,
            idle_evict_ms: DEFAULT_ROOM_IDLE_EVICT_MS,
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Transport handle for one websocket client: the outbound frame queue plus
/// the opaque attachment slot the liveness monitor reads and writes.
pub struct Connection {
    pub id: Uuid,
    pub tx: mpsc::Sender<Message>,
    attachment: Mutex<serde_json::Value>,
}

impl Connection {
    /// Register-time constructor. Stamps the attachment with an implicit
    /// first heartbeat so a brand-new connection survives the next sweep.
    #[must_use]
    pub fn new(id: Uuid, tx: mpsc::Sender<Message>, now_ms: i64) -> Self {
        Self { id, tx, attachment: Mutex::new(Attachment::stamped(now_ms).to_value()) }
    }

    #[must_use]
    pub fn read_attachment(&self) -> serde_json::Value {
        self.attachment.lock().map(|v| v.clone()).unwrap_or(serde_json::Value::Null)
    }

    pub fn write_attachment(&self, value: serde_json::Value) {
        if let Ok(mut slot) = self.attachment.lock() {
            *slot = value;
        }
    }
}

// =============================================================================
// SLOT + REGISTRY
// =============================================================================

/// One room's transport table and current actor mailbox.
pub struct RoomSlot {
    pub connections: RwLock<HashMap<Uuid, Connection>>,
    actor: tokio::sync::Mutex<Option<mpsc::Sender<RoomEvent>>>,
}

impl RoomSlot {
    fn new() -> Self {
        Self { connections: RwLock::new(HashMap::new()), actor: tokio::sync::Mutex::new(None) }
    }
}

/// Registry of all rooms this process is hosting.
pub struct Rooms {
    slots: RwLock<HashMap<String, Arc<RoomSlot>>>,
    storage: Arc<dyn RoomStorage>,
    vocab: Arc<dyn Vocabulary>,
    timings: RoomTimings,
}

impl Rooms {
    #[must_use]
    pub fn new(
        storage: Arc<dyn RoomStorage>,
        vocab: Arc<dyn Vocabulary>,
        timings: RoomTimings,
    ) -> Self {
        Self { slots: RwLock::new(HashMap::new()), storage, vocab, timings }
    }

    /// Register a connection with a room and hand the actor its connect
    /// event. The connection is visible to broadcasts from this point on.
    pub async fn attach(&self, room_id: &str, conn: Connection) {
        let slot = self.slot(room_id).await;
        let conn_id = conn.id;
        slot.connections.write().await.insert(conn_id, conn);
        self.deliver(room_id, RoomEvent::Connect { conn_id }).await;
    }

    /// Remove a connection. No-op if the liveness sweep already evicted it.
    pub async fn detach(&self, room_id: &str, conn_id: Uuid) {
        let slot = self.slot(room_id).await;
        let removed = slot.connections.write().await.remove(&conn_id);
        if removed.is_some() {
            self.deliver(room_id, RoomEvent::Disconnect { conn_id }).await;
        }
    }

    /// Deliver one event into the room's mailbox, activating the actor if it
    /// is hibernated. Retries once to cover the actor hibernating between
    /// the mailbox lookup and the send.
    pub async fn deliver(&self, room_id: &str, mut event: RoomEvent) {
        let slot = self.slot(room_id).await;
        for _ in 0..2 {
            let tx = self.actor_tx(&slot, room_id).await;
            match tx.send(event).await {
                Ok(()) => return,
                Err(send_err) => {
                    event = send_err.0;
                    let mut actor = slot.actor.lock().await;
                    if actor.as_ref().is_some_and(mpsc::Sender::is_closed) {
                        *actor = None;
                    }
                }
            }
        }
        warn!(%room_id, "dropping room event after failed activation retry");
    }

    /// Read the room's current reaction set, linearized through the actor.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Unavailable`] if the room cannot be activated
    /// (storage down) or does not answer in time.
    pub async fn snapshot(&self, room_id: &str) -> Result<Vec<Reaction>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.deliver(room_id, RoomEvent::Snapshot { reply }).await;
        match tokio::time::timeout(SNAPSHOT_TIMEOUT, rx).await {
            Ok(Ok(reactions)) => Ok(reactions),
            _ => Err(RoomError::Unavailable),
        }
    }

    async fn slot(&self, room_id: &str) -> Arc<RoomSlot> {
        if let Some(slot) = self.slots.read().await.get(room_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(room_id.to_string()).or_insert_with(|| Arc::new(RoomSlot::new())))
    }

    async fn actor_tx(&self, slot: &Arc<RoomSlot>, room_id: &str) -> mpsc::Sender<RoomEvent> {
        let mut actor = slot.actor.lock().await;
        if let Some(tx) = actor.as_ref() {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let _task = crate::room::spawn(
            room_id.to_string(),
            Arc::clone(slot),
            Arc::clone(&self.storage),
            Arc::clone(&self.vocab),
            self.timings,
            rx,
        );
        *actor = Some(tx.clone());
        tx
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
