//! Liveness monitor — heartbeat bookkeeping and the durable alarm loop.
//!
//! DESIGN
//! ======
//! The only per-connection liveness state is the attachment's `lastPongAt`
//! stamp, carried as opaque JSON on the connection handle so it survives the
//! room actor hibernating between events. The periodic tick itself rides on
//! the storage alarm: the tick handler re-arms the next alarm before it
//! returns, and the dispatcher below polls the store and delivers `Tick`
//! events, reactivating hibernated rooms as needed. A process restart picks
//! overdue alarms back up from the store on the first poll.
//!
//! The sweep verdict is pure (`assess`), so eviction policy is testable
//! without a clock or a socket. Missing or malformed attachment data heals
//! by re-stamping; it never evicts.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::room::RoomEvent;
use crate::rooms::{Rooms, env_parse};
use crate::storage::RoomStorage;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: i64 = 30_000;
pub const DEFAULT_LIVENESS_TIMEOUT_MS: i64 = 60_000;
const DEFAULT_ALARM_POLL_INTERVAL_MS: u64 = 1_000;

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// ATTACHMENT
// =============================================================================

/// Connection-scoped heartbeat metadata, round-tripped through the opaque
/// JSON slot on the connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "lastPongAt", skip_serializing_if = "Option::is_none")]
    pub last_pong_at: Option<i64>,
}

impl Attachment {
    /// A fresh stamp: treated as an implicit heartbeat at `now_ms`.
    #[must_use]
    pub fn stamped(now_ms: i64) -> Self {
        Self { last_pong_at: Some(now_ms) }
    }

    /// Decode from the opaque slot. `None` means the stored value does not
    /// parse as an attachment at all (the malformed case).
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    #[must_use]
    pub fn to_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// =============================================================================
// SWEEP POLICY
// =============================================================================

/// Outcome of inspecting one connection during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepVerdict {
    /// Heartbeat is recent enough; keep and ping.
    Keep,
    /// Stamp is missing or malformed; re-stamp to now, keep and ping.
    Heal,
    /// Heartbeat is older than the timeout; close the connection.
    Evict,
}

/// Decide what to do with a connection whose attachment decoded to
/// `attachment` (or failed to decode, `None`) at time `now_ms`.
#[must_use]
pub fn assess(attachment: Option<Attachment>, now_ms: i64, timeout_ms: i64) -> SweepVerdict {
    match attachment.and_then(|a| a.last_pong_at) {
        None => SweepVerdict::Heal,
        Some(last_pong_at) if now_ms - last_pong_at > timeout_ms => SweepVerdict::Evict,
        Some(_) => SweepVerdict::Keep,
    }
}

// =============================================================================
// ALARM DISPATCHER
// =============================================================================

/// Spawn the background alarm loop. Claims due alarms from storage and
/// delivers a `Tick` to each owning room, activating it if hibernated.
pub fn spawn_alarm_dispatcher(rooms: Arc<Rooms>, storage: Arc<dyn RoomStorage>) -> JoinHandle<()> {
    let poll_interval_ms = env_parse("ALARM_POLL_INTERVAL_MS", DEFAULT_ALARM_POLL_INTERVAL_MS);
    tracing::info!(poll_interval_ms, "alarm dispatcher configured");

    tokio::spawn(async move {
        loop {
            match storage.take_due_alarms(now_ms()).await {
                Ok(due) => {
                    for room_id in due {
                        debug!(%room_id, "alarm fired");
                        rooms.deliver(&room_id, RoomEvent::Tick).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "alarm poll failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
        }
    })
}

#[cfg(test)]
#[path = "liveness_test.rs"]
mod tests;
