//! Room actor — sequential event processing for one room.
//!
//! DESIGN
//! ======
//! One task per active room. Everything that can touch room state (connects,
//! inbound frames, liveness ticks, disconnects, snapshot reads) arrives
//! through the mailbox and is handled one event to completion before the
//! next, so state updates are linearizable and broadcasts are totally
//! ordered. Handlers mutate state, the state manager writes through to
//! storage, and the dispatch layer owns fan-out.
//!
//! LIFECYCLE
//! =========
//! 1. Spawn → `initialize` (load-or-seed) → ensure the liveness alarm
//! 2. Events drain from the mailbox until the room goes idle
//! 3. Idle → drain remaining events → hibernate (the task exits)
//! 4. Next event respawns the actor; state reloads from storage, and the
//!    transport layer still holds the live connections and attachments
//!
//! ERROR HANDLING
//! ==============
//! Activation failure drops the mailbox (queued events are lost, retried by
//! the next event). A failed write-through skips that mutation's broadcast.
//! Tick errors never prevent the next alarm from being armed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::liveness::{Attachment, SweepVerdict, assess, now_ms};
use crate::protocol::{Message, Reaction};
use crate::reactions::{Direction, RoomState};
use crate::rooms::{RoomSlot, RoomTimings};
use crate::storage::{RoomStorage, StorageError};
use crate::vocab::Vocabulary;

// =============================================================================
// EVENTS
// =============================================================================

/// Everything a room actor can be asked to do.
#[derive(Debug)]
pub enum RoomEvent {
    /// A connection registered in the slot's transport table.
    Connect { conn_id: Uuid },
    /// One inbound text frame, undecoded. The router half of the actor owns
    /// parsing so malformed input is rejected in exactly one place.
    Frame { conn_id: Uuid, text: String },
    /// The connection left (client close or socket error).
    Disconnect { conn_id: Uuid },
    /// Durable liveness alarm fired.
    Tick,
    /// Linearized read for the HTTP snapshot endpoint.
    Snapshot { reply: oneshot::Sender<Vec<Reaction>> },
}

// =============================================================================
// SPAWN
// =============================================================================

/// Spawn one actor incarnation for `room_id`, consuming `rx` as its mailbox.
pub fn spawn(
    room_id: String,
    slot: Arc<RoomSlot>,
    storage: Arc<dyn RoomStorage>,
    vocab: Arc<dyn Vocabulary>,
    timings: RoomTimings,
    rx: mpsc::Receiver<RoomEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = RoomState::new(room_id.clone(), Arc::clone(&storage), vocab);
        let init = state.initialize().await;

        // Cleanup step: the liveness alarm is armed whether or not
        // activation succeeded, so ticking never silently stops.
        if let Err(e) = ensure_alarm(storage.as_ref(), &room_id, timings).await {
            warn!(error = %e, %room_id, "failed to arm liveness alarm");
        }

        if let Err(e) = init {
            error!(error = %e, %room_id, "room activation failed");
            return;
        }

        info!(%room_id, "room activated");
        RoomActor { room_id, slot, state, storage, timings, rx }.run().await;
    })
}

async fn ensure_alarm(
    storage: &dyn RoomStorage,
    room_id: &str,
    timings: RoomTimings,
) -> Result<(), StorageError> {
    if storage.alarm(room_id).await?.is_none() {
        storage
            .schedule_alarm(room_id, now_ms() + timings.heartbeat_interval_ms)
            .await?;
    }
    Ok(())
}

// =============================================================================
// ACTOR
// =============================================================================

struct RoomActor {
    room_id: String,
    slot: Arc<RoomSlot>,
    state: RoomState,
    storage: Arc<dyn RoomStorage>,
    timings: RoomTimings,
    rx: mpsc::Receiver<RoomEvent>,
}

impl RoomActor {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    event
                }
                () = tokio::time::sleep(Duration::from_millis(self.timings.idle_evict_ms)) => {
                    // Hibernate: refuse new sends, drain what already landed.
                    self.rx.close();
                    while let Ok(event) = self.rx.try_recv() {
                        self.handle(event).await;
                    }
                    break;
                }
            };
            self.handle(event).await;
        }
        info!(room_id = %self.room_id, "room hibernated");
    }

    async fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Connect { conn_id } => self.on_connect(conn_id).await,
            RoomEvent::Frame { conn_id, text } => self.on_frame(conn_id, &text).await,
            RoomEvent::Disconnect { conn_id } => {
                let remaining = self.slot.connections.read().await.len();
                info!(%conn_id, room_id = %self.room_id, remaining, "connection closed");
            }
            RoomEvent::Tick => self.on_tick().await,
            RoomEvent::Snapshot { reply } => {
                let _ = reply.send(self.state.get_all());
            }
        }
    }

    // =========================================================================
    // CONNECT
    // =========================================================================

    async fn on_connect(&self, conn_id: Uuid) {
        info!(%conn_id, room_id = %self.room_id, "connection attached");
        self.send_to(conn_id, Message::connect(self.state.get_all())).await;
    }

    // =========================================================================
    // FRAME DISPATCH
    // =========================================================================

    /// Decode one inbound frame and dispatch it. Malformed input is dropped
    /// here with a log line; the connection stays open and gets no reply.
    async fn on_frame(&mut self, conn_id: Uuid, text: &str) {
        let message: Message = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(%conn_id, error = %e, "dropping malformed frame");
                return;
            }
        };

        match message {
            Message::ReactionIncrement { name } => {
                self.mutate(&name, Direction::Increment).await;
            }
            Message::ReactionDecrement { name } => {
                self.mutate(&name, Direction::Decrement).await;
            }
            Message::Ping => {
                // Client-initiated keepalive: answer the sender only. Does
                // not touch the server's own liveness bookkeeping.
                self.send_to(conn_id, Message::Pong).await;
            }
            Message::Pong => self.on_pong(conn_id).await,
            Message::Connect { .. } | Message::ReactionUpdate { .. } => {
                warn!(%conn_id, "ignoring server-bound frame from client");
            }
            Message::Unknown => {
                warn!(%conn_id, "ignoring frame with unrecognized type");
            }
        }
    }

    async fn mutate(&mut self, name: &str, direction: Direction) {
        match self.state.apply_delta(name, direction).await {
            Ok(true) => {
                self.broadcast(Message::update(self.state.get_all())).await;
            }
            Ok(false) => {
                // Name outside the vocabulary-seeded set: silent no-op.
                debug!(room_id = %self.room_id, name, "ignoring delta for unknown reaction");
            }
            Err(e) => {
                error!(error = %e, room_id = %self.room_id, name, "reaction write-through failed; broadcast skipped");
            }
        }
    }

    async fn on_pong(&self, conn_id: Uuid) {
        let connections = self.slot.connections.read().await;
        if let Some(conn) = connections.get(&conn_id) {
            conn.write_attachment(Attachment::stamped(now_ms()).to_value());
        }
    }

    // =========================================================================
    // LIVENESS TICK
    // =========================================================================

    async fn on_tick(&mut self) {
        let now = now_ms();
        self.sweep(now).await;

        // Mandatory, unconditional: the next tick is armed before this
        // handler returns, whatever happened above.
        let next = now + self.timings.heartbeat_interval_ms;
        if let Err(e) = self.storage.schedule_alarm(&self.room_id, next).await {
            error!(error = %e, room_id = %self.room_id, "failed to arm next liveness alarm");
        }
    }

    /// Inspect every attached connection's heartbeat stamp; evict the stale,
    /// heal the malformed, and ping the survivors.
    async fn sweep(&self, now: i64) {
        let mut connections = self.slot.connections.write().await;
        if connections.is_empty() {
            // Nothing to sweep or ping; the caller still re-arms the alarm.
            return;
        }

        let room_id = self.room_id.as_str();
        connections.retain(|conn_id, conn| {
            let value = conn.read_attachment();
            match assess(Attachment::from_value(&value), now, self.timings.liveness_timeout_ms) {
                SweepVerdict::Keep => true,
                SweepVerdict::Heal => {
                    warn!(%conn_id, room_id, "attachment missing or malformed; restamping");
                    conn.write_attachment(Attachment::stamped(now).to_value());
                    true
                }
                SweepVerdict::Evict => {
                    // Dropping the handle closes the outbound queue; the
                    // transport task shuts the socket when it drains.
                    info!(%conn_id, room_id, "evicting unresponsive connection");
                    false
                }
            }
        });

        for (conn_id, conn) in connections.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = conn.tx.try_send(Message::Ping) {
                warn!(%conn_id, "outbound queue full; ping dropped");
            }
        }
    }

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    /// Send one frame to every attached connection, the mutating client
    /// included. Best-effort per connection: a full queue drops this frame
    /// (a later full snapshot supersedes it), never reorders.
    async fn broadcast(&self, message: Message) {
        let connections = self.slot.connections.read().await;
        for (conn_id, conn) in connections.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = conn.tx.try_send(message.clone()) {
                warn!(%conn_id, room_id = %self.room_id, "outbound queue full; dropping frame");
            }
        }
    }

    async fn send_to(&self, conn_id: Uuid, message: Message) {
        let connections = self.slot.connections.read().await;
        let Some(conn) = connections.get(&conn_id) else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(_)) = conn.tx.try_send(message) {
            warn!(%conn_id, "outbound queue full; dropping frame");
        }
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
