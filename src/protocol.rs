//! Wire protocol — the tagged frame types exchanged with room clients.
//!
//! DESIGN
//! ======
//! Every frame is one JSON object discriminated by a `type` field, decoded
//! into a single closed enum at the transport boundary. Validation happens
//! there: a frame that fails to parse never reaches a handler, and a
//! well-formed frame with a `type` we don't know collapses into
//! [`Message::Unknown`] so dispatch can ignore it with a log line instead of
//! dropping the connection.
//!
//! Snapshots are always full state. There are no delta or patch frames:
//! `connect` and `reaction:update` both carry the complete reaction set.

use serde::{Deserialize, Serialize};

/// Counts saturate here; decrements floor at zero.
pub const MAX_COUNT: u8 = 99;

// =============================================================================
// REACTION
// =============================================================================

/// One named counter as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub name: String,
    pub count: u8,
}

/// Payload of the `connect` frame. The original protocol nests the snapshot
/// one level deep here, unlike `reaction:update` which carries it flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub reactions: Vec<Reaction>,
}

// =============================================================================
// MESSAGE
// =============================================================================

/// The universal frame type, both directions.
///
/// `connect`, `reaction:update`, and `ping` originate on the server;
/// `reaction:increment`, `reaction:decrement`, and `pong` originate on
/// clients. `ping` is also accepted from clients as a keepalive (answered
/// with a `pong` to that sender only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Full snapshot sent once to a newly attached connection.
    #[serde(rename = "connect")]
    Connect { payload: ConnectPayload },
    /// Full snapshot broadcast to the whole room after a mutation.
    #[serde(rename = "reaction:update")]
    ReactionUpdate { reactions: Vec<Reaction> },
    #[serde(rename = "reaction:increment")]
    ReactionIncrement { name: String },
    #[serde(rename = "reaction:decrement")]
    ReactionDecrement { name: String },
    /// Heartbeat probe.
    #[serde(rename = "ping")]
    Ping,
    /// Heartbeat reply.
    #[serde(rename = "pong")]
    Pong,
    /// Well-formed frame with an unrecognized `type`. Never serialized.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Build the one-time snapshot frame for a new connection.
    #[must_use]
    pub fn connect(reactions: Vec<Reaction>) -> Self {
        Self::Connect { payload: ConnectPayload { reactions } }
    }

    /// Build the post-mutation broadcast frame.
    #[must_use]
    pub fn update(reactions: Vec<Reaction>) -> Self {
        Self::ReactionUpdate { reactions }
    }
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
