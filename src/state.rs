//! Shared application state.
//!
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the room registry; everything a handler needs (storage, vocabulary,
//! timings) is reachable through it.

use std::sync::Arc;

use crate::rooms::{RoomTimings, Rooms};
use crate::storage::RoomStorage;
use crate::vocab::Vocabulary;

/// Shared application state. Clone is required by Axum; the registry is
/// Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<Rooms>,
}

impl AppState {
    #[must_use]
    pub fn new(
        storage: Arc<dyn RoomStorage>,
        vocab: Arc<dyn Vocabulary>,
        timings: RoomTimings,
    ) -> Self {
        Self { rooms: Arc::new(Rooms::new(storage, vocab, timings)) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
