//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two surfaces per room: the websocket endpoint for live sync and a plain
//! read endpoint for the current reaction set. Both are linearized through
//! the room actor, so a reader never observes a torn update.

pub mod ws;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::protocol::Reaction;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/rooms/{room_id}/reactions", get(room_reactions))
        .route("/api/rooms/{room_id}/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ReactionsResponse {
    reactions: Vec<Reaction>,
}

async fn room_reactions(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<ReactionsResponse>, StatusCode> {
    match state.rooms.snapshot(&room_id).await {
        Ok(reactions) => Ok(Json(ReactionsResponse { reactions })),
        Err(e) => {
            tracing::error!(error = %e, %room_id, "reaction snapshot failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
