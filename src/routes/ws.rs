//! WebSocket transport — bridges one socket to its room.
//!
//! DESIGN
//! ======
//! The connection task owns the socket and nothing else. Inbound text frames
//! go to the room mailbox undecoded (the actor's router validates them);
//! outbound frames arrive on a per-connection queue the actor broadcasts
//! into. The `Connection` handle registered with the room carries the
//! heartbeat attachment, so this task stays ignorant of liveness policy:
//! when the sweep evicts the connection, the queue closes and the task shuts
//! the socket.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::liveness::now_ms;
use crate::protocol::Message;
use crate::room::RoomEvent;
use crate::rooms::Connection;
use crate::state::AppState;

const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state, room_id))
}

async fn run_ws(mut socket: WebSocket, state: AppState, room_id: String) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);

    // Registration stamps the implicit first heartbeat on the attachment.
    state.rooms.attach(&room_id, Connection::new(conn_id, tx, now_ms())).await;
    info!(%conn_id, %room_id, "ws: client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(frame)) = inbound else { break };
                match frame {
                    WsMessage::Text(text) => {
                        state
                            .rooms
                            .deliver(&room_id, RoomEvent::Frame { conn_id, text: text.to_string() })
                            .await;
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_frame(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // Evicted by the liveness sweep: close the socket.
                        if let Err(e) = socket.send(WsMessage::Close(None)).await {
                            warn!(%conn_id, error = %e, "ws: close after eviction failed");
                        }
                        break;
                    }
                }
            }
        }
    }

    state.rooms.detach(&room_id, conn_id).await;
    info!(%conn_id, "ws: client disconnected");
}

async fn send_frame(socket: &mut WebSocket, message: &Message) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    socket.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
