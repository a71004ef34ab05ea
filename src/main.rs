mod db;
mod liveness;
mod protocol;
mod reactions;
mod room;
mod rooms;
mod routes;
mod state;
mod storage;
mod vocab;

use std::sync::Arc;

use crate::rooms::RoomTimings;
use crate::storage::{MemStorage, PgStorage, RoomStorage};
use crate::vocab::EmojiCatalog;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    // Postgres when configured; in-memory otherwise (dev only, not durable).
    let storage: Arc<dyn RoomStorage> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = db::init_pool(&database_url)
                .await
                .expect("database init failed");
            Arc::new(PgStorage::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage, rooms will not survive restarts");
            Arc::new(MemStorage::new())
        }
    };

    let timings = RoomTimings::from_env();
    tracing::info!(
        heartbeat_interval_ms = timings.heartbeat_interval_ms,
        liveness_timeout_ms = timings.liveness_timeout_ms,
        idle_evict_ms = timings.idle_evict_ms,
        "room timings configured"
    );

    let state = state::AppState::new(storage.clone(), Arc::new(EmojiCatalog::default()), timings);

    // Durable liveness ticks: the dispatcher claims due alarms and wakes rooms.
    let _alarms = liveness::spawn_alarm_dispatcher(state.rooms.clone(), storage);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "reactboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
