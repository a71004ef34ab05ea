use super::*;
use crate::state::test_helpers;
use crate::storage::{MemStorage, StorageError};
use std::sync::Mutex as StdMutex;

#[tokio::test]
async fn snapshot_activates_and_seeds_a_fresh_room() {
    let (storage, state) = test_helpers::test_app_state_with_storage(RoomTimings::default());

    let reactions = state.rooms.snapshot("fresh-room").await.expect("snapshot");
    assert_eq!(reactions.len(), 3);
    assert!(reactions.iter().all(|r| r.count == 0));

    // Seeding wrote through, and activation armed the liveness alarm.
    assert!(storage.get("fresh-room").await.expect("get").is_some());
    assert!(storage.alarm("fresh-room").await.expect("alarm").is_some());
}

#[tokio::test]
async fn snapshot_is_stable_across_hibernation() {
    let timings = RoomTimings { idle_evict_ms: 50, ..RoomTimings::default() };
    let state = test_helpers::test_app_state_with_timings(timings);

    state
        .rooms
        .deliver(
            "room-1",
            RoomEvent::Frame {
                conn_id: Uuid::new_v4(),
                text: r#"{"type":"reaction:increment","name":"👍"}"#.into(),
            },
        )
        .await;
    let before: Vec<Reaction> = state.rooms.snapshot("room-1").await.expect("snapshot");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = state.rooms.snapshot("room-1").await.expect("snapshot");
    assert_eq!(before, after);
    assert_eq!(after.iter().find(|r| r.name == "👍").map(|r| r.count), Some(1));
}

#[tokio::test]
async fn detach_of_unknown_connection_is_a_noop() {
    let state = test_helpers::test_app_state();
    state.rooms.detach("room-1", Uuid::new_v4()).await;
    // Still responsive afterwards.
    assert!(state.rooms.snapshot("room-1").await.is_ok());
}

#[tokio::test]
async fn rooms_do_not_share_state() {
    let state = test_helpers::test_app_state();
    state
        .rooms
        .deliver(
            "room-a",
            RoomEvent::Frame {
                conn_id: Uuid::new_v4(),
                text: r#"{"type":"reaction:increment","name":"👍"}"#.into(),
            },
        )
        .await;

    let a = state.rooms.snapshot("room-a").await.expect("snapshot");
    let b = state.rooms.snapshot("room-b").await.expect("snapshot");
    assert_eq!(a.iter().find(|r| r.name == "👍").map(|r| r.count), Some(1));
    assert_eq!(b.iter().find(|r| r.name == "👍").map(|r| r.count), Some(0));
}

// =============================================================================
// ACTIVATION FAILURE
// =============================================================================

/// Store whose state reads fail; alarm scheduling still works and is
/// recorded, mirroring a database that lost its state table mid-flight.
#[derive(Default)]
struct BrokenStateStorage {
    scheduled: StdMutex<Vec<(String, i64)>>,
}

fn storage_error() -> StorageError {
    StorageError::Serialization(
        serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json"),
    )
}

#[async_trait::async_trait]
impl RoomStorage for BrokenStateStorage {
    async fn get(&self, _room_id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Err(storage_error())
    }

    async fn put(&self, _room_id: &str, _value: serde_json::Value) -> Result<(), StorageError> {
        Err(storage_error())
    }

    async fn alarm(&self, _room_id: &str) -> Result<Option<i64>, StorageError> {
        Ok(None)
    }

    async fn schedule_alarm(&self, room_id: &str, fire_at_ms: i64) -> Result<(), StorageError> {
        self.scheduled.lock().expect("lock").push((room_id.to_string(), fire_at_ms));
        Ok(())
    }

    async fn cancel_alarm(&self, _room_id: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn take_due_alarms(&self, _now_ms: i64) -> Result<Vec<String>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_activation_reports_unavailable_but_still_arms_alarm() {
    let storage = Arc::new(BrokenStateStorage::default());
    let rooms = Rooms::new(
        storage.clone(),
        Arc::new(crate::vocab::EmojiCatalog::default()),
        RoomTimings::default(),
    );

    let result = rooms.snapshot("room-1").await;
    assert!(matches!(result, Err(RoomError::Unavailable)));

    // The cleanup step runs regardless of the activation outcome.
    let scheduled = storage.scheduled.lock().expect("lock");
    assert!(!scheduled.is_empty(), "alarm must be armed despite failed activation");
    assert!(scheduled.iter().all(|(room_id, _)| room_id == "room-1"));
}

#[tokio::test]
async fn activation_is_retried_after_a_failure() {
    // First activation fails, later ones against a healthy store succeed.
    // Exercised here by swapping behaviors behind one storage handle.
    #[derive(Default)]
    struct FlakyStorage {
        healthy_after: StdMutex<bool>,
        inner: MemStorage,
    }

    #[async_trait::async_trait]
    impl RoomStorage for FlakyStorage {
        async fn get(&self, room_id: &str) -> Result<Option<serde_json::Value>, StorageError> {
            if *self.healthy_after.lock().expect("lock") {
                self.inner.get(room_id).await
            } else {
                Err(storage_error())
            }
        }

        async fn put(&self, room_id: &str, value: serde_json::Value) -> Result<(), StorageError> {
            self.inner.put(room_id, value).await
        }

        async fn alarm(&self, room_id: &str) -> Result<Option<i64>, StorageError> {
            self.inner.alarm(room_id).await
        }

        async fn schedule_alarm(&self, room_id: &str, fire_at_ms: i64) -> Result<(), StorageError> {
            self.inner.schedule_alarm(room_id, fire_at_ms).await
        }

        async fn cancel_alarm(&self, room_id: &str) -> Result<(), StorageError> {
            self.inner.cancel_alarm(room_id).await
        }

        async fn take_due_alarms(&self, now_ms: i64) -> Result<Vec<String>, StorageError> {
            self.inner.take_due_alarms(now_ms).await
        }
    }

    let storage = Arc::new(FlakyStorage::default());
    let rooms = Rooms::new(
        storage.clone(),
        Arc::new(crate::vocab::EmojiCatalog::default()),
        RoomTimings::default(),
    );

    assert!(rooms.snapshot("room-1").await.is_err());

    *storage.healthy_after.lock().expect("lock") = true;
    let reactions = rooms.snapshot("room-1").await.expect("snapshot after recovery");
    assert_eq!(reactions.len(), 3);
}
