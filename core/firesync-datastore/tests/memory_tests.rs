use chrono::{DateTime, TimeZone, Utc};
use firesync_datastore::{
    Datastore, DatastoreError, FieldUpdate, MemoryDatastore, Transaction,
};
use serde_json::json;
use std::sync::Arc;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

// ── Reads and writes ─────────────────────────────────────────────

#[tokio::test]
async fn get_missing_returns_none() {
    let store = MemoryDatastore::new();
    let found = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move { Ok(tx.get("users/1").await?.is_some()) })
        }))
        .await
        .unwrap();
    assert!(!found);
}

#[tokio::test]
async fn seeded_document_is_visible_with_its_update_time() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    let update_time = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&update_time);
    store
        .run_transaction(Box::new(move |tx| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let snap = tx.get("users/1").await?.unwrap();
                assert_eq!(snap.data()["x"], 1);
                *seen.lock() = Some(snap.update_time());
                Ok(true)
            })
        }))
        .await
        .unwrap();

    assert_eq!(*update_time.lock(), Some(ts(100)));
}

#[tokio::test]
async fn create_commits_and_is_visible_afterwards() {
    let store = MemoryDatastore::new();
    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.create("users/1", json!({"x": 1})).await?;
                Ok(true)
            })
        }))
        .await
        .unwrap();

    let (data, _) = store.document("users/1").unwrap();
    assert_eq!(data, json!({"x": 1}));
}

#[tokio::test]
async fn create_existing_fails() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    let err = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.create("users/1", json!({"x": 2})).await?;
                Ok(true)
            })
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::AlreadyExists(_)));
}

#[tokio::test]
async fn update_applies_dotted_field_paths() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.update(
                    "users/1",
                    vec![
                        FieldUpdate::set("x", json!(2)),
                        FieldUpdate::set("meta.ts", json!("t")),
                    ],
                    ts(100),
                )
                .await?;
                Ok(true)
            })
        }))
        .await
        .unwrap();

    let (data, _) = store.document("users/1").unwrap();
    assert_eq!(data, json!({"x": 2, "meta": {"ts": "t"}}));
}

#[tokio::test]
async fn delete_removes_document() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.delete("users/1", ts(100)).await?;
                Ok(true)
            })
        }))
        .await
        .unwrap();

    assert!(!store.contains("users/1"));
}

// ── Preconditions ────────────────────────────────────────────────

#[tokio::test]
async fn update_with_stale_precondition_fails_as_precondition() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(200));

    let err = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.update("users/1", vec![FieldUpdate::set("x", json!(2))], ts(100))
                    .await?;
                Ok(true)
            })
        }))
        .await
        .unwrap_err();
    assert!(err.is_failed_precondition());
}

#[tokio::test]
async fn update_missing_document_is_not_found() {
    let store = MemoryDatastore::new();
    let err = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.update("users/1", vec![FieldUpdate::set("x", json!(2))], ts(100))
                    .await?;
                Ok(true)
            })
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, DatastoreError::NotFound(_)));
}

#[tokio::test]
async fn delete_with_stale_precondition_fails_as_precondition() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(200));

    let err = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.delete("users/1", ts(100)).await?;
                Ok(true)
            })
        }))
        .await
        .unwrap_err();
    assert!(err.is_failed_precondition());
    assert!(store.contains("users/1"));
}

#[tokio::test]
async fn delete_missing_document_fails_as_precondition() {
    let store = MemoryDatastore::new();
    let err = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.delete("users/1", ts(100)).await?;
                Ok(true)
            })
        }))
        .await
        .unwrap_err();
    assert!(err.is_failed_precondition());
}

#[tokio::test]
async fn precondition_failure_can_be_recovered_inside_the_closure() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(200));

    let decision = store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                match tx
                    .update("users/1", vec![FieldUpdate::set("x", json!(2))], ts(100))
                    .await
                {
                    Err(e) if e.is_failed_precondition() => Ok(false),
                    Err(e) => Err(e),
                    Ok(()) => Ok(true),
                }
            })
        }))
        .await
        .unwrap();

    assert!(!decision);
    // The losing mutation left no trace.
    let (data, _) = store.document("users/1").unwrap();
    assert_eq!(data, json!({"x": 1}));
}

// ── Transaction isolation ────────────────────────────────────────

#[tokio::test]
async fn reads_see_own_writes() {
    let store = MemoryDatastore::new();

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.create("users/1", json!({"x": 1})).await?;
                let snap = tx.get("users/1").await?.unwrap();
                assert_eq!(snap.data()["x"], 1);
                Ok(true)
            })
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn read_back_of_updated_document_keeps_its_version() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.update("users/1", vec![FieldUpdate::set("x", json!(2))], ts(100))
                    .await?;
                // The buffered write shadows the data, but the document
                // keeps its real version until commit.
                let snap = tx.get("users/1").await?.unwrap();
                assert_eq!(snap.data()["x"], 2);
                assert_eq!(snap.update_time(), ts(100));
                Ok(true)
            })
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn read_back_of_created_document_has_a_stable_version() {
    let store = MemoryDatastore::new();

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                tx.create("users/1", json!({"x": 1})).await?;
                let first = tx.get("users/1").await?.unwrap();
                let second = tx.get("users/1").await?.unwrap();
                assert_eq!(first.update_time(), second.update_time());
                Ok(true)
            })
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn buffered_writes_are_invisible_until_commit() {
    let store = MemoryDatastore::new();
    let outside = store.clone();

    store
        .run_transaction(Box::new(move |tx| {
            let outside = outside.clone();
            Box::pin(async move {
                tx.create("users/1", json!({"x": 1})).await?;
                assert!(!outside.contains("users/1"));
                Ok(true)
            })
        }))
        .await
        .unwrap();

    assert!(store.contains("users/1"));
}

#[tokio::test]
async fn conflicting_commit_retries_the_closure() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let seen = Arc::clone(&attempts);
    let racer = store.clone();

    store
        .run_transaction(Box::new(move |tx| {
            let seen = Arc::clone(&seen);
            let racer = racer.clone();
            Box::pin(async move {
                let attempt = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let snap = tx.get("users/1").await?.unwrap();
                if attempt == 0 {
                    // A concurrent writer lands between our read and commit.
                    racer.seed("users/1", json!({"x": 99}), ts(300));
                }
                let _ = snap;
                Ok(true)
            })
        }))
        .await
        .unwrap();

    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn endless_contention_aborts_after_retries() {
    let store = MemoryDatastore::new();
    store.seed("users/1", json!({"x": 1}), ts(100));

    let version = Arc::new(std::sync::atomic::AtomicI64::new(200));
    let racer = store.clone();

    let err = store
        .run_transaction(Box::new(move |tx| {
            let racer = racer.clone();
            let version = Arc::clone(&version);
            Box::pin(async move {
                let _ = tx.get("users/1").await?;
                // Every attempt loses the race.
                let v = version.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                racer.seed("users/1", json!({"x": v}), ts(v));
                Ok(true)
            })
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, DatastoreError::Aborted(_)));
}

#[tokio::test]
async fn snapshot_field_lookup_walks_dotted_paths() {
    let store = MemoryDatastore::new();
    store.seed(
        "users/1",
        json!({"_firesync": {"ts": "1970-01-01T00:01:40Z"}}),
        ts(100),
    );

    store
        .run_transaction(Box::new(|tx| {
            Box::pin(async move {
                let snap = tx.get("users/1").await?.unwrap();
                assert_eq!(
                    snap.field("_firesync.ts").and_then(|v| v.as_str()),
                    Some("1970-01-01T00:01:40Z")
                );
                assert!(snap.field("_firesync.missing").is_none());
                assert!(snap.field("nope").is_none());
                Ok(true)
            })
        }))
        .await
        .unwrap();
}
