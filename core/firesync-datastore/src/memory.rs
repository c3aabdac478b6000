//! In-memory datastore with optimistic transactions.
//!
//! Transactions read through to the committed state, buffer their writes
//! locally (reads see the transaction's own writes), and record the
//! version of every document they touched. Commit re-validates those
//! versions under the store lock and applies the buffered writes
//! atomically; a version mismatch aborts the attempt and the runner
//! re-executes the closure. Last-update-time preconditions are checked
//! eagerly against the transaction's view so callers observe the benign
//! precondition race inside the closure.

use crate::error::{DatastoreError, DatastoreResult};
use crate::store::{Datastore, FieldUpdate, Snapshot, Transaction, TransactionFn};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: serde_json::Value,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

/// Shared in-memory document store.
///
/// Cloning is cheap and clones share the same underlying documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    documents: Arc<Mutex<HashMap<String, StoredDocument>>>,
}

impl MemoryDatastore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document directly with an explicit update time, outside
    /// any transaction. Bootstrap and test helper; the feed that produces
    /// change events is expected to have applied the mutation already.
    pub fn seed(&self, path: impl Into<String>, data: serde_json::Value, update_time: DateTime<Utc>) {
        let mut documents = self.documents.lock();
        let path = path.into();
        let create_time = documents
            .get(&path)
            .map_or(update_time, |doc| doc.create_time);
        documents.insert(
            path,
            StoredDocument {
                data,
                create_time,
                update_time,
            },
        );
    }

    /// Reads the committed state of one document.
    #[must_use]
    pub fn document(&self, path: &str) -> Option<(serde_json::Value, DateTime<Utc>)> {
        self.documents
            .lock()
            .get(path)
            .map(|doc| (doc.data.clone(), doc.update_time))
    }

    /// True when the document exists.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.documents.lock().contains_key(path)
    }

    /// Number of documents currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// True when no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn run_transaction(&self, mut f: TransactionFn<'_>) -> DatastoreResult<bool> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut tx = MemoryTransaction::begin(Arc::clone(&self.documents));
            let decision = f(&mut tx).await?;
            match tx.commit() {
                Ok(()) => return Ok(decision),
                Err(DatastoreError::Conflict) if attempts < MAX_ATTEMPTS => continue,
                Err(DatastoreError::Conflict) => return Err(DatastoreError::Aborted(attempts)),
                Err(e) => return Err(e),
            }
        }
    }
}

/// A write buffered by a transaction, carrying the version a read-back
/// inside the same attempt reports.
struct PendingPut {
    data: serde_json::Value,
    version: DateTime<Utc>,
}

/// One transaction attempt over the shared store.
struct MemoryTransaction {
    store: Arc<Mutex<HashMap<String, StoredDocument>>>,
    /// Update time this attempt assigns to its writes when it commits.
    commit_time: DateTime<Utc>,
    /// Update time observed at first access per path; `None` = absent.
    reads: HashMap<String, Option<DateTime<Utc>>>,
    /// Buffered writes; `None` = deletion.
    writes: HashMap<String, Option<PendingPut>>,
}

impl MemoryTransaction {
    fn begin(store: Arc<Mutex<HashMap<String, StoredDocument>>>) -> Self {
        Self {
            store,
            commit_time: Utc::now(),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    /// Current view of a document: buffered writes shadow committed
    /// state. The first committed read per path records its version for
    /// commit-time validation.
    fn current(&mut self, path: &str) -> Option<(serde_json::Value, DateTime<Utc>)> {
        if let Some(pending) = self.writes.get(path) {
            return pending
                .as_ref()
                .map(|put| (put.data.clone(), put.version));
        }

        let store = self.store.lock();
        let doc = store.get(path);
        self.reads
            .entry(path.to_string())
            .or_insert_with(|| doc.map(|d| d.update_time));
        doc.map(|d| (d.data.clone(), d.update_time))
    }

    fn commit(self) -> DatastoreResult<()> {
        let mut store = self.store.lock();

        for (path, observed) in &self.reads {
            let current = store.get(path).map(|doc| doc.update_time);
            if current != *observed {
                return Err(DatastoreError::Conflict);
            }
        }

        let commit_time = self.commit_time;
        for (path, write) in self.writes {
            match write {
                Some(put) => {
                    let create_time = store
                        .get(&path)
                        .map_or(commit_time, |doc| doc.create_time);
                    store.insert(
                        path,
                        StoredDocument {
                            data: put.data,
                            create_time,
                            update_time: commit_time,
                        },
                    );
                }
                None => {
                    store.remove(&path);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, path: &str) -> DatastoreResult<Option<Snapshot>> {
        Ok(self
            .current(path)
            .map(|(data, update_time)| Snapshot::new(data, update_time)))
    }

    async fn create(&mut self, path: &str, data: serde_json::Value) -> DatastoreResult<()> {
        if self.current(path).is_some() {
            return Err(DatastoreError::AlreadyExists(path.to_string()));
        }
        // A created document reads back with the version this attempt
        // will commit.
        let version = self.commit_time;
        self.writes
            .insert(path.to_string(), Some(PendingPut { data, version }));
        Ok(())
    }

    async fn update(
        &mut self,
        path: &str,
        updates: Vec<FieldUpdate>,
        last_update_time: DateTime<Utc>,
    ) -> DatastoreResult<()> {
        let Some((mut data, update_time)) = self.current(path) else {
            return Err(DatastoreError::NotFound(path.to_string()));
        };
        if update_time != last_update_time {
            return Err(DatastoreError::FailedPrecondition(path.to_string()));
        }

        for update in updates {
            set_field(&mut data, &update.field_path, update.value);
        }
        // The document keeps its pre-write version until commit assigns
        // a new one.
        self.writes.insert(
            path.to_string(),
            Some(PendingPut {
                data,
                version: update_time,
            }),
        );
        Ok(())
    }

    async fn delete(
        &mut self,
        path: &str,
        last_update_time: DateTime<Utc>,
    ) -> DatastoreResult<()> {
        // Deleting an absent document under a precondition is reported as
        // the precondition race, so callers fall into their benign-skip
        // path.
        let Some((_, update_time)) = self.current(path) else {
            return Err(DatastoreError::FailedPrecondition(path.to_string()));
        };
        if update_time != last_update_time {
            return Err(DatastoreError::FailedPrecondition(path.to_string()));
        }
        self.writes.insert(path.to_string(), None);
        Ok(())
    }
}

/// Sets a dotted field path inside a document object, creating
/// intermediate maps as needed. Non-object intermediates are replaced.
fn set_field(data: &mut serde_json::Value, path: &str, value: serde_json::Value) {
    if !data.is_object() {
        *data = serde_json::Value::Object(serde_json::Map::new());
    }

    let mut current = data;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let map = current.as_object_mut().expect("object ensured above");
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        let entry = map
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = serde_json::Value::Object(serde_json::Map::new());
        }
        current = entry;
    }
}
