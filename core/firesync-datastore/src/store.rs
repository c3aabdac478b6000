//! Datastore capability ports.
//!
//! Modeled so the propagator can be driven by any transactional document
//! store: the closure passed to [`Datastore::run_transaction`] receives a
//! [`Transaction`] handle and returns its publish decision. Closures must
//! be idempotent; the runner may invoke them multiple times before one
//! attempt commits.

use crate::error::{DatastoreError, DatastoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

/// A single field assignment inside an update mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Dotted field path (`_firesync`, `_firesync.ts`).
    pub field_path: String,
    /// New value for the field.
    pub value: serde_json::Value,
}

impl FieldUpdate {
    /// Creates a field assignment.
    pub fn set(field_path: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            field_path: field_path.into(),
            value,
        }
    }
}

/// Point-in-time image of a document read inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    data: serde_json::Value,
    update_time: DateTime<Utc>,
}

impl Snapshot {
    /// Creates a snapshot from raw parts. Used by datastore
    /// implementations.
    #[must_use]
    pub fn new(data: serde_json::Value, update_time: DateTime<Utc>) -> Self {
        Self { data, update_time }
    }

    /// The document's raw data.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// When the document was last mutated.
    #[must_use]
    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    /// Decodes the document data into a typed record.
    pub fn data_to<T: DeserializeOwned>(&self) -> DatastoreResult<T> {
        serde_json::from_value(self.data.clone()).map_err(DatastoreError::from)
    }

    /// Looks up a field by dotted path.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        let mut current = &self.data;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Per-transaction operations.
///
/// Reads reflect the committed state plus this transaction's own buffered
/// writes. Mutations taking a `last_update_time` precondition fail with
/// [`DatastoreError::FailedPrecondition`] when the document's current
/// update time differs, so callers can distinguish the benign LWW race
/// from real failures.
#[async_trait]
pub trait Transaction: Send {
    /// Reads a document. Returns `None` when it does not exist.
    async fn get(&mut self, path: &str) -> DatastoreResult<Option<Snapshot>>;

    /// Creates a document. Fails when it already exists.
    async fn create(&mut self, path: &str, data: serde_json::Value) -> DatastoreResult<()>;

    /// Applies field updates to an existing document, guarded by the
    /// last-update-time precondition.
    async fn update(
        &mut self,
        path: &str,
        updates: Vec<FieldUpdate>,
        last_update_time: DateTime<Utc>,
    ) -> DatastoreResult<()>;

    /// Deletes a document, guarded by the last-update-time precondition.
    async fn delete(&mut self, path: &str, last_update_time: DateTime<Utc>)
        -> DatastoreResult<()>;
}

/// Closure run inside a transaction.
///
/// Returns the caller's decision for this attempt (for the propagator:
/// whether the event should be published). The runner forwards the value
/// from the attempt that commits.
pub type TransactionFn<'a> = Box<
    dyn for<'t> FnMut(&'t mut dyn Transaction) -> BoxFuture<'t, DatastoreResult<bool>>
        + Send
        + 'a,
>;

/// A transactional document store.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Runs `f` inside a transaction and returns its decision.
    ///
    /// The closure may run several times: an attempt whose reads were
    /// invalidated by a concurrent commit is discarded and retried. An
    /// error returned by the closure aborts the transaction without
    /// retrying.
    async fn run_transaction(&self, f: TransactionFn<'_>) -> DatastoreResult<bool>;
}
