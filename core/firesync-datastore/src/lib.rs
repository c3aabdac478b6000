//! Datastore layer for Firesync.
//!
//! The propagator never talks to a vendor database client directly; it
//! works against the capability ports defined here:
//!
//! - [`Datastore`] runs a closure inside a transaction, retrying it on
//!   contention (the closure must be idempotent)
//! - [`Transaction`] exposes per-transaction `get`/`create`/`update`/
//!   `delete`, the mutations guarded by an optimistic last-update-time
//!   precondition
//! - [`Snapshot`] is a point-in-time document image
//!
//! [`MemoryDatastore`] is a complete implementation with optimistic
//! concurrency: transactions buffer their writes, validate every read
//! version at commit, and the runner retries the closure when a
//! concurrent commit invalidated it. It backs local development and the
//! test suites.

mod error;
mod memory;
mod store;

pub use error::{DatastoreError, DatastoreResult};
pub use memory::MemoryDatastore;
pub use store::{Datastore, FieldUpdate, Snapshot, Transaction, TransactionFn};
