//! Core type definitions for Firesync.
//!
//! This crate defines the value types shared by the propagator and the
//! service boundary:
//! - Canonical document names and their parser
//! - The wire model of a document change (before/after images + update mask)
//! - Event classification (user write vs. replicated echo vs. tombstone
//!   bookkeeping)
//! - The reserved `_firesync` metadata marker and tombstone records
//!
//! Everything here is plain data; I/O and policy live in the propagator
//! and datastore crates.

mod change;
mod docname;
mod event;
mod metadata;
mod tombstone;

pub use change::{ChangeEvent, Document, Fields, UpdateMask};
pub use docname::DocumentName;
pub use event::{Event, EventKind};
pub use metadata::{has_metadata_field_path, is_metadata_field_path, Metadata, METADATA_FIELD};
pub use tombstone::{tombstone_id, Tombstone, TOMBSTONE_COLLECTION};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while interpreting change payloads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The change payload cannot be classified into an event.
    #[error("malformed event: {0}")]
    MalformedEvent(&'static str),
}
