//! Error types for the datastore layer.

use thiserror::Error;

/// Result type for datastore operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Errors that can occur in datastore operations.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A create addressed a document that already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    /// A mutation's last-update-time precondition did not hold. This is
    /// the benign LWW race: another event with an equal or newer
    /// timestamp landed first.
    #[error("failed precondition on {0}")]
    FailedPrecondition(String),

    /// A concurrent commit invalidated this transaction's reads.
    /// Internal to the transaction runner, which retries the closure.
    #[error("transaction conflict")]
    Conflict,

    /// The transaction kept conflicting and ran out of retries.
    #[error("transaction aborted after {0} attempts")]
    Aborted(u32),

    /// A stored record could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatastoreError {
    /// True for the benign precondition race, which callers are expected
    /// to treat as a skip rather than a failure.
    #[must_use]
    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, DatastoreError::FailedPrecondition(_))
    }
}
