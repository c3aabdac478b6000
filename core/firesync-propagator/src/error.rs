//! Error types for the propagation engine.

use crate::transport::TransportError;
use firesync_datastore::DatastoreError;
use thiserror::Error;

/// Result type for propagation operations.
pub type PropagateResult<T> = Result<T, PropagateError>;

/// Errors that can occur while propagating an event.
///
/// Benign precondition races never surface here; they are resolved
/// inside the transaction as a skip.
#[derive(Debug, Error)]
pub enum PropagateError {
    /// The datastore transaction failed or ran out of retries.
    #[error("datastore error: {0}")]
    Datastore(#[source] DatastoreError),

    /// A stored tombstone could not be decoded.
    #[error("corrupt stored record: {0}")]
    Corruption(#[source] DatastoreError),

    /// The publish was not acknowledged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The outbound payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
