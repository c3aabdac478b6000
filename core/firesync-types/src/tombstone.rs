//! Tombstones: authoritative deletion records.
//!
//! When a document is deleted, a tombstone in the reserved sibling
//! collection outlives it so that late-arriving writes with older
//! timestamps can be recognized as stale resurrections. Tombstones are
//! garbage-collected by an external TTL sweeper once `expiration` has
//! passed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reserved collection holding tombstones.
pub const TOMBSTONE_COLLECTION: &str = "_firesync";

/// Record of a document deletion.
///
/// At most one tombstone exists per document path at any instant; its id
/// is derived deterministically from the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Path of the deleted document, relative to the database root.
    #[serde(rename = "doc")]
    pub document: String,

    /// Authoritative deletion timestamp used for LWW conflict resolution.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// Source database of the delete (`projects/$ID/databases/$DB`).
    #[serde(rename = "src")]
    pub source: String,

    /// Top-level trace id of the request that issued the delete. Only set
    /// when the trace was sampled.
    #[serde(rename = "trace", default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    /// When the TTL sweeper may collect this record.
    #[serde(rename = "exp")]
    pub expiration: DateTime<Utc>,
}

impl Tombstone {
    /// The tombstone's deterministic id.
    #[must_use]
    pub fn id(&self) -> String {
        tombstone_id(&self.document)
    }
}

/// Generates the unique id for a document's tombstone.
///
/// `path` is the raw document path without project or database prefixes
/// (e.g. `users/123`). The id is the unpadded URL-safe base64 encoding of
/// the path's SHA-256 digest.
#[must_use]
pub fn tombstone_id(path: &str) -> String {
    let hash = Sha256::digest(path.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
