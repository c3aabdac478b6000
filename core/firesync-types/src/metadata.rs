//! The reserved `_firesync` marker embedded in replicated documents.
//!
//! The marker is the loop-prevention signal: its presence on a freshly
//! created document means the write came from a peer replica, and its
//! presence in an update mask means our own transactional stamp caused
//! the event rather than a user write. It is never user data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved document field carrying the replication marker.
pub const METADATA_FIELD: &str = "_firesync";

/// Origin stamp for a system-mediated write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Authoritative mutation timestamp used for LWW conflict resolution.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// Source database of the write (`projects/$ID/databases/$DB`).
    #[serde(rename = "src")]
    pub source: String,

    /// Top-level trace id of the request that issued the write. Only set
    /// when the trace was sampled.
    #[serde(rename = "trace", default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Reports whether a masked field path addresses the reserved metadata
/// field: exactly `_firesync`, or a path under it (`_firesync.ts`).
///
/// Matching is per segment, so a user field named `_firesynced` does not
/// match.
#[must_use]
pub fn is_metadata_field_path(path: &str) -> bool {
    match path.strip_prefix(METADATA_FIELD) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

/// Reports whether any of the masked field paths addresses the reserved
/// metadata field.
#[must_use]
pub fn has_metadata_field_path(paths: &[String]) -> bool {
    paths.iter().any(|p| is_metadata_field_path(p))
}
