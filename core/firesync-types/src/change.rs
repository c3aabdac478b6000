//! Wire model of a document change.
//!
//! This is the payload delivered to the intake endpoint for every local
//! mutation: the document's before and after images plus, for updates,
//! the mask of changed field paths. The same shape is re-published to
//! the propagation topic, so it round-trips through serde unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document field map. Values are plain JSON.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A single document mutation as delivered by the change feed.
///
/// Exactly which images are present determines the mutation kind:
/// creation carries only `value`, deletion only `old_value`, and an
/// update carries both plus the `update_mask`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// After-image of the document. Absent for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,

    /// Before-image of the document. Absent for creations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Document>,

    /// Field paths changed by an update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<UpdateMask>,
}

/// Mask of field paths touched by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMask {
    #[serde(default)]
    pub field_paths: Vec<String>,
}

/// A document image carried inside a change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Fully-qualified document name
    /// (`projects/{p}/databases/{d}/documents/{path}`).
    pub name: String,

    /// Document fields at the time of the image.
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,

    /// When the document was first created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,

    /// When the document was last mutated. Monotonic per document;
    /// this is the authoritative LWW timestamp for creations and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}
