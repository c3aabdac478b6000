//! Event classification.
//!
//! Turns a raw change payload into a classified [`Event`], deciding both
//! what kind of mutation it describes and which timestamp governs LWW
//! reconciliation. Classification is the loop-prevention gate: replicated
//! echoes and tombstone bookkeeping must never be re-propagated.

use crate::change::ChangeEvent;
use crate::docname::DocumentName;
use crate::metadata::{has_metadata_field_path, METADATA_FIELD};
use crate::tombstone::TOMBSTONE_COLLECTION;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// What a change event represents once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A user created the document.
    Created,
    /// A user updated the document.
    Updated,
    /// A user deleted the document.
    Deleted,
    /// Echo of a write that originated on a peer replica, or of our own
    /// metadata stamp. Never propagated.
    Replicated,
    /// A mutation inside the reserved tombstone collection. Never
    /// propagated.
    Tombstone,
}

impl EventKind {
    /// Stable lowercase name, used for log fields, metric labels, and
    /// message attributes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Replicated => "replicated",
            EventKind::Tombstone => "tombstone",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified local mutation, ready for the propagator.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub name: DocumentName,
    /// Authoritative LWW timestamp for this mutation.
    pub timestamp: DateTime<Utc>,
    /// The raw change payload, re-published verbatim on propagation.
    pub raw: ChangeEvent,
    /// Trace id of the intake request, when sampled.
    pub trace: Option<String>,
}

impl Event {
    /// Classifies a raw change payload.
    ///
    /// `event_time` is the wall-clock fallback used where no after-image
    /// carries an update time, which is the case for deletions.
    ///
    /// Classification rules, first match wins:
    /// - a path inside the reserved collection is tombstone bookkeeping;
    /// - a creation whose fields already carry the metadata marker was
    ///   written by a peer replica;
    /// - an update whose mask touches the metadata marker was caused by
    ///   our own transactional stamp;
    /// - everything else is a plain create, update, or delete.
    pub fn classify(raw: ChangeEvent, event_time: DateTime<Utc>) -> Result<Self> {
        let Some(doc) = raw.value.as_ref() else {
            // No after-image: a deletion, described by the before-image.
            let old = raw
                .old_value
                .as_ref()
                .ok_or(Error::MalformedEvent("no value nor old value"))?;

            let name = DocumentName::parse(&old.name)
                .ok_or(Error::MalformedEvent("invalid old document name"))?;

            let kind = if is_tombstone_path(&name.path) {
                EventKind::Tombstone
            } else {
                EventKind::Deleted
            };

            return Ok(Self {
                kind,
                name,
                timestamp: event_time,
                raw,
                trace: None,
            });
        };

        let name = DocumentName::parse(&doc.name)
            .ok_or(Error::MalformedEvent("invalid document name"))?;
        let timestamp = doc.update_time.unwrap_or(event_time);

        if is_tombstone_path(&name.path) {
            return Ok(Self {
                kind: EventKind::Tombstone,
                name,
                timestamp,
                raw,
                trace: None,
            });
        }

        if raw.old_value.is_none() {
            // Only replicated creations carry the metadata marker right away.
            let kind = if doc.fields.contains_key(METADATA_FIELD) {
                EventKind::Replicated
            } else {
                EventKind::Created
            };

            return Ok(Self {
                kind,
                name,
                timestamp,
                raw,
                trace: None,
            });
        }

        // Both images present: an update, which must carry its mask.
        let mask = raw
            .update_mask
            .as_ref()
            .ok_or(Error::MalformedEvent("no update mask in update event"))?;

        let kind = if has_metadata_field_path(&mask.field_paths) {
            EventKind::Replicated
        } else {
            EventKind::Updated
        };

        Ok(Self {
            kind,
            name,
            timestamp,
            raw,
            trace: None,
        })
    }

    /// Attaches the intake request's trace id.
    #[must_use]
    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.trace = trace;
        self
    }
}

fn is_tombstone_path(path: &str) -> bool {
    path.strip_prefix(TOMBSTONE_COLLECTION)
        .is_some_and(|rest| rest.starts_with('/'))
}
