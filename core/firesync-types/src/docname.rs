//! Canonical document names.
//!
//! Every document in the event feed is addressed by its fully-qualified
//! name, `projects/{project}/databases/{database}/documents/{path}`. The
//! parser rejects anything that does not carry all three non-empty parts
//! in that order.

use crate::tombstone::{tombstone_id, TOMBSTONE_COLLECTION};
use serde::{Deserialize, Serialize};
use std::fmt;

const PROJECTS_PREFIX: &str = "projects/";
const DATABASES_INFIX: &str = "/databases/";
const DOCUMENTS_INFIX: &str = "/documents/";

/// Parsed form of a fully-qualified document name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentName {
    /// Project hosting the database.
    pub project_id: String,
    /// Database the document lives in.
    pub database_id: String,
    /// Document path relative to the database root (e.g. `users/123`).
    pub path: String,
}

impl DocumentName {
    /// Parses a fully-qualified document name.
    ///
    /// Returns `None` when the `projects/`, `/databases/`, `/documents/`
    /// structure is missing or any of the three segments is empty. Project
    /// and database ids must be single segments.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PROJECTS_PREFIX)?;

        let db_idx = rest.find(DATABASES_INFIX)?;
        let project_id = &rest[..db_idx];
        if project_id.is_empty() || project_id.contains('/') {
            return None;
        }

        let rest = &rest[db_idx + DATABASES_INFIX.len()..];
        let doc_idx = rest.find(DOCUMENTS_INFIX)?;
        let database_id = &rest[..doc_idx];
        if database_id.is_empty() || database_id.contains('/') {
            return None;
        }

        let path = &rest[doc_idx + DOCUMENTS_INFIX.len()..];
        if path.is_empty() {
            return None;
        }

        Some(Self {
            project_id: project_id.to_string(),
            database_id: database_id.to_string(),
            path: path.to_string(),
        })
    }

    /// Source coordinates of the replica owning this document,
    /// `projects/{project}/databases/{database}`.
    #[must_use]
    pub fn source(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }

    /// Path of the tombstone sibling for this document inside the
    /// reserved collection.
    #[must_use]
    pub fn tombstone_path(&self) -> String {
        format!("{}/{}", TOMBSTONE_COLLECTION, tombstone_id(&self.path))
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/databases/{}/documents/{}",
            self.project_id, self.database_id, self.path
        )
    }
}
