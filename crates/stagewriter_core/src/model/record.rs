//! Record domain model.
//!
//! # Responsibility
//! - Define the row shape stored in the `records` table.
//! - Provide the identity predicate used to stage records in a writer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a record.
pub type RecordId = Uuid;

/// Validation failures for a record before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordValidationError {
    #[error("record kind must not be blank")]
    BlankKind,
}

/// Kind-tagged text payload with a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Free-form category, e.g. `note` or `setting`.
    pub kind: String,
    pub body: String,
}

impl Record {
    /// Creates a record with a freshly generated id.
    pub fn new(kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, body)
    }

    /// Creates a record with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(id: RecordId, kind: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            body: body.into(),
        }
    }

    /// Identity predicate for writer buckets.
    pub fn same_identity(a: &Record, b: &Record) -> bool {
        a.id == b.id
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.kind.trim().is_empty() {
            return Err(RecordValidationError::BlankKind);
        }
        Ok(())
    }
}
