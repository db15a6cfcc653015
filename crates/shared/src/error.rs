//! Error types for repokit

use crate::record::RecordId;
use thiserror::Error;

/// Failure reported by a store or one of its contexts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another context changed the record after this context read it
    #[error("Merge conflict on record {id} (fields: {})", fields.join(", "))]
    Conflict { id: RecordId, fields: Vec<String> },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown record: {0}")]
    UnknownRecord(RecordId),

    #[error("Store rejected operation: {0}")]
    Rejected(String),
}

/// Errors surfaced by repository operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// A commit was attempted but nothing was pending. Usually a benign no-op.
    #[error("No changes to persist")]
    NoChanges,

    /// A query matched nothing (only surfaced in strict projection mode)
    #[error("No data in repository")]
    NoData,

    /// A fetched record belongs to another entity type
    #[error("Record type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("Read failed: {0}")]
    ReadFailed(#[source] StoreError),

    #[error("Save failed: {0}")]
    SaveFailed(#[source] StoreError),

    #[error("Delete failed: {0}")]
    DeleteFailed(#[source] StoreError),

    /// The context source dropped the background task before it reported back
    #[error("Background task aborted before completion")]
    TaskAborted,
}

impl RepositoryError {
    pub fn is_no_changes(&self) -> bool {
        matches!(self, RepositoryError::NoChanges)
    }

    /// Underlying store failure, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            RepositoryError::ReadFailed(e)
            | RepositoryError::SaveFailed(e)
            | RepositoryError::DeleteFailed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Treat `NoChanges` as success
///
/// ```
/// use shared::{RepositoryError, IgnoreNoChanges};
///
/// let outcome: Result<(), RepositoryError> = Err(RepositoryError::NoChanges);
/// assert!(outcome.ignore_no_changes().is_ok());
/// ```
pub trait IgnoreNoChanges {
    fn ignore_no_changes(self) -> Result<()>;
}

impl IgnoreNoChanges for Result<()> {
    fn ignore_no_changes(self) -> Result<()> {
        match self {
            Err(RepositoryError::NoChanges) => Ok(()),
            other => other,
        }
    }
}
