//! Storage error handling
//!
//! Typed errors surfaced by a storage layer through the load callback or a
//! batch commit.

use thiserror::Error;
use url::Url;

/// Errors that can occur in a reading list storage layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The initial load could not read the stored entries
    #[error("Failed to load reading list entries: {details}")]
    LoadFailed { details: String },

    /// A stored entry could not be decoded
    #[error("Stored entry for '{url}' is corrupted: {details}")]
    CorruptEntry { url: Url, details: String },

    /// A batch of writes could not be committed
    #[error("Failed to commit {operations} queued write(s): {details}")]
    CommitFailed { operations: usize, details: String },
}

impl StorageError {
    /// Whether retrying the failed operation later can succeed
    ///
    /// Corrupt data does not fix itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StorageError::CommitFailed { .. })
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
