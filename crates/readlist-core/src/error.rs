//! Model-level errors reported to the sync bridge

use thiserror::Error;

use crate::storage::StorageError;

/// Failures a reading list model reports to its sync bridge
///
/// Precondition violations are not represented here; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The one-time load failed; the model stays unloaded
    #[error("Reading list failed to load: {0}")]
    Load(#[source] StorageError),

    /// Queued writes could not be persisted
    #[error("Reading list failed to persist changes: {0}")]
    Storage(#[source] StorageError),
}
