//! Sync bridge contract
//!
//! The bridge turns local mutations into sync protocol changes and applies
//! remote changes back through a model's sync-facing operations. Only its
//! model-facing half is modeled here; the wire protocol lives elsewhere.
//!
//! Calls arrive synchronously from inside the mutating model method, while
//! the storage batch for that mutation is open, so metadata recorded in the
//! passed change list is committed together with the entry write.

mod recording;

use crate::entry::ReadingListEntry;
use crate::error::ModelError;
use crate::storage::{MetadataBatch, MetadataChangeList};

pub use recording::{BridgeCall, RecordingSyncBridge, RecordingSyncBridgeHandle};

/// Model-facing half of a reading list sync bridge
pub trait ReadingListSyncBridge {
    /// A local add or update happened
    fn did_add_or_update_entry(
        &mut self,
        entry: &ReadingListEntry,
        metadata_changes: &mut MetadataChangeList,
    );

    /// A local removal happened
    fn did_remove_entry(
        &mut self,
        entry: &ReadingListEntry,
        metadata_changes: &mut MetadataChangeList,
    );

    /// The model finished loading and can start syncing
    fn model_ready_to_sync(&mut self, metadata: MetadataBatch);

    /// The model hit an error it cannot recover from by itself
    fn report_error(&mut self, error: ModelError);

    /// Whether sync is currently authoritative for this model's data
    fn is_tracking_sync_metadata(&self) -> bool;
}
