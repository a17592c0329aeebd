//! Sync bridge that records what the model tells it
//!
//! When tracking metadata it also behaves like a minimal change processor:
//! every local add/update puts fresh entity metadata keyed by the URL, and
//! every local removal clears it.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::warn;
use url::Url;

use super::ReadingListSyncBridge;
use crate::entry::ReadingListEntry;
use crate::error::ModelError;
use crate::storage::{EntityMetadata, MetadataBatch, MetadataChangeList};

/// One call received by a `RecordingSyncBridge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum BridgeCall {
    AddOrUpdate { url: Url },
    Remove { url: Url },
    ReadyToSync { metadata_entities: usize },
    Error { message: String },
}

#[derive(Default)]
struct Shared {
    tracking: bool,
    next_sequence_number: i64,
    calls: Vec<BridgeCall>,
    errors: Vec<ModelError>,
}

/// Recording sync bridge
pub struct RecordingSyncBridge {
    shared: Rc<RefCell<Shared>>,
}

/// Shared view of a `RecordingSyncBridge` owned by a model
#[derive(Clone)]
pub struct RecordingSyncBridgeHandle {
    shared: Rc<RefCell<Shared>>,
}

impl RecordingSyncBridge {
    pub fn new() -> (Self, RecordingSyncBridgeHandle) {
        let shared = Rc::new(RefCell::new(Shared::default()));
        (
            Self {
                shared: shared.clone(),
            },
            RecordingSyncBridgeHandle { shared },
        )
    }

    fn record(&self, call: BridgeCall) {
        self.shared.borrow_mut().calls.push(call);
    }
}

impl ReadingListSyncBridge for RecordingSyncBridge {
    fn did_add_or_update_entry(
        &mut self,
        entry: &ReadingListEntry,
        metadata_changes: &mut MetadataChangeList,
    ) {
        {
            let mut shared = self.shared.borrow_mut();
            if shared.tracking {
                shared.next_sequence_number += 1;
                metadata_changes.put_metadata(
                    entry.url().as_str(),
                    EntityMetadata {
                        sequence_number: shared.next_sequence_number,
                        is_deleted: false,
                        modification_time: entry.update_time(),
                    },
                );
            }
        }
        self.record(BridgeCall::AddOrUpdate {
            url: entry.url().clone(),
        });
    }

    fn did_remove_entry(
        &mut self,
        entry: &ReadingListEntry,
        metadata_changes: &mut MetadataChangeList,
    ) {
        if self.shared.borrow().tracking {
            metadata_changes.clear_metadata(entry.url().as_str());
        }
        self.record(BridgeCall::Remove {
            url: entry.url().clone(),
        });
    }

    fn model_ready_to_sync(&mut self, metadata: MetadataBatch) {
        self.record(BridgeCall::ReadyToSync {
            metadata_entities: metadata.len(),
        });
    }

    fn report_error(&mut self, error: ModelError) {
        warn!("Sync bridge received model error: {}", error);
        self.record(BridgeCall::Error {
            message: error.to_string(),
        });
        self.shared.borrow_mut().errors.push(error);
    }

    fn is_tracking_sync_metadata(&self) -> bool {
        self.shared.borrow().tracking
    }
}

impl RecordingSyncBridgeHandle {
    /// Turn sync authority on or off
    pub fn set_tracking_sync_metadata(&self, tracking: bool) {
        self.shared.borrow_mut().tracking = tracking;
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.shared.borrow().calls.clone()
    }

    pub fn errors(&self) -> Vec<ModelError> {
        self.shared.borrow().errors.clone()
    }

    pub fn clear(&self) {
        self.shared.borrow_mut().calls.clear();
    }
}
