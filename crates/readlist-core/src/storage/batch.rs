//! Write batches and sync metadata containers
//!
//! A `StorageBatch` queues entry writes and removals together with the sync
//! metadata changes recorded by the bridge, so both land in the same
//! durability transaction when the storage layer commits the batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::entry::ReadingListEntry;

/// Per-entity sync bookkeeping kept next to the entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub sequence_number: i64,
    pub is_deleted: bool,
    pub modification_time: DateTime<Utc>,
}

/// A single metadata mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataChange {
    Put {
        storage_key: String,
        metadata: EntityMetadata,
    },
    Clear {
        storage_key: String,
    },
}

/// Metadata mutations recorded during one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataChangeList {
    changes: Vec<MetadataChange>,
}

impl MetadataChangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_metadata(&mut self, storage_key: impl Into<String>, metadata: EntityMetadata) {
        self.changes.push(MetadataChange::Put {
            storage_key: storage_key.into(),
            metadata,
        });
    }

    pub fn clear_metadata(&mut self, storage_key: impl Into<String>) {
        self.changes.push(MetadataChange::Clear {
            storage_key: storage_key.into(),
        });
    }

    pub fn changes(&self) -> &[MetadataChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Sync metadata delivered by the storage layer at load time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBatch {
    entities: BTreeMap<String, EntityMetadata>,
}

impl MetadataBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, storage_key: &str) -> Option<&EntityMetadata> {
        self.entities.get(storage_key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Apply recorded changes in order
    pub fn apply(&mut self, changes: &MetadataChangeList) {
        for change in changes.changes() {
            match change {
                MetadataChange::Put {
                    storage_key,
                    metadata,
                } => {
                    self.entities.insert(storage_key.clone(), metadata.clone());
                }
                MetadataChange::Clear { storage_key } => {
                    self.entities.remove(storage_key);
                }
            }
        }
    }
}

/// A queued storage write
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    Save(ReadingListEntry),
    Remove(Url),
}

/// Writes queued between the first and last reference to a batch
#[derive(Debug, Default)]
pub struct StorageBatch {
    ops: Vec<StorageOp>,
    metadata_changes: MetadataChangeList,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_entry(&mut self, entry: &ReadingListEntry) {
        self.ops.push(StorageOp::Save(entry.clone()));
    }

    pub fn remove_entry(&mut self, url: &Url) {
        self.ops.push(StorageOp::Remove(url.clone()));
    }

    /// Place for the sync bridge to record metadata in the same transaction
    pub fn metadata_change_list(&mut self) -> &mut MetadataChangeList {
        &mut self.metadata_changes
    }

    pub fn ops(&self) -> &[StorageOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.metadata_changes.is_empty()
    }

    pub fn into_parts(self) -> (Vec<StorageOp>, MetadataChangeList) {
        (self.ops, self.metadata_changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(seq: i64) -> EntityMetadata {
        EntityMetadata {
            sequence_number: seq,
            is_deleted: false,
            modification_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_metadata_batch_apply() {
        let mut changes = MetadataChangeList::new();
        changes.put_metadata("http://a.com/", metadata(1));
        changes.put_metadata("http://b.com/", metadata(2));
        changes.clear_metadata("http://a.com/");

        let mut batch = MetadataBatch::new();
        batch.apply(&changes);
        assert_eq!(batch.len(), 1);
        assert!(batch.get("http://a.com/").is_none());
        assert_eq!(batch.get("http://b.com/"), Some(&metadata(2)));
    }

    #[test]
    fn test_storage_batch_queues_in_order() {
        let url = Url::parse("http://a.com").unwrap();
        let entry = ReadingListEntry::new(url.clone(), "A", DateTime::<Utc>::UNIX_EPOCH);

        let mut batch = StorageBatch::new();
        assert!(batch.is_empty());
        batch.save_entry(&entry);
        batch.remove_entry(&url);

        assert_eq!(
            batch.ops(),
            &[StorageOp::Save(entry), StorageOp::Remove(url)]
        );
    }
}
