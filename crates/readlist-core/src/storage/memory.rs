//! In-process storage layer
//!
//! Keeps committed entries and sync metadata in memory. Used by tests and the
//! replay CLI. A cloned `InMemoryStorageHandle` lets the owner of the model
//! inspect committed state, hold back load completion, and inject failures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use super::{
    LoadCallback, LoadedData, MetadataBatch, ReadingListModelStorage, StorageBatch, StorageError,
    StorageOp, StorageResult,
};
use crate::clock::Clock;
use crate::entry::ReadingListEntry;

#[derive(Default)]
struct Shared {
    entries: HashMap<Url, ReadingListEntry>,
    metadata: MetadataBatch,
    defer_load: bool,
    pending_load: Option<LoadCallback>,
    load_error: Option<StorageError>,
    commit_error: Option<String>,
    commit_count: usize,
    loaded_at: Option<DateTime<Utc>>,
}

/// Storage layer backed by process memory
pub struct InMemoryStorage {
    shared: Rc<RefCell<Shared>>,
}

/// Shared view of an `InMemoryStorage` owned by a model
#[derive(Clone)]
pub struct InMemoryStorageHandle {
    shared: Rc<RefCell<Shared>>,
}

impl InMemoryStorage {
    /// Storage that completes loading as soon as `load` is called
    pub fn new() -> (Self, InMemoryStorageHandle) {
        Self::with_entries(Vec::new())
    }

    /// Storage pre-populated with entries
    pub fn with_entries(entries: Vec<ReadingListEntry>) -> (Self, InMemoryStorageHandle) {
        let shared = Shared {
            entries: entries
                .into_iter()
                .map(|entry| (entry.url().clone(), entry))
                .collect(),
            ..Shared::default()
        };
        let shared = Rc::new(RefCell::new(shared));
        (
            Self {
                shared: shared.clone(),
            },
            InMemoryStorageHandle { shared },
        )
    }

    /// Storage whose load completes only on `InMemoryStorageHandle::complete_load`
    pub fn deferred() -> (Self, InMemoryStorageHandle) {
        let (storage, handle) = Self::new();
        storage.shared.borrow_mut().defer_load = true;
        (storage, handle)
    }
}

impl ReadingListModelStorage for InMemoryStorage {
    fn load(&mut self, clock: Rc<dyn Clock>, on_loaded: LoadCallback) {
        let deferred = {
            let mut shared = self.shared.borrow_mut();
            shared.loaded_at = Some(clock.now());
            if shared.defer_load {
                shared.pending_load = Some(on_loaded);
                None
            } else {
                Some(on_loaded)
            }
        };
        match deferred {
            Some(on_loaded) => on_loaded(take_load_result(&self.shared)),
            None => debug!("In-memory load held until completed explicitly"),
        }
    }

    fn commit_batch(&mut self, batch: StorageBatch) -> StorageResult<()> {
        let mut shared = self.shared.borrow_mut();
        if let Some(details) = shared.commit_error.take() {
            return Err(StorageError::CommitFailed {
                operations: batch.ops().len(),
                details,
            });
        }
        let (ops, metadata_changes) = batch.into_parts();
        for op in ops {
            match op {
                StorageOp::Save(entry) => {
                    shared.entries.insert(entry.url().clone(), entry);
                }
                StorageOp::Remove(url) => {
                    shared.entries.remove(&url);
                }
            }
        }
        shared.metadata.apply(&metadata_changes);
        shared.commit_count += 1;
        Ok(())
    }
}

fn take_load_result(shared: &RefCell<Shared>) -> StorageResult<LoadedData> {
    let shared = shared.borrow();
    if let Some(error) = &shared.load_error {
        return Err(error.clone());
    }
    Ok(LoadedData {
        entries: shared.entries.clone(),
        metadata: shared.metadata.clone(),
    })
}

impl InMemoryStorageHandle {
    /// Deliver a held-back load
    ///
    /// Returns false if no load is pending.
    pub fn complete_load(&self) -> bool {
        let pending = self.shared.borrow_mut().pending_load.take();
        match pending {
            Some(on_loaded) => {
                on_loaded(take_load_result(&self.shared));
                true
            }
            None => false,
        }
    }

    /// Make the (next) load deliver this error
    pub fn set_load_error(&self, error: StorageError) {
        self.shared.borrow_mut().load_error = Some(error);
    }

    /// Make the next commit fail with this detail message
    pub fn fail_next_commit(&self, details: impl Into<String>) {
        self.shared.borrow_mut().commit_error = Some(details.into());
    }

    /// Committed copy of an entry
    pub fn entry(&self, url: &Url) -> Option<ReadingListEntry> {
        self.shared.borrow().entries.get(url).cloned()
    }

    /// Number of committed entries
    pub fn entry_count(&self) -> usize {
        self.shared.borrow().entries.len()
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.shared.borrow().commit_count
    }

    /// Committed sync metadata
    pub fn metadata(&self) -> MetadataBatch {
        self.shared.borrow().metadata.clone()
    }

    /// Clock reading taken when `load` was called
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.shared.borrow().loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use std::cell::Cell;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_load_completes_immediately() {
        let clock = Rc::new(TestClock::default());
        let entry = ReadingListEntry::new(url("http://a.com"), "A", clock.now());
        let (mut storage, handle) = InMemoryStorage::with_entries(vec![entry]);

        let count = Rc::new(Cell::new(None));
        let seen = count.clone();
        storage.load(
            clock.clone(),
            Box::new(move |result| seen.set(Some(result.unwrap().entries.len()))),
        );
        assert_eq!(count.get(), Some(1));
        assert_eq!(handle.loaded_at(), Some(clock.now()));
    }

    #[test]
    fn test_deferred_load() {
        let (mut storage, handle) = InMemoryStorage::deferred();
        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        storage.load(
            Rc::new(TestClock::default()),
            Box::new(move |result| {
                assert!(result.is_ok());
                flag.set(true);
            }),
        );
        assert!(!done.get());
        assert!(handle.complete_load());
        assert!(done.get());
        assert!(!handle.complete_load());
    }

    #[test]
    fn test_load_error() {
        let (mut storage, handle) = InMemoryStorage::new();
        handle.set_load_error(StorageError::LoadFailed {
            details: "unreadable".to_string(),
        });
        let failed = Rc::new(Cell::new(false));
        let flag = failed.clone();
        storage.load(
            Rc::new(TestClock::default()),
            Box::new(move |result| flag.set(result.is_err())),
        );
        assert!(failed.get());
    }

    #[test]
    fn test_commit_applies_ops() {
        let (mut storage, handle) = InMemoryStorage::new();
        let a = ReadingListEntry::new(url("http://a.com"), "A", DateTime::<Utc>::UNIX_EPOCH);
        let b = ReadingListEntry::new(url("http://b.com"), "B", DateTime::<Utc>::UNIX_EPOCH);

        let mut batch = StorageBatch::new();
        batch.save_entry(&a);
        batch.save_entry(&b);
        batch.remove_entry(a.url());
        storage.commit_batch(batch).unwrap();

        assert_eq!(handle.entry_count(), 1);
        assert!(handle.entry(b.url()).is_some());
        assert_eq!(handle.commit_count(), 1);
    }

    #[test]
    fn test_commit_failure_is_one_shot() {
        let (mut storage, handle) = InMemoryStorage::new();
        handle.fail_next_commit("disk full");
        let err = storage.commit_batch(StorageBatch::new()).unwrap_err();
        assert!(matches!(err, StorageError::CommitFailed { .. }));
        assert!(storage.commit_batch(StorageBatch::new()).is_ok());
    }
}
