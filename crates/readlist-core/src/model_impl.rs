//! Single-store reading list model
//!
//! `ReadingListModelImpl` owns the entries of one storage scope (the
//! local-or-syncable store or the account store), keeps the unread, read and
//! unseen counters up to date incrementally, and forwards every mutation to:
//!
//! - the storage layer, through the currently open `StorageBatch`
//! - the sync bridge, unless the mutation came from sync
//!
//! ## Lifecycle
//!
//! ```text
//! Loading --(load ok)--> Loaded --(shutdown)--> ShutDown
//!    \--(load error)--> LoadFailed
//! ```
//!
//! Loading starts in `new` and completes through the storage layer's one-shot
//! callback. A load error is reported to the bridge and never retried here.
//!
//! ## Sync-facing operations
//!
//! Changes coming from sync go through [`SyncBatchUpdate`], which can only be
//! obtained by opening a batch scope, so they can never run outside of one.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::entry::{
    collapse_whitespace, is_url_supported, DistillationState, EntrySource, ReadingListEntry,
};
use crate::error::ModelError;
use crate::model::{BatchScopeGuard, ReadingListModel, ScopedBatchUpdate};
use crate::observer::{ObserverList, ReadingListModelObserver};
use crate::storage::{
    LoadedData, MetadataChangeList, ReadingListModelStorage, StorageBatch, StorageResult,
};
use crate::sync::ReadingListSyncBridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Loading,
    Loaded,
    LoadFailed,
    ShutDown,
}

/// How an in-place mutation is announced to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Update,
    /// Read status changes move an entry between the read/unread partitions
    Move,
}

struct State {
    lifecycle: Lifecycle,
    entries: HashMap<Url, ReadingListEntry>,
    unread_count: usize,
    read_count: usize,
    unseen_count: usize,
    batch_depth: usize,
    storage_batch: Option<StorageBatch>,
    storage_batch_refs: usize,
}

impl State {
    fn on_entry_insertion(&mut self, entry: &ReadingListEntry) {
        if !entry.has_been_seen() {
            self.unseen_count += 1;
        }
        if entry.is_read() {
            self.read_count += 1;
        } else {
            self.unread_count += 1;
        }
    }

    fn on_entry_removal(&mut self, entry: &ReadingListEntry) {
        if !entry.has_been_seen() {
            self.unseen_count -= 1;
        }
        if entry.is_read() {
            self.read_count -= 1;
        } else {
            self.unread_count -= 1;
        }
    }

    fn check_counters(&self) {
        debug_assert_eq!(
            self.read_count + self.unread_count,
            self.entries.len(),
            "read/unread counters out of sync with entries"
        );
        debug_assert!(self.unseen_count <= self.unread_count);
    }
}

/// Reading list model for a single storage scope
pub struct ReadingListModelImpl {
    weak_self: Weak<ReadingListModelImpl>,
    state: RefCell<State>,
    storage: RefCell<Box<dyn ReadingListModelStorage>>,
    sync_bridge: RefCell<Box<dyn ReadingListSyncBridge>>,
    clock: Rc<dyn Clock>,
    observers: ObserverList,
}

impl ReadingListModelImpl {
    /// Create the model and start loading from `storage`
    ///
    /// If the storage layer completes the load synchronously the model is
    /// already loaded when this returns.
    pub fn new(
        storage: Box<dyn ReadingListModelStorage>,
        sync_bridge: Box<dyn ReadingListSyncBridge>,
        clock: Rc<dyn Clock>,
    ) -> Rc<Self> {
        let model = Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            state: RefCell::new(State {
                lifecycle: Lifecycle::Loading,
                entries: HashMap::new(),
                unread_count: 0,
                read_count: 0,
                unseen_count: 0,
                batch_depth: 0,
                storage_batch: None,
                storage_batch_refs: 0,
            }),
            storage: RefCell::new(storage),
            sync_bridge: RefCell::new(sync_bridge),
            clock,
            observers: ObserverList::new(),
        });
        model.start_loading();
        model
    }

    fn start_loading(&self) {
        debug!("Loading reading list storage");
        let weak_self = self.weak_self.clone();
        self.storage.borrow_mut().load(
            self.clock.clone(),
            Box::new(move |result| {
                if let Some(model) = weak_self.upgrade() {
                    model.store_loaded(result);
                }
            }),
        );
    }

    fn store_loaded(&self, result: StorageResult<LoadedData>) {
        let lifecycle = self.state.borrow().lifecycle;
        assert_ne!(lifecycle, Lifecycle::Loaded, "model loaded twice");
        if lifecycle != Lifecycle::Loading {
            debug!(?lifecycle, "Ignoring load completion after shutdown");
            return;
        }

        let data = match result {
            Ok(data) => data,
            Err(error) => {
                warn!("Reading list load failed: {}", error);
                self.state.borrow_mut().lifecycle = Lifecycle::LoadFailed;
                self.sync_bridge
                    .borrow_mut()
                    .report_error(ModelError::Load(error));
                return;
            }
        };

        let count = {
            let mut state = self.state.borrow_mut();
            for (url, entry) in data.entries {
                if !is_url_supported(&url) || entry.url() != &url {
                    warn!("Dropping stored entry with unsupported key {}", url);
                    continue;
                }
                state.on_entry_insertion(&entry);
                state.entries.insert(url, entry);
            }
            state.check_counters();
            state.lifecycle = Lifecycle::Loaded;
            state.entries.len()
        };
        info!(entries = count, "Reading list loaded");

        self.sync_bridge
            .borrow_mut()
            .model_ready_to_sync(data.metadata);
        self.observers.notify(|o| o.model_loaded(self));
    }

    /// Stop serving; the model reports `loaded() == false` afterwards
    pub fn shutdown(&self) {
        debug!("Reading list model shutting down");
        self.observers.notify(|o| o.model_being_shutdown(self));
        self.state.borrow_mut().lifecycle = Lifecycle::ShutDown;
    }

    /// Open a batch scope that also exposes the sync-facing operations
    pub fn begin_batch_updates_with_sync_metadata(&self) -> SyncBatchUpdate<'_> {
        self.begin_batch_scope();
        SyncBatchUpdate { model: self }
    }

    fn assert_loaded(&self) {
        assert!(
            self.loaded(),
            "reading list model used before it finished loading"
        );
    }

    // ==================== Batches ====================

    fn begin_batch_scope(&self) {
        let outermost = {
            let mut state = self.state.borrow_mut();
            state.batch_depth += 1;
            state.batch_depth == 1
        };
        self.acquire_storage_batch();
        if outermost {
            self.observers.notify(|o| o.model_began_batch_updates(self));
        }
    }

    fn end_batch_scope(&self) {
        let outermost = {
            let mut state = self.state.borrow_mut();
            state.batch_depth -= 1;
            state.batch_depth == 0
        };
        self.release_storage_batch();
        if outermost {
            self.observers
                .notify(|o| o.model_completed_batch_updates(self));
        }
    }

    fn acquire_storage_batch(&self) {
        let mut state = self.state.borrow_mut();
        if state.storage_batch_refs == 0 {
            state.storage_batch = Some(StorageBatch::new());
        }
        state.storage_batch_refs += 1;
    }

    fn release_storage_batch(&self) {
        let finished = {
            let mut state = self.state.borrow_mut();
            state.storage_batch_refs -= 1;
            if state.storage_batch_refs == 0 {
                state.storage_batch.take()
            } else {
                None
            }
        };
        if let Some(batch) = finished {
            self.commit(batch);
        }
    }

    fn commit(&self, batch: StorageBatch) {
        if batch.is_empty() {
            return;
        }
        let result = self.storage.borrow_mut().commit_batch(batch);
        if let Err(error) = result {
            warn!("Reading list commit failed: {}", error);
            self.sync_bridge
                .borrow_mut()
                .report_error(ModelError::Storage(error));
        }
    }

    /// Run `f` against the open storage batch, opening one if needed
    fn with_storage_batch<R>(
        &self,
        f: impl FnOnce(&mut StorageBatch, &mut dyn ReadingListSyncBridge) -> R,
    ) -> R {
        self.acquire_storage_batch();
        let result = {
            let mut state = self.state.borrow_mut();
            let batch = state.storage_batch.get_or_insert_with(StorageBatch::new);
            let mut bridge = self.sync_bridge.borrow_mut();
            f(batch, bridge.as_mut())
        };
        self.release_storage_batch();
        result
    }

    // ==================== Mutations ====================

    /// Insert a complete entry; the URL must not be present yet
    pub(crate) fn add_entry(&self, entry: ReadingListEntry, source: EntrySource) -> ReadingListEntry {
        self.assert_loaded();
        let url = entry.url().clone();
        assert!(!self.contains(&url), "entry for {} already exists", url);

        self.observers.notify(|o| o.will_add_entry(self, &entry));
        {
            let mut state = self.state.borrow_mut();
            state.on_entry_insertion(&entry);
            state.entries.insert(url.clone(), entry.clone());
            state.check_counters();
        }
        self.with_storage_batch(|batch, bridge| {
            if source == EntrySource::AddedViaCurrentApp {
                bridge.did_add_or_update_entry(&entry, batch.metadata_change_list());
            }
            batch.save_entry(&entry);
        });
        self.observers.notify(|o| {
            o.did_add_entry(self, &url, source);
            o.did_apply_changes(self);
        });
        entry
    }

    /// Move an unseen entry to unread without touching its update time
    pub(crate) fn mark_entry_seen_if_exists(&self, url: &Url) {
        self.assert_loaded();
        self.mutate_entry(
            url,
            ChangeKind::Update,
            true,
            |entry| entry.has_been_seen(),
            |entry, now| entry.set_read(false, now),
        );
    }

    /// Whether an entry for `url` is stored here
    pub fn contains(&self, url: &Url) -> bool {
        self.state.borrow().entries.contains_key(url)
    }

    /// Remove an entry; removals coming from sync are not echoed to the bridge
    pub(crate) fn remove_entry(&self, url: &Url, from_sync: bool) {
        let entry = self.state.borrow().entries.get(url).cloned();
        let Some(entry) = entry else {
            return;
        };

        self.observers.notify(|o| o.will_remove_entry(self, url));
        self.with_storage_batch(|batch, bridge| {
            if !from_sync {
                bridge.did_remove_entry(&entry, batch.metadata_change_list());
            }
            batch.remove_entry(url);
        });
        {
            let mut state = self.state.borrow_mut();
            state.on_entry_removal(&entry);
            state.entries.remove(url);
            state.check_counters();
        }
        self.observers.notify(|o| {
            o.did_remove_entry(self, url);
            o.did_apply_changes(self);
        });
    }

    /// Mutate an existing entry in place
    ///
    /// Nothing happens (and nobody is notified) if the entry is absent or
    /// `unchanged` says the mutation would be a no-op.
    fn mutate_entry(
        &self,
        url: &Url,
        kind: ChangeKind,
        notify_bridge: bool,
        unchanged: impl FnOnce(&ReadingListEntry) -> bool,
        mutate: impl FnOnce(&mut ReadingListEntry, DateTime<Utc>),
    ) {
        let skip = match self.state.borrow().entries.get(url) {
            Some(entry) => unchanged(entry),
            None => true,
        };
        if skip {
            return;
        }

        self.observers.notify(|o| match kind {
            ChangeKind::Update => o.will_update_entry(self, url),
            ChangeKind::Move => o.will_move_entry(self, url),
        });
        let now = self.clock.now();
        let updated = {
            let mut state = self.state.borrow_mut();
            let Some(mut entry) = state.entries.remove(url) else {
                return;
            };
            state.on_entry_removal(&entry);
            mutate(&mut entry, now);
            state.on_entry_insertion(&entry);
            state.entries.insert(url.clone(), entry.clone());
            state.check_counters();
            entry
        };
        self.with_storage_batch(|batch, bridge| {
            if notify_bridge {
                bridge.did_add_or_update_entry(&updated, batch.metadata_change_list());
            }
            batch.save_entry(&updated);
        });
        self.observers.notify(|o| {
            match kind {
                ChangeKind::Update => o.did_update_entry(self, url),
                ChangeKind::Move => o.did_move_entry(self, url),
            }
            o.did_apply_changes(self);
        });
    }
}

impl ReadingListModel for ReadingListModelImpl {
    fn loaded(&self) -> bool {
        self.state.borrow().lifecycle == Lifecycle::Loaded
    }

    fn is_performing_batch_updates(&self) -> bool {
        self.state.borrow().batch_depth > 0
    }

    fn begin_batch_updates(&self) -> ScopedBatchUpdate<'_> {
        self.begin_batch_scope();
        ScopedBatchUpdate::new(ModelBatchScope { model: self })
    }

    fn get_keys(&self) -> HashSet<Url> {
        self.assert_loaded();
        self.state.borrow().entries.keys().cloned().collect()
    }

    fn size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        self.state.borrow().entries.len()
    }

    fn unread_size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        self.state.borrow().unread_count
    }

    fn unseen_size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        self.state.borrow().unseen_count
    }

    fn mark_all_seen(&self) {
        self.assert_loaded();
        if self.state.borrow().unseen_count == 0 {
            return;
        }
        let _batch = self.begin_batch_updates();
        let unseen: Vec<Url> = self
            .state
            .borrow()
            .entries
            .values()
            .filter(|entry| !entry.has_been_seen())
            .map(|entry| entry.url().clone())
            .collect();
        for url in unseen {
            self.mark_entry_seen_if_exists(&url);
        }
        debug_assert_eq!(self.state.borrow().unseen_count, 0);
    }

    fn delete_all_entries(&self) -> bool {
        if !self.loaded() {
            return false;
        }
        let _batch = self.begin_batch_updates();
        for url in self.get_keys() {
            self.remove_entry_by_url(&url);
        }
        self.size() == 0
    }

    fn get_entry_by_url(&self, url: &Url) -> Option<ReadingListEntry> {
        self.assert_loaded();
        self.state.borrow().entries.get(url).cloned()
    }

    fn is_url_supported(&self, url: &Url) -> bool {
        is_url_supported(url)
    }

    fn is_tracking_sync_metadata(&self) -> bool {
        self.sync_bridge.borrow().is_tracking_sync_metadata()
    }

    fn needs_explicit_upload_to_sync_server(&self, _url: &Url) -> bool {
        false
    }

    fn add_or_replace_entry(
        &self,
        url: &Url,
        title: &str,
        source: EntrySource,
        estimated_read_time: Option<Duration>,
    ) -> ReadingListEntry {
        self.assert_loaded();
        assert!(is_url_supported(url), "unsupported reading list URL {}", url);

        let _replace_batch = if self.contains(url) {
            let batch = self.begin_batch_updates();
            self.remove_entry(url, source == EntrySource::AddedViaSync);
            Some(batch)
        } else {
            None
        };

        let mut entry = ReadingListEntry::new(url.clone(), title, self.clock.now());
        if let Some(estimate) = estimated_read_time.filter(|d| !d.is_zero()) {
            entry.set_estimated_read_time(Some(estimate));
        }
        self.add_entry(entry, source)
    }

    fn remove_entry_by_url(&self, url: &Url) {
        self.assert_loaded();
        self.remove_entry(url, false);
    }

    fn set_read_status_if_exists(&self, url: &Url, read: bool) {
        self.assert_loaded();
        self.mutate_entry(
            url,
            ChangeKind::Move,
            true,
            |entry| entry.is_read() == read,
            |entry, now| {
                entry.set_read(read, now);
                entry.mark_entry_updated(now);
            },
        );
    }

    fn set_entry_title_if_exists(&self, url: &Url, title: &str) {
        self.assert_loaded();
        let title = collapse_whitespace(title);
        self.mutate_entry(
            url,
            ChangeKind::Update,
            true,
            |entry| entry.title() == title,
            |entry, now| entry.set_title(&title, now),
        );
    }

    fn set_estimated_read_time_if_exists(&self, url: &Url, estimated_read_time: Option<Duration>) {
        self.assert_loaded();
        self.mutate_entry(
            url,
            ChangeKind::Update,
            true,
            |entry| entry.estimated_read_time() == estimated_read_time,
            |entry, _| entry.set_estimated_read_time(estimated_read_time),
        );
    }

    fn set_entry_distilled_state_if_exists(&self, url: &Url, state: DistillationState) {
        self.assert_loaded();
        self.mutate_entry(
            url,
            ChangeKind::Update,
            true,
            |entry| entry.distilled_state() == state,
            |entry, _| entry.set_distilled_state(state),
        );
    }

    fn set_entry_distilled_info_if_exists(
        &self,
        url: &Url,
        distilled_path: &Path,
        distilled_url: &Url,
        distillation_size: u64,
        distillation_time: DateTime<Utc>,
    ) {
        self.assert_loaded();
        self.mutate_entry(
            url,
            ChangeKind::Update,
            true,
            |entry| entry.has_distilled_info(distilled_path, distilled_url),
            |entry, _| {
                entry.set_distilled_info(
                    distilled_path,
                    distilled_url,
                    distillation_size,
                    distillation_time,
                )
            },
        );
    }

    fn add_observer(&self, observer: Rc<dyn ReadingListModelObserver>) {
        self.observers.add(&observer);
        if self.loaded() {
            observer.model_loaded(self);
        }
    }

    fn remove_observer(&self, observer: &Rc<dyn ReadingListModelObserver>) {
        self.observers.remove(observer);
    }
}

impl Drop for ReadingListModelImpl {
    fn drop(&mut self) {
        let model: &dyn ReadingListModel = self;
        self.observers.notify(|o| o.model_being_deleted(model));
    }
}

struct ModelBatchScope<'a> {
    model: &'a ReadingListModelImpl,
}

impl BatchScopeGuard for ModelBatchScope<'_> {}

impl Drop for ModelBatchScope<'_> {
    fn drop(&mut self) {
        self.model.end_batch_scope();
    }
}

/// Batch scope used by the sync bridge to apply remote changes
///
/// None of these operations echo back to the bridge.
#[must_use = "the batch update ends as soon as this is dropped"]
pub struct SyncBatchUpdate<'a> {
    model: &'a ReadingListModelImpl,
}

impl SyncBatchUpdate<'_> {
    /// Add an entry received from sync; its URL must not exist yet
    pub fn sync_add_entry(&self, entry: ReadingListEntry) -> ReadingListEntry {
        self.model.add_entry(entry, EntrySource::AddedViaSync)
    }

    /// Merge a remote copy into the existing entry for its URL
    ///
    /// Announced as a move, since the read state may change.
    pub fn sync_merge_entry(&self, entry: ReadingListEntry) -> ReadingListEntry {
        self.model.assert_loaded();
        let url = entry.url().clone();
        assert!(
            self.model.contains(&url),
            "sync merge for unknown entry {}",
            url
        );
        self.model.mutate_entry(
            &url,
            ChangeKind::Move,
            false,
            |_| false,
            |existing, _| existing.merge_with_entry(&entry),
        );
        self.model
            .state
            .borrow()
            .entries
            .get(&url)
            .cloned()
            .unwrap_or(entry)
    }

    /// Remove an entry because sync deleted it
    pub fn sync_remove_entry(&self, url: &Url) {
        self.model.assert_loaded();
        self.model.remove_entry(url, true);
    }

    /// Record sync metadata in the transaction of this batch
    pub fn with_metadata_change_list<R>(&self, f: impl FnOnce(&mut MetadataChangeList) -> R) -> R {
        self.model.with_storage_batch(|batch, _| f(batch.metadata_change_list()))
    }

    pub fn model(&self) -> &ReadingListModelImpl {
        self.model
    }
}

impl Drop for SyncBatchUpdate<'_> {
    fn drop(&mut self) {
        self.model.end_batch_scope();
    }
}
