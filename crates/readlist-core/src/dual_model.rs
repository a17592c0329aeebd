//! Dual reading list model
//!
//! `DualReadingListModel` puts a local-or-syncable store and an account store
//! behind one `ReadingListModel`. A URL can live in either store or in both;
//! reads merge the two views, writes go to whichever store sync treats as
//! authoritative.
//!
//! ## Notifications
//!
//! The dual model observes both inner stores through a relay and re-emits one
//! stream to its own observers:
//!
//! - batch began/completed only when the combined depth goes 0 -> 1 / 1 -> 0
//! - loaded once, when the second store finishes loading
//! - entry notifications pass through unchanged, except while the dual model
//!   itself runs an operation spanning both stores. During that window the
//!   inner entry notifications (and their `did_apply_changes`) are dropped and
//!   the dual model emits a single sequence of its own.

use std::cell::Cell;
use std::collections::HashSet;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use crate::entry::{collapse_whitespace, DistillationState, EntrySource, ReadingListEntry};
use crate::model::{BatchScopeGuard, ReadingListModel, ScopedBatchUpdate, StorageState};
use crate::model_impl::ReadingListModelImpl;
use crate::observer::{ObserverList, ReadingListModelObserver};

/// Dual-model operation currently spanning both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OngoingOperation {
    Idle,
    RemovingEntry,
    UpdatingEntry,
    MovingEntryToAccount,
}

/// Scoped ownership of the suppression window
///
/// Inner entry notifications are dropped for as long as this guard lives.
struct SuppressionGuard<'a> {
    slot: &'a Cell<OngoingOperation>,
}

impl<'a> SuppressionGuard<'a> {
    fn enter(slot: &'a Cell<OngoingOperation>, operation: OngoingOperation) -> Self {
        assert_eq!(
            slot.get(),
            OngoingOperation::Idle,
            "dual model operations must not nest"
        );
        slot.set(operation);
        Self { slot }
    }
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.slot.set(OngoingOperation::Idle);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Update,
    Move,
}

/// Reading list spanning a local-or-syncable store and an account store
pub struct DualReadingListModel {
    local_or_syncable: Rc<ReadingListModelImpl>,
    account: Rc<ReadingListModelImpl>,
    // Registered weakly with both inner stores; kept alive here
    _relay: Rc<dyn ReadingListModelObserver>,
    batch_depth: Cell<usize>,
    ongoing: Cell<OngoingOperation>,
    observers: ObserverList,
}

impl DualReadingListModel {
    /// Compose two single-store models
    pub fn new(
        local_or_syncable: Rc<ReadingListModelImpl>,
        account: Rc<ReadingListModelImpl>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| {
            let relay: Rc<dyn ReadingListModelObserver> = Rc::new(InnerModelRelay {
                dual: weak_self.clone(),
            });
            local_or_syncable.add_observer(relay.clone());
            account.add_observer(relay.clone());
            // A store already inside a batch will still report its completion
            let open_batches = [&local_or_syncable, &account]
                .iter()
                .filter(|store| store.is_performing_batch_updates())
                .count();
            Self {
                local_or_syncable,
                account,
                _relay: relay,
                batch_depth: Cell::new(open_batches),
                ongoing: Cell::new(OngoingOperation::Idle),
                observers: ObserverList::new(),
            }
        })
    }

    pub fn local_or_syncable_model(&self) -> &Rc<ReadingListModelImpl> {
        &self.local_or_syncable
    }

    pub fn account_model(&self) -> &Rc<ReadingListModelImpl> {
        &self.account
    }

    /// Which stores currently hold `url`
    pub fn get_storage_state_for_url(&self, url: &Url) -> StorageState {
        match (
            self.local_or_syncable.contains(url),
            self.account.contains(url),
        ) {
            (false, false) => StorageState::NotFound,
            (true, false) => StorageState::ExistsInLocalOrSyncableModelOnly,
            (false, true) => StorageState::ExistsInAccountModelOnly,
            (true, true) => StorageState::ExistsInBothModels,
        }
    }

    /// Move every local-only entry into the account store
    ///
    /// Only does something while the account store tracks sync metadata. The
    /// moved entries keep all their fields and are uploaded by the account
    /// store's bridge. Observers see one move per URL.
    pub fn mark_all_for_upload_to_sync_server_if_needed(&self) {
        self.assert_loaded();
        if !self.account.is_tracking_sync_metadata() {
            return;
        }
        let mut local_only: Vec<Url> = self
            .local_or_syncable
            .get_keys()
            .into_iter()
            .filter(|url| !self.account.contains(url))
            .collect();
        if local_only.is_empty() {
            return;
        }
        local_only.sort();
        debug!(count = local_only.len(), "Moving local entries to account store");

        let _batch = self.begin_batch_updates();
        for url in local_only {
            let Some(entry) = self.local_or_syncable.get_entry_by_url(&url) else {
                continue;
            };
            self.observers.notify(|o| o.will_move_entry(self, &url));
            {
                let _guard =
                    SuppressionGuard::enter(&self.ongoing, OngoingOperation::MovingEntryToAccount);
                self.account
                    .add_entry(entry, EntrySource::AddedViaCurrentApp);
                self.local_or_syncable.remove_entry_by_url(&url);
            }
            self.observers.notify(|o| {
                o.did_move_entry(self, &url);
                o.did_apply_changes(self);
            });
        }
    }

    /// Shut down both stores
    pub fn shutdown(&self) {
        self.observers.notify(|o| o.model_being_shutdown(self));
        self.local_or_syncable.shutdown();
        self.account.shutdown();
    }

    fn assert_loaded(&self) {
        assert!(
            self.loaded(),
            "reading list model used before it finished loading"
        );
    }

    fn stores(&self) -> [&ReadingListModelImpl; 2] {
        [&*self.local_or_syncable, &*self.account]
    }

    /// Remove `url` from every store, announced as a single removal
    fn remove_from_both_stores(&self, url: &Url, from_sync: bool) {
        if self.get_storage_state_for_url(url) == StorageState::NotFound {
            return;
        }

        self.observers.notify(|o| o.will_remove_entry(self, url));
        {
            let _guard = SuppressionGuard::enter(&self.ongoing, OngoingOperation::RemovingEntry);
            for store in self.stores() {
                store.remove_entry(url, from_sync);
            }
        }
        self.observers.notify(|o| {
            o.did_remove_entry(self, url);
            o.did_apply_changes(self);
        });
    }

    fn suppressing(&self) -> bool {
        self.ongoing.get() != OngoingOperation::Idle
    }

    /// Apply a change to every store holding `url`, announced once
    ///
    /// No-op unless at least one stored copy would change.
    fn update_in_all_stores(
        &self,
        url: &Url,
        kind: ChangeKind,
        would_change: impl Fn(&ReadingListEntry) -> bool,
        apply: impl Fn(&ReadingListModelImpl),
    ) {
        self.assert_loaded();
        let changes = self.stores().iter().any(|store| {
            store
                .get_entry_by_url(url)
                .is_some_and(|entry| would_change(&entry))
        });
        if !changes {
            return;
        }

        self.observers.notify(|o| match kind {
            ChangeKind::Update => o.will_update_entry(self, url),
            ChangeKind::Move => o.will_move_entry(self, url),
        });
        {
            let _guard = SuppressionGuard::enter(&self.ongoing, OngoingOperation::UpdatingEntry);
            for store in self.stores() {
                apply(store);
            }
        }
        self.observers.notify(|o| {
            match kind {
                ChangeKind::Update => o.did_update_entry(self, url),
                ChangeKind::Move => o.did_move_entry(self, url),
            }
            o.did_apply_changes(self);
        });
    }

    /// Merged view over the union of both stores
    fn merged_entries(&self) -> impl Iterator<Item = ReadingListEntry> + '_ {
        self.get_keys()
            .into_iter()
            .filter_map(move |url| self.get_entry_by_url(&url))
    }

    // ==================== Relay callbacks ====================

    fn on_inner_loaded(&self) {
        if self.loaded() {
            debug!("Both reading list stores loaded");
            self.observers.notify(|o| o.model_loaded(self));
        }
    }

    fn on_inner_began_batch(&self) {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        if depth == 1 {
            self.observers.notify(|o| o.model_began_batch_updates(self));
        }
    }

    fn on_inner_completed_batch(&self) {
        let Some(depth) = self.batch_depth.get().checked_sub(1) else {
            debug_assert!(false, "inner batch completed without beginning");
            return;
        };
        self.batch_depth.set(depth);
        if depth == 0 {
            self.observers
                .notify(|o| o.model_completed_batch_updates(self));
        }
    }

    /// Forward an inner entry notification unless suppressed
    fn forward(&self, f: impl FnMut(&dyn ReadingListModelObserver)) {
        if self.suppressing() {
            return;
        }
        self.observers.notify(f);
    }
}

impl ReadingListModel for DualReadingListModel {
    fn loaded(&self) -> bool {
        self.local_or_syncable.loaded() && self.account.loaded()
    }

    fn is_performing_batch_updates(&self) -> bool {
        self.batch_depth.get() > 0
    }

    fn begin_batch_updates(&self) -> ScopedBatchUpdate<'_> {
        ScopedBatchUpdate::new(DualBatchScope {
            _local_or_syncable: self.local_or_syncable.begin_batch_updates(),
            _account: self.account.begin_batch_updates(),
        })
    }

    fn get_keys(&self) -> HashSet<Url> {
        self.assert_loaded();
        let mut keys = self.local_or_syncable.get_keys();
        keys.extend(self.account.get_keys());
        keys
    }

    fn size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        let local_size = self.local_or_syncable.size();
        let account_size = self.account.size();
        if local_size == 0 {
            return account_size;
        }
        if account_size == 0 {
            return local_size;
        }
        self.get_keys().len()
    }

    fn unread_size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        if self.account.size() == 0 {
            return self.local_or_syncable.unread_size();
        }
        if self.local_or_syncable.size() == 0 {
            return self.account.unread_size();
        }
        self.merged_entries().filter(|e| !e.is_read()).count()
    }

    fn unseen_size(&self) -> usize {
        if !self.loaded() {
            return 0;
        }
        if self.account.size() == 0 {
            return self.local_or_syncable.unseen_size();
        }
        if self.local_or_syncable.size() == 0 {
            return self.account.unseen_size();
        }
        self.merged_entries().filter(|e| !e.has_been_seen()).count()
    }

    fn mark_all_seen(&self) {
        self.assert_loaded();
        if self.local_or_syncable.unseen_size() == 0 && self.account.unseen_size() == 0 {
            return;
        }
        let _batch = self.begin_batch_updates();
        let mut keys: Vec<Url> = self.get_keys().into_iter().collect();
        keys.sort();
        for url in keys {
            self.update_in_all_stores(
                &url,
                ChangeKind::Update,
                |entry| !entry.has_been_seen(),
                |store| store.mark_entry_seen_if_exists(&url),
            );
        }
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
        match (
            self.local_or_syncable.get_entry_by_url(url),
            self.account.get_entry_by_url(url),
        ) {
            (None, None) => None,
            (Some(entry), None) | (None, Some(entry)) => Some(entry),
            (Some(mut local), Some(account)) => {
                let local_state = local.distilled_state();
                local.merge_keeping_distillation(&account);
                debug_assert_eq!(local.distilled_state(), local_state);
                Some(local)
            }
        }
    }

    fn is_url_supported(&self, url: &Url) -> bool {
        let supported = self.local_or_syncable.is_url_supported(url);
        assert_eq!(
            supported,
            self.account.is_url_supported(url),
            "stores disagree on URL support for {}",
            url
        );
        supported
    }

    fn is_tracking_sync_metadata(&self) -> bool {
        self.local_or_syncable.is_tracking_sync_metadata() || self.account.is_tracking_sync_metadata()
    }

    fn needs_explicit_upload_to_sync_server(&self, url: &Url) -> bool {
        let account_tracking = self.account.is_tracking_sync_metadata();
        assert!(
            !(account_tracking && self.local_or_syncable.is_tracking_sync_metadata()),
            "both reading list stores are tracking sync metadata"
        );
        account_tracking && self.local_or_syncable.contains(url) && !self.account.contains(url)
    }

    fn add_or_replace_entry(
        &self,
        url: &Url,
        title: &str,
        source: EntrySource,
        estimated_read_time: Option<Duration>,
    ) -> ReadingListEntry {
        self.assert_loaded();
        let _replace_batch = if self.get_storage_state_for_url(url) != StorageState::NotFound {
            let batch = self.begin_batch_updates();
            self.remove_from_both_stores(url, source == EntrySource::AddedViaSync);
            Some(batch)
        } else {
            None
        };

        let destination = if self.account.is_tracking_sync_metadata() {
            &self.account
        } else {
            &self.local_or_syncable
        };
        destination.add_or_replace_entry(url, title, source, estimated_read_time)
    }

    fn remove_entry_by_url(&self, url: &Url) {
        self.assert_loaded();
        self.remove_from_both_stores(url, false);
    }

    fn set_read_status_if_exists(&self, url: &Url, read: bool) {
        self.update_in_all_stores(
            url,
            ChangeKind::Move,
            |entry| entry.is_read() != read,
            |store| store.set_read_status_if_exists(url, read),
        );
    }

    fn set_entry_title_if_exists(&self, url: &Url, title: &str) {
        let collapsed = collapse_whitespace(title);
        self.update_in_all_stores(
            url,
            ChangeKind::Update,
            |entry| entry.title() != collapsed,
            |store| store.set_entry_title_if_exists(url, &collapsed),
        );
    }

    fn set_estimated_read_time_if_exists(&self, url: &Url, estimated_read_time: Option<Duration>) {
        self.update_in_all_stores(
            url,
            ChangeKind::Update,
            |entry| entry.estimated_read_time() != estimated_read_time,
            |store| store.set_estimated_read_time_if_exists(url, estimated_read_time),
        );
    }

    fn set_entry_distilled_state_if_exists(&self, url: &Url, state: DistillationState) {
        self.update_in_all_stores(
            url,
            ChangeKind::Update,
            |entry| entry.distilled_state() != state,
            |store| store.set_entry_distilled_state_if_exists(url, state),
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
        self.update_in_all_stores(
            url,
            ChangeKind::Update,
            |entry| !entry.has_distilled_info(distilled_path, distilled_url),
            |store| {
                store.set_entry_distilled_info_if_exists(
                    url,
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

impl Drop for DualReadingListModel {
    fn drop(&mut self) {
        let model: &dyn ReadingListModel = self;
        self.observers.notify(|o| o.model_being_deleted(model));
    }
}

/// Both inner batch scopes, released together
struct DualBatchScope<'a> {
    _local_or_syncable: ScopedBatchUpdate<'a>,
    _account: ScopedBatchUpdate<'a>,
}

impl BatchScopeGuard for DualBatchScope<'_> {}

/// Observer registered with both inner stores
struct InnerModelRelay {
    dual: Weak<DualReadingListModel>,
}

impl InnerModelRelay {
    fn with_dual(&self, f: impl FnOnce(&DualReadingListModel)) {
        if let Some(dual) = self.dual.upgrade() {
            f(&*dual);
        }
    }
}

impl ReadingListModelObserver for InnerModelRelay {
    fn model_loaded(&self, _model: &dyn ReadingListModel) {
        self.with_dual(|dual| dual.on_inner_loaded());
    }

    fn model_began_batch_updates(&self, _model: &dyn ReadingListModel) {
        self.with_dual(|dual| dual.on_inner_began_batch());
    }

    fn model_completed_batch_updates(&self, _model: &dyn ReadingListModel) {
        self.with_dual(|dual| dual.on_inner_completed_batch());
    }

    fn will_add_entry(&self, _model: &dyn ReadingListModel, entry: &ReadingListEntry) {
        self.with_dual(|dual| dual.forward(|o| o.will_add_entry(dual, entry)));
    }

    fn did_add_entry(&self, _model: &dyn ReadingListModel, url: &Url, source: EntrySource) {
        self.with_dual(|dual| dual.forward(|o| o.did_add_entry(dual, url, source)));
    }

    fn will_remove_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.will_remove_entry(dual, url)));
    }

    fn did_remove_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.did_remove_entry(dual, url)));
    }

    fn will_update_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.will_update_entry(dual, url)));
    }

    fn did_update_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.did_update_entry(dual, url)));
    }

    fn will_move_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.will_move_entry(dual, url)));
    }

    fn did_move_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.with_dual(|dual| dual.forward(|o| o.did_move_entry(dual, url)));
    }

    fn did_apply_changes(&self, _model: &dyn ReadingListModel) {
        self.with_dual(|dual| dual.forward(|o| o.did_apply_changes(dual)));
    }
}
