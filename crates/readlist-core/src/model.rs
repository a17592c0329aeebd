//! The reading list model contract
//!
//! `ReadingListModel` is implemented by the single-store
//! [`ReadingListModelImpl`](crate::ReadingListModelImpl) and by the
//! [`DualReadingListModel`](crate::DualReadingListModel) facade. Callers work
//! against the trait and do not need to know which one they hold.
//!
//! ## Preconditions
//!
//! Everything except observer registration, `loaded`, `is_url_supported`,
//! the size queries and `begin_batch_updates` requires `loaded()`. Breaking
//! a precondition is a programming error and panics.

use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::entry::{DistillationState, EntrySource, ReadingListEntry};
use crate::observer::ReadingListModelObserver;

/// Which backing stores of a dual model hold a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageState {
    NotFound,
    ExistsInLocalOrSyncableModelOnly,
    ExistsInAccountModelOnly,
    ExistsInBothModels,
}

/// Implemented by the values that keep a batch-update scope open
pub(crate) trait BatchScopeGuard {}

/// Open batch-update scope
///
/// Nested scopes collapse: observers see one began/completed pair for the
/// outermost scope. The scope ends when this value is dropped.
#[must_use = "the batch update ends as soon as this is dropped"]
pub struct ScopedBatchUpdate<'a> {
    _guard: Box<dyn BatchScopeGuard + 'a>,
}

impl<'a> ScopedBatchUpdate<'a> {
    pub(crate) fn new(guard: impl BatchScopeGuard + 'a) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

/// A reading list: URL-keyed entries with observers and batch updates
pub trait ReadingListModel {
    /// Whether the initial load has completed
    fn loaded(&self) -> bool;

    fn is_performing_batch_updates(&self) -> bool;

    fn begin_batch_updates(&self) -> ScopedBatchUpdate<'_>;

    /// Snapshot of all stored URLs
    fn get_keys(&self) -> HashSet<Url>;

    /// Number of entries (0 before load)
    fn size(&self) -> usize;

    /// Number of entries not yet read (0 before load)
    fn unread_size(&self) -> usize;

    /// Number of entries never surfaced to the user (0 before load)
    fn unseen_size(&self) -> usize;

    /// Mark every unseen entry as seen (unread)
    fn mark_all_seen(&self);

    /// Remove every entry; returns whether the model ended up empty
    fn delete_all_entries(&self) -> bool;

    fn get_entry_by_url(&self, url: &Url) -> Option<ReadingListEntry>;

    fn is_url_supported(&self, url: &Url) -> bool;

    /// Whether sync is authoritative for this model's data
    fn is_tracking_sync_metadata(&self) -> bool;

    /// Whether a local entry still has to be uploaded to the account
    fn needs_explicit_upload_to_sync_server(&self, url: &Url) -> bool;

    /// Add an entry, replacing any entry with the same URL
    ///
    /// Replacing is a full removal followed by an addition, never an update.
    fn add_or_replace_entry(
        &self,
        url: &Url,
        title: &str,
        source: EntrySource,
        estimated_read_time: Option<Duration>,
    ) -> ReadingListEntry;

    /// Remove an entry; absent URLs are ignored
    fn remove_entry_by_url(&self, url: &Url);

    fn set_read_status_if_exists(&self, url: &Url, read: bool);

    fn set_entry_title_if_exists(&self, url: &Url, title: &str);

    fn set_estimated_read_time_if_exists(&self, url: &Url, estimated_read_time: Option<Duration>);

    fn set_entry_distilled_state_if_exists(&self, url: &Url, state: DistillationState);

    fn set_entry_distilled_info_if_exists(
        &self,
        url: &Url,
        distilled_path: &Path,
        distilled_url: &Url,
        distillation_size: u64,
        distillation_time: DateTime<Utc>,
    );

    /// Register an observer (held weakly)
    ///
    /// If the model is already loaded the observer is told right away.
    fn add_observer(&self, observer: Rc<dyn ReadingListModelObserver>);

    fn remove_observer(&self, observer: &Rc<dyn ReadingListModelObserver>);
}
