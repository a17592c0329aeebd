//! Replay command: run a scripted sequence of operations against a model
//!
//! The model is built on in-memory collaborators and a manually advanced
//! clock, so a script always produces the same entries and event stream.
//!
//! ```json
//! {
//!   "start_time": "2024-01-01T00:00:00Z",
//!   "steps": [
//!     { "op": "add", "url": "https://example.com", "title": "Example" },
//!     { "op": "set_sync_tracking", "store": "account", "enabled": true },
//!     { "op": "mark_all_for_upload" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use readlist_core::sync::BridgeCall;
use readlist_core::{
    build_dual_model, Clock, Config, DistillationState, DualReadingListModel, EntrySource,
    EventRecorder, InMemoryStorage, InMemoryStorageHandle, ModelEvent, ReadState,
    ReadingListEntry, ReadingListModel, ReadingListModelImpl, RecordingSyncBridge,
    RecordingSyncBridgeHandle, ScopedBatchUpdate, StorageState, StoreParts, TestClock,
};

use crate::output::Output;

/// A replay script
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Initial clock value; a fixed default is used when absent
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Which store of a dual model a sync step targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreName {
    LocalOrSyncable,
    Account,
}

/// One scripted operation
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Add {
        url: Url,
        title: String,
        #[serde(default = "default_source")]
        source: EntrySource,
        #[serde(default)]
        estimated_read_seconds: Option<u64>,
    },
    Remove {
        url: Url,
    },
    SetRead {
        url: Url,
        read: bool,
    },
    SetTitle {
        url: Url,
        title: String,
    },
    SetEstimatedReadTime {
        url: Url,
        seconds: Option<u64>,
    },
    SetDistilledState {
        url: Url,
        state: DistillationState,
    },
    SetDistilledInfo {
        url: Url,
        path: PathBuf,
        distilled_url: Url,
        size: u64,
    },
    MarkAllSeen,
    DeleteAll,
    BeginBatch,
    EndBatch,
    /// Turn sync authority on or off for one store
    SetSyncTracking {
        store: StoreName,
        enabled: bool,
    },
    /// Apply a remote entry to one store, merging if it already exists
    SyncAdd {
        store: StoreName,
        url: Url,
        title: String,
        #[serde(default)]
        read: bool,
    },
    SyncRemove {
        store: StoreName,
        url: Url,
    },
    MarkAllForUpload,
    AdvanceClock {
        seconds: i64,
    },
}

fn default_source() -> EntrySource {
    EntrySource::AddedViaCurrentApp
}

/// Final state of a replayed script
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub entries: Vec<EntryReport>,
    pub size: usize,
    pub unread_size: usize,
    pub unseen_size: usize,
    pub events: Vec<ModelEvent>,
    pub bridge_calls: BridgeReport,
    pub commits: usize,
}

#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub url: Url,
    pub title: String,
    pub state: ReadState,
    pub distilled_state: DistillationState,
    /// Absent when replaying against a single-store model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<StorageState>,
    pub needs_upload: bool,
}

#[derive(Debug, Serialize)]
pub struct BridgeReport {
    pub local_or_syncable: Vec<BridgeCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<Vec<BridgeCall>>,
}

/// Handles kept by the replayer to inspect and steer one store
struct StoreHandles {
    storage: InMemoryStorageHandle,
    bridge: RecordingSyncBridgeHandle,
}

fn in_memory_parts() -> (StoreParts, StoreHandles) {
    let (storage, storage_handle) = InMemoryStorage::new();
    let (bridge, bridge_handle) = RecordingSyncBridge::new();
    (
        StoreParts::new(storage, bridge),
        StoreHandles {
            storage: storage_handle,
            bridge: bridge_handle,
        },
    )
}

/// The model a script runs against
enum Target {
    Dual {
        model: Rc<DualReadingListModel>,
        local: StoreHandles,
        account: StoreHandles,
    },
    Single {
        model: Rc<ReadingListModelImpl>,
        local: StoreHandles,
    },
}

impl Target {
    fn build(account_storage: bool, clock: Rc<dyn Clock>) -> Self {
        let (local_parts, local) = in_memory_parts();
        if account_storage {
            let (account_parts, account) = in_memory_parts();
            Target::Dual {
                model: build_dual_model(clock, local_parts, account_parts),
                local,
                account,
            }
        } else {
            Target::Single {
                model: ReadingListModelImpl::new(
                    local_parts.storage,
                    local_parts.sync_bridge,
                    clock,
                ),
                local,
            }
        }
    }

    fn model(&self) -> &dyn ReadingListModel {
        match self {
            Target::Dual { model, .. } => &**model as &dyn ReadingListModel,
            Target::Single { model, .. } => &**model as &dyn ReadingListModel,
        }
    }

    fn dual(&self) -> Result<&DualReadingListModel> {
        match self {
            Target::Dual { model, .. } => Ok(&**model),
            Target::Single { .. } => bail!("Account storage is disabled; no dual model to act on"),
        }
    }

    fn store(&self, name: StoreName) -> Result<(&ReadingListModelImpl, &StoreHandles)> {
        match (self, name) {
            (Target::Dual { model, local, .. }, StoreName::LocalOrSyncable) => {
                Ok((&**model.local_or_syncable_model(), local))
            }
            (Target::Dual { model, account, .. }, StoreName::Account) => {
                Ok((&**model.account_model(), account))
            }
            (Target::Single { model, local }, StoreName::LocalOrSyncable) => Ok((&**model, local)),
            (Target::Single { .. }, StoreName::Account) => {
                bail!("Account storage is disabled; there is no account store")
            }
        }
    }

    fn storage_state(&self, url: &Url) -> Option<StorageState> {
        match self {
            Target::Dual { model, .. } => Some(model.get_storage_state_for_url(url)),
            Target::Single { .. } => None,
        }
    }

    fn bridge_report(&self) -> BridgeReport {
        match self {
            Target::Dual { local, account, .. } => BridgeReport {
                local_or_syncable: local.bridge.calls(),
                account: Some(account.bridge.calls()),
            },
            Target::Single { local, .. } => BridgeReport {
                local_or_syncable: local.bridge.calls(),
                account: None,
            },
        }
    }

    fn commit_count(&self) -> usize {
        match self {
            Target::Dual { local, account, .. } => {
                local.storage.commit_count() + account.storage.commit_count()
            }
            Target::Single { local, .. } => local.storage.commit_count(),
        }
    }
}

/// Replay the script at `script_path` and print the outcome
pub fn run(script_path: &Path, config: &Config, output: &Output) -> Result<()> {
    let content = std::fs::read_to_string(script_path)
        .with_context(|| format!("Failed to read replay script: {:?}", script_path))?;
    let script = parse_script(&content)
        .with_context(|| format!("Failed to parse replay script: {:?}", script_path))?;

    let report = replay(&script, config.account_storage_enabled)?;
    output.print_report(&report)
}

pub fn parse_script(content: &str) -> Result<Script> {
    serde_json::from_str(content).context("Invalid replay script")
}

/// Run every step of `script` and collect the resulting state
pub fn replay(script: &Script, account_storage: bool) -> Result<ReplayReport> {
    let clock = Rc::new(match script.start_time {
        Some(start) => TestClock::new(start),
        None => TestClock::default(),
    });
    let target = Target::build(account_storage, clock.clone());
    let recorder = EventRecorder::new();
    target.model().add_observer(recorder.clone());

    debug!(
        steps = script.steps.len(),
        account_storage, "Replaying reading list script"
    );
    {
        let mut batches: Vec<ScopedBatchUpdate<'_>> = Vec::new();
        for (index, step) in script.steps.iter().enumerate() {
            apply_step(&target, &clock, &mut batches, step)
                .with_context(|| format!("Step {} ({:?}) failed", index + 1, step))?;
        }
        if !batches.is_empty() {
            debug!(open = batches.len(), "Closing batches left open by the script");
        }
    }

    Ok(build_report(&target, recorder.events()))
}

fn apply_step<'a>(
    target: &'a Target,
    clock: &TestClock,
    batches: &mut Vec<ScopedBatchUpdate<'a>>,
    step: &Step,
) -> Result<()> {
    let model = target.model();
    match step {
        Step::Add {
            url,
            title,
            source,
            estimated_read_seconds,
        } => {
            ensure_supported(model, url)?;
            model.add_or_replace_entry(
                url,
                title,
                *source,
                estimated_read_seconds.map(Duration::from_secs),
            );
        }
        Step::Remove { url } => model.remove_entry_by_url(url),
        Step::SetRead { url, read } => model.set_read_status_if_exists(url, *read),
        Step::SetTitle { url, title } => model.set_entry_title_if_exists(url, title),
        Step::SetEstimatedReadTime { url, seconds } => {
            model.set_estimated_read_time_if_exists(url, seconds.map(Duration::from_secs))
        }
        Step::SetDistilledState { url, state } => {
            if matches!(
                state,
                DistillationState::Processed | DistillationState::NotProcessed
            ) {
                bail!(
                    "Distilled state {:?} cannot be set directly; use set_distilled_info",
                    state
                );
            }
            model.set_entry_distilled_state_if_exists(url, *state);
        }
        Step::SetDistilledInfo {
            url,
            path,
            distilled_url,
            size,
        } => model.set_entry_distilled_info_if_exists(url, path, distilled_url, *size, clock.now()),
        Step::MarkAllSeen => model.mark_all_seen(),
        Step::DeleteAll => {
            if !model.delete_all_entries() {
                warn!("delete_all left entries behind");
            }
        }
        Step::BeginBatch => batches.push(model.begin_batch_updates()),
        Step::EndBatch => {
            if batches.pop().is_none() {
                bail!("end_batch without a matching begin_batch");
            }
        }
        Step::SetSyncTracking { store, enabled } => {
            let (_, handles) = target.store(*store)?;
            if *enabled {
                let other = match store {
                    StoreName::LocalOrSyncable => StoreName::Account,
                    StoreName::Account => StoreName::LocalOrSyncable,
                };
                if let Ok((other_model, _)) = target.store(other) {
                    if other_model.is_tracking_sync_metadata() {
                        bail!("Only one store can track sync metadata at a time");
                    }
                }
            }
            handles.bridge.set_tracking_sync_metadata(*enabled);
        }
        Step::SyncAdd {
            store,
            url,
            title,
            read,
        } => {
            ensure_supported(model, url)?;
            let (inner, _) = target.store(*store)?;
            let mut entry = ReadingListEntry::new(url.clone(), title, clock.now());
            if *read {
                entry.set_read(true, clock.now());
            }
            let batch = inner.begin_batch_updates_with_sync_metadata();
            if inner.contains(url) {
                batch.sync_merge_entry(entry);
            } else {
                batch.sync_add_entry(entry);
            }
        }
        Step::SyncRemove { store, url } => {
            let (inner, _) = target.store(*store)?;
            let batch = inner.begin_batch_updates_with_sync_metadata();
            batch.sync_remove_entry(url);
        }
        Step::MarkAllForUpload => target.dual()?.mark_all_for_upload_to_sync_server_if_needed(),
        Step::AdvanceClock { seconds } => clock.advance(chrono::Duration::seconds(*seconds)),
    }
    Ok(())
}

fn ensure_supported(model: &dyn ReadingListModel, url: &Url) -> Result<()> {
    if !model.is_url_supported(url) {
        bail!("Unsupported URL scheme '{}': {}", url.scheme(), url);
    }
    Ok(())
}

fn build_report(target: &Target, events: Vec<ModelEvent>) -> ReplayReport {
    let model = target.model();
    let mut urls: Vec<Url> = model.get_keys().into_iter().collect();
    urls.sort();

    let entries = urls
        .iter()
        .filter_map(|url| {
            let entry = model.get_entry_by_url(url)?;
            Some(EntryReport {
                url: url.clone(),
                title: entry.title().to_string(),
                state: entry.state(),
                distilled_state: entry.distilled_state(),
                storage_state: target.storage_state(url),
                needs_upload: model.needs_explicit_upload_to_sync_server(url),
            })
        })
        .collect();

    ReplayReport {
        entries,
        size: model.size(),
        unread_size: model.unread_size(),
        unseen_size: model.unseen_size(),
        events,
        bridge_calls: target.bridge_report(),
        commits: target.commit_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use std::io::Write;

    fn run_script(json: &str) -> ReplayReport {
        let script = parse_script(json).unwrap();
        replay(&script, true).unwrap()
    }

    fn count(report: &ReplayReport, event: &ModelEvent) -> usize {
        report.events.iter().filter(|e| *e == event).count()
    }

    #[test]
    fn test_add_lands_in_local_store() {
        let report = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://a.com/", "title": "  A   title "}
            ]}"#,
        );
        assert_eq!(report.size, 1);
        assert_eq!(report.entries[0].title, "A title");
        assert_eq!(report.entries[0].state, ReadState::Unseen);
        assert_eq!(
            report.entries[0].storage_state,
            Some(StorageState::ExistsInLocalOrSyncableModelOnly)
        );
        assert_eq!(report.events[0], ModelEvent::Loaded);
        assert_eq!(
            report.bridge_calls.local_or_syncable,
            vec![
                BridgeCall::ReadyToSync {
                    metadata_entities: 0
                },
                BridgeCall::AddOrUpdate {
                    url: Url::parse("https://a.com/").unwrap()
                },
            ]
        );
    }

    #[test]
    fn test_re_add_moves_entry_to_account() {
        let report = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://a.com/", "title": "A"},
                {"op": "set_sync_tracking", "store": "account", "enabled": true},
                {"op": "add", "url": "https://a.com/", "title": "A"}
            ]}"#,
        );
        assert_eq!(
            report.entries[0].storage_state,
            Some(StorageState::ExistsInAccountModelOnly)
        );
        assert!(!report.entries[0].needs_upload);
        let url = Url::parse("https://a.com/").unwrap();
        assert_eq!(count(&report, &ModelEvent::DidRemove { url }), 1);
    }

    #[test]
    fn test_explicit_upload() {
        let before = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://x.com/", "title": "X"},
                {"op": "set_sync_tracking", "store": "account", "enabled": true}
            ]}"#,
        );
        assert!(before.entries[0].needs_upload);

        let after = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://x.com/", "title": "X"},
                {"op": "set_sync_tracking", "store": "account", "enabled": true},
                {"op": "mark_all_for_upload"}
            ]}"#,
        );
        assert!(!after.entries[0].needs_upload);
        assert_eq!(
            after.entries[0].storage_state,
            Some(StorageState::ExistsInAccountModelOnly)
        );
    }

    #[test]
    fn test_scripted_batch_collapses_notifications() {
        let report = run_script(
            r#"{"steps": [
                {"op": "begin_batch"},
                {"op": "add", "url": "https://a.com/", "title": "A"},
                {"op": "begin_batch"},
                {"op": "add", "url": "https://b.com/", "title": "B"},
                {"op": "end_batch"},
                {"op": "end_batch"}
            ]}"#,
        );
        assert_eq!(count(&report, &ModelEvent::BeganBatchUpdates), 1);
        assert_eq!(count(&report, &ModelEvent::CompletedBatchUpdates), 1);
        assert_eq!(report.size, 2);
    }

    #[test]
    fn test_unbalanced_end_batch_fails() {
        let script = parse_script(r#"{"steps": [{"op": "end_batch"}]}"#).unwrap();
        let err = replay(&script, true).unwrap_err();
        assert!(format!("{:#}", err).contains("without a matching begin_batch"));
    }

    #[test]
    fn test_sync_add_merges_views() {
        let report = run_script(
            r#"{"steps": [
                {"op": "sync_add", "store": "local_or_syncable", "url": "https://a.com/", "title": "Old"},
                {"op": "advance_clock", "seconds": 60},
                {"op": "sync_add", "store": "account", "url": "https://a.com/", "title": "New", "read": true}
            ]}"#,
        );
        let entry = &report.entries[0];
        assert_eq!(entry.title, "New");
        assert_eq!(entry.state, ReadState::Read);
        assert_eq!(entry.storage_state, Some(StorageState::ExistsInBothModels));
        assert_eq!(report.size, 1);
        assert_eq!(report.unread_size, 0);
        // Sync-sourced changes never reach the bridges
        let echoed = report
            .bridge_calls
            .local_or_syncable
            .iter()
            .chain(report.bridge_calls.account.iter().flatten())
            .any(|call| matches!(call, BridgeCall::AddOrUpdate { .. } | BridgeCall::Remove { .. }));
        assert!(!echoed);
    }

    #[test]
    fn test_single_store_mode() {
        let script = parse_script(
            r#"{"steps": [
                {"op": "add", "url": "https://a.com/", "title": "A"},
                {"op": "set_read", "url": "https://a.com/", "read": true}
            ]}"#,
        )
        .unwrap();
        let report = replay(&script, false).unwrap();
        assert_eq!(report.entries[0].storage_state, None);
        assert_eq!(report.unread_size, 0);
        assert!(report.bridge_calls.account.is_none());

        let script = parse_script(r#"{"steps": [{"op": "mark_all_for_upload"}]}"#).unwrap();
        assert!(replay(&script, false).is_err());
    }

    #[test]
    fn test_rejects_second_tracking_store() {
        let script = parse_script(
            r#"{"steps": [
                {"op": "set_sync_tracking", "store": "account", "enabled": true},
                {"op": "set_sync_tracking", "store": "local_or_syncable", "enabled": true}
            ]}"#,
        )
        .unwrap();
        assert!(replay(&script, true).is_err());
    }

    #[test]
    fn test_rejects_unsupported_url() {
        let script = parse_script(
            r#"{"steps": [{"op": "add", "url": "ftp://a.com/", "title": "A"}]}"#,
        )
        .unwrap();
        let err = replay(&script, true).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported URL scheme"));
    }

    #[test]
    fn test_unknown_op_is_a_parse_error() {
        assert!(parse_script(r#"{"steps": [{"op": "explode"}]}"#).is_err());
    }

    #[test]
    fn test_delete_all_and_distillation() {
        let report = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://a.com/", "title": "A", "estimated_read_seconds": 120},
                {"op": "set_distilled_state", "url": "https://a.com/", "state": "processing"},
                {"op": "set_distilled_info", "url": "https://a.com/", "path": "offline/a.html",
                 "distilled_url": "https://a.com/distilled", "size": 10},
                {"op": "add", "url": "https://b.com/", "title": "B"},
                {"op": "mark_all_seen"}
            ]}"#,
        );
        assert_eq!(report.entries[0].distilled_state, DistillationState::Processed);
        assert_eq!(report.unseen_size, 0);

        let report = run_script(
            r#"{"steps": [
                {"op": "add", "url": "https://a.com/", "title": "A"},
                {"op": "add", "url": "https://b.com/", "title": "B"},
                {"op": "delete_all"}
            ]}"#,
        );
        assert_eq!(report.size, 0);
        assert_eq!(count(&report, &ModelEvent::BeganBatchUpdates), 1);
    }

    #[test]
    fn test_run_reads_script_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"steps": [{{"op": "add", "url": "https://a.com/", "title": "A"}}]}}"#
        )
        .unwrap();
        let output = Output::new(OutputFormat::Quiet);
        run(file.path(), &Config::default(), &output).unwrap();

        let missing = run(Path::new("/nonexistent/script.json"), &Config::default(), &output);
        assert!(missing.is_err());
    }
}
