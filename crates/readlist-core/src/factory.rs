//! Builds the reading list model graph
//!
//! Collaborators are passed in explicitly; nothing here is global. With
//! account storage enabled the result is a [`DualReadingListModel`] over two
//! single-store models, otherwise a plain [`ReadingListModelImpl`].

use std::rc::Rc;

use tracing::debug;

use crate::clock::Clock;
use crate::config::Config;
use crate::dual_model::DualReadingListModel;
use crate::model::ReadingListModel;
use crate::model_impl::ReadingListModelImpl;
use crate::storage::ReadingListModelStorage;
use crate::sync::ReadingListSyncBridge;

/// Storage layer and sync bridge backing one store
pub struct StoreParts {
    pub storage: Box<dyn ReadingListModelStorage>,
    pub sync_bridge: Box<dyn ReadingListSyncBridge>,
}

impl StoreParts {
    pub fn new(
        storage: impl ReadingListModelStorage + 'static,
        sync_bridge: impl ReadingListSyncBridge + 'static,
    ) -> Self {
        Self {
            storage: Box::new(storage),
            sync_bridge: Box::new(sync_bridge),
        }
    }

    fn into_model(self, clock: Rc<dyn Clock>) -> Rc<ReadingListModelImpl> {
        ReadingListModelImpl::new(self.storage, self.sync_bridge, clock)
    }
}

/// Build the model callers should talk to
///
/// `account` is ignored when account storage is disabled.
pub fn build_reading_list_model(
    config: &Config,
    clock: Rc<dyn Clock>,
    local_or_syncable: StoreParts,
    account: Option<StoreParts>,
) -> Rc<dyn ReadingListModel> {
    match account {
        Some(account) if config.account_storage_enabled => {
            debug!("Building dual reading list model");
            build_dual_model(clock, local_or_syncable, account)
        }
        _ => {
            debug!("Building single-store reading list model");
            local_or_syncable.into_model(clock)
        }
    }
}

/// Build a dual model over a local-or-syncable store and an account store
pub fn build_dual_model(
    clock: Rc<dyn Clock>,
    local_or_syncable: StoreParts,
    account: StoreParts,
) -> Rc<DualReadingListModel> {
    let local_or_syncable = local_or_syncable.into_model(clock.clone());
    let account = account.into_model(clock);
    DualReadingListModel::new(local_or_syncable, account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::entry::EntrySource;
    use crate::model::StorageState;
    use crate::storage::InMemoryStorage;
    use crate::sync::RecordingSyncBridge;
    use url::Url;

    fn parts() -> StoreParts {
        let (storage, _) = InMemoryStorage::new();
        let (bridge, _) = RecordingSyncBridge::new();
        StoreParts::new(storage, bridge)
    }

    #[test]
    fn test_builds_dual_model_when_enabled() {
        let clock: Rc<dyn Clock> = Rc::new(TestClock::default());
        let model = build_reading_list_model(&Config::default(), clock, parts(), Some(parts()));
        assert!(model.loaded());

        let url = Url::parse("https://example.com").unwrap();
        model.add_or_replace_entry(&url, "Example", EntrySource::AddedViaCurrentApp, None);
        assert_eq!(model.size(), 1);
    }

    #[test]
    fn test_builds_single_model_when_disabled() {
        let clock: Rc<dyn Clock> = Rc::new(TestClock::default());
        let config = Config {
            account_storage_enabled: false,
            ..Config::default()
        };
        let (account_storage, account_handle) = InMemoryStorage::new();
        let (account_bridge, _) = RecordingSyncBridge::new();
        let model = build_reading_list_model(
            &config,
            clock,
            parts(),
            Some(StoreParts::new(account_storage, account_bridge)),
        );

        let url = Url::parse("https://example.com").unwrap();
        model.add_or_replace_entry(&url, "Example", EntrySource::AddedViaCurrentApp, None);
        assert_eq!(model.size(), 1);
        // The account parts were never used
        assert_eq!(account_handle.commit_count(), 0);
    }

    #[test]
    fn test_dual_model_shares_clock_and_loads_both() {
        let clock: Rc<dyn Clock> = Rc::new(TestClock::default());
        let dual = build_dual_model(clock, parts(), parts());
        assert!(dual.local_or_syncable_model().loaded());
        assert!(dual.account_model().loaded());
        assert_eq!(
            dual.get_storage_state_for_url(&Url::parse("https://a.com").unwrap()),
            StorageState::NotFound
        );
    }
}
