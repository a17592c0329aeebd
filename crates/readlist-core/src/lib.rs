//! readlist core library
//!
//! A reading list kept as URL-keyed entries, possibly split over two stores:
//! a local-or-syncable store and an account-scoped store. The
//! [`DualReadingListModel`] merges both into one logical list and routes writes
//! to whichever store sync treats as authoritative.
//!
//! # Architecture
//!
//! - **Single-store model** (`ReadingListModelImpl`): entries, counters,
//!   batches, storage writes and sync bridge notifications for one store
//! - **Dual model** (`DualReadingListModel`): composition of two single-store
//!   models behind the same `ReadingListModel` trait
//! - **Collaborators**: storage layer, sync bridge and observers are traits,
//!   injected through the `factory`
//!
//! Everything is single-threaded: models are `Rc`-shared and not `Send`.
//!
//! # Quick Start
//!
//! ```text
//! let model = build_reading_list_model(&config, clock, local_parts, Some(account_parts));
//! model.add_observer(observer);
//!
//! let url = Url::parse("https://example.com")?;
//! model.add_or_replace_entry(&url, "Example", EntrySource::AddedViaCurrentApp, None);
//! model.set_read_status_if_exists(&url, true);
//! ```
//!
//! # Modules
//!
//! - `entry`: reading list entry value type and merge rule
//! - `model`: the `ReadingListModel` trait
//! - `model_impl`: single-store model
//! - `dual_model`: two-store model
//! - `observer`: observer trait and helpers
//! - `storage`: storage layer contract and in-memory storage
//! - `sync`: sync bridge contract and recording bridge
//! - `factory`: builds the model graph from configuration
//! - `config`: application configuration

pub mod clock;
pub mod config;
pub mod dual_model;
pub mod entry;
pub mod error;
pub mod factory;
pub mod model;
pub mod model_impl;
pub mod observer;
pub mod storage;
pub mod sync;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::Config;
pub use dual_model::DualReadingListModel;
pub use entry::{DistillationState, EntrySource, ReadState, ReadingListEntry};
pub use error::ModelError;
pub use factory::{build_dual_model, build_reading_list_model, StoreParts};
pub use model::{ReadingListModel, ScopedBatchUpdate, StorageState};
pub use model_impl::{ReadingListModelImpl, SyncBatchUpdate};
pub use observer::{EventRecorder, ModelEvent, ReadingListModelObserver};
pub use storage::{InMemoryStorage, InMemoryStorageHandle, ReadingListModelStorage, StorageError};
pub use sync::{RecordingSyncBridge, RecordingSyncBridgeHandle, ReadingListSyncBridge};
