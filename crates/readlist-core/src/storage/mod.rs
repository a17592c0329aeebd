//! Storage layer contract
//!
//! A reading list model never touches disk itself. It consumes a storage
//! layer through two calls:
//!
//! - `load`: delivers, once, either an error or the initial entries plus
//!   their sync metadata
//! - `commit_batch`: persists the writes and metadata changes queued in a
//!   `StorageBatch`
//!
//! The model keeps at most one `StorageBatch` open at a time and commits it
//! when the last scope referencing it ends.

mod batch;
mod error;
mod memory;

use std::collections::HashMap;
use std::rc::Rc;

use url::Url;

use crate::clock::Clock;
use crate::entry::ReadingListEntry;

pub use batch::{
    EntityMetadata, MetadataBatch, MetadataChange, MetadataChangeList, StorageBatch, StorageOp,
};
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryStorage, InMemoryStorageHandle};

/// What a successful load hands to the model
#[derive(Debug, Default)]
pub struct LoadedData {
    pub entries: HashMap<Url, ReadingListEntry>,
    pub metadata: MetadataBatch,
}

/// One-shot load completion
pub type LoadCallback = Box<dyn FnOnce(StorageResult<LoadedData>)>;

/// Persistence backend for one reading list model
pub trait ReadingListModelStorage {
    /// Start loading; `on_loaded` must be invoked exactly once
    ///
    /// It may be invoked before `load` returns.
    fn load(&mut self, clock: Rc<dyn Clock>, on_loaded: LoadCallback);

    /// Persist a batch of queued writes
    fn commit_batch(&mut self, batch: StorageBatch) -> StorageResult<()>;
}
