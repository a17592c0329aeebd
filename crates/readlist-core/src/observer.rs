//! Observer interface for reading list models
//!
//! Observers are registered as `Rc` handles and held weakly. Every
//! notification iterates over a snapshot of the live observers, so adding or
//! removing observers from inside a callback is safe. Callbacks receive the
//! notifying model and may query it; they must not mutate it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;
use url::Url;

use crate::entry::{EntrySource, ReadingListEntry};
use crate::model::ReadingListModel;

/// Receives model lifecycle and entry change notifications
///
/// Every method defaults to doing nothing. For a single mutation the order is
/// always `will_*`, the change, `did_*`, then `did_apply_changes`.
#[allow(unused_variables)]
pub trait ReadingListModelObserver {
    fn model_loaded(&self, model: &dyn ReadingListModel) {}

    fn model_began_batch_updates(&self, model: &dyn ReadingListModel) {}

    fn model_completed_batch_updates(&self, model: &dyn ReadingListModel) {}

    fn model_being_shutdown(&self, model: &dyn ReadingListModel) {}

    fn model_being_deleted(&self, model: &dyn ReadingListModel) {}

    fn will_add_entry(&self, model: &dyn ReadingListModel, entry: &ReadingListEntry) {}

    fn did_add_entry(&self, model: &dyn ReadingListModel, url: &Url, source: EntrySource) {}

    fn will_remove_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    fn did_remove_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    fn will_update_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    fn did_update_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    /// Read status is about to change (the entry moves between partitions)
    fn will_move_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    fn did_move_entry(&self, model: &dyn ReadingListModel, url: &Url) {}

    fn did_apply_changes(&self, model: &dyn ReadingListModel) {}
}

/// Weakly held observers
#[derive(Default)]
pub struct ObserverList {
    observers: RefCell<Vec<Weak<dyn ReadingListModelObserver>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; registering the same observer twice is a no-op
    pub fn add(&self, observer: &Rc<dyn ReadingListModelObserver>) {
        let weak = Rc::downgrade(observer);
        let mut observers = self.observers.borrow_mut();
        if !observers.iter().any(|o| o.ptr_eq(&weak)) {
            observers.push(weak);
        }
    }

    pub fn remove(&self, observer: &Rc<dyn ReadingListModelObserver>) {
        let weak = Rc::downgrade(observer);
        self.observers.borrow_mut().retain(|o| !o.ptr_eq(&weak));
    }

    pub fn has_observer(&self, observer: &Rc<dyn ReadingListModelObserver>) -> bool {
        let weak = Rc::downgrade(observer);
        self.observers.borrow().iter().any(|o| o.ptr_eq(&weak))
    }

    /// Live observers at this moment; dead handles are pruned
    pub fn snapshot(&self) -> Vec<Rc<dyn ReadingListModelObserver>> {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|o| o.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Call `f` on every live observer
    pub fn notify(&self, mut f: impl FnMut(&dyn ReadingListModelObserver)) {
        for observer in self.snapshot() {
            f(observer.as_ref());
        }
    }
}

/// A notification as seen by an `EventRecorder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModelEvent {
    Loaded,
    BeganBatchUpdates,
    CompletedBatchUpdates,
    BeingShutdown,
    BeingDeleted,
    WillAdd { url: Url },
    DidAdd { url: Url, source: EntrySource },
    WillRemove { url: Url },
    DidRemove { url: Url },
    WillUpdate { url: Url },
    DidUpdate { url: Url },
    WillMove { url: Url },
    DidMove { url: Url },
    DidApplyChanges,
}

/// Observer that keeps every notification it receives
#[derive(Default)]
pub struct EventRecorder {
    events: RefCell<Vec<ModelEvent>>,
}

impl EventRecorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ModelEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// How many recorded events equal `event`
    pub fn count(&self, event: &ModelEvent) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: ModelEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl ReadingListModelObserver for EventRecorder {
    fn model_loaded(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::Loaded);
    }

    fn model_began_batch_updates(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::BeganBatchUpdates);
    }

    fn model_completed_batch_updates(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::CompletedBatchUpdates);
    }

    fn model_being_shutdown(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::BeingShutdown);
    }

    fn model_being_deleted(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::BeingDeleted);
    }

    fn will_add_entry(&self, _model: &dyn ReadingListModel, entry: &ReadingListEntry) {
        self.push(ModelEvent::WillAdd {
            url: entry.url().clone(),
        });
    }

    fn did_add_entry(&self, _model: &dyn ReadingListModel, url: &Url, source: EntrySource) {
        self.push(ModelEvent::DidAdd {
            url: url.clone(),
            source,
        });
    }

    fn will_remove_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::WillRemove { url: url.clone() });
    }

    fn did_remove_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::DidRemove { url: url.clone() });
    }

    fn will_update_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::WillUpdate { url: url.clone() });
    }

    fn did_update_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::DidUpdate { url: url.clone() });
    }

    fn will_move_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::WillMove { url: url.clone() });
    }

    fn did_move_entry(&self, _model: &dyn ReadingListModel, url: &Url) {
        self.push(ModelEvent::DidMove { url: url.clone() });
    }

    fn did_apply_changes(&self, _model: &dyn ReadingListModel) {
        self.push(ModelEvent::DidApplyChanges);
    }
}
