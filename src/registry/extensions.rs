use crate::worker::WorkerId;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;

type Slot = Box<dyn Any + Send + Sync>;

/// Per-worker attachments owned by the registry.
///
/// Values are keyed by worker and then by type, so each worker holds at most
/// one value of a given type. Entries for a worker are dropped when the
/// registry reaps it; anything still attached to an untracked worker is
/// dropped when the registry shuts down.
#[derive(Default)]
pub struct Extensions {
    slots: Mutex<HashMap<WorkerId, HashMap<TypeId, Slot>>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `value` to `worker`, returning the value it replaced.
    ///
    /// Any id is accepted, including workers not started yet. Entries for a
    /// worker that is never reaped (never started, or attached after reaping)
    /// stay until [`Extensions::remove`]/[`Extensions::clear`] or registry shutdown.
    pub fn insert<T: Any + Send + Sync>(&self, worker: WorkerId, value: T) -> Option<T> {
        self.slots
            .lock()
            .entry(worker)
            .or_default()
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, worker: WorkerId) -> Option<T> {
        self.with(worker, T::clone)
    }

    /// Run `f` against the attached value without cloning it
    pub fn with<T: Any + Send + Sync, R>(&self, worker: WorkerId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slots = self.slots.lock();
        slots
            .get(&worker)?
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T>()
            .map(f)
    }

    pub fn contains<T: Any + Send + Sync>(&self, worker: WorkerId) -> bool {
        self.slots
            .lock()
            .get(&worker)
            .is_some_and(|map| map.contains_key(&TypeId::of::<T>()))
    }

    pub fn remove<T: Any + Send + Sync>(&self, worker: WorkerId) -> Option<T> {
        let mut slots = self.slots.lock();
        let map = slots.get_mut(&worker)?;
        let removed = map.remove(&TypeId::of::<T>());
        if map.is_empty() {
            slots.remove(&worker);
        }
        removed.and_then(|old| old.downcast::<T>().ok()).map(|old| *old)
    }

    /// Drop everything attached to `worker`
    pub fn clear(&self, worker: WorkerId) {
        self.slots.lock().remove(&worker);
    }

    /// Keep only the entries of workers for which `keep` returns true
    pub(crate) fn retain(&self, keep: impl Fn(WorkerId) -> bool) {
        self.slots.lock().retain(|id, _| keep(*id));
    }

    /// Number of workers with at least one attachment
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("workers", &self.len())
            .finish()
    }
}
