use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::cell::{Observable, Subscribable, SubscribableRef};
use crate::runtime::context::Runtime;

/// Id-keyed lookup of live subscribables plus the consumed-once initial
/// value table.
///
/// References are weak: the registry never keeps a cell alive, entries
/// simply stop resolving once the last strong holder releases it. Initial
/// entries are strong until consumed.
pub(crate) struct Registry {
    references: HashMap<Arc<str>, Weak<dyn Subscribable>>,
    initial: HashMap<Arc<str>, Arc<dyn Subscribable>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            references: HashMap::new(),
            initial: HashMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.references.clear();
        self.initial.clear();
    }
}

impl Runtime {
    /// Resolve the live subscribable registered under `id`, if any.
    pub(crate) fn recall(&self, id: &str) -> Option<Arc<dyn Subscribable>> {
        self.registry
            .lock()
            .unwrap()
            .references
            .get(id)
            .and_then(Weak::upgrade)
    }

    /// Consume the initial-table entry for `id`, if one was seeded.
    pub(crate) fn take_initial(&self, id: &str) -> Option<Arc<dyn Subscribable>> {
        self.registry.lock().unwrap().initial.remove(id)
    }

    /// Register `cell` under its id (weakly) and notify state listeners of
    /// its creation.
    pub(crate) fn register_active(&self, cell: &Arc<dyn Subscribable>) {
        if let Some(id) = cell.id() {
            trace!(id = %id, kind = ?cell.kind(), "registering subscribable");
            self.registry
                .lock()
                .unwrap()
                .references
                .insert(id, Arc::downgrade(cell));
        }

        let mut created: IndexSet<SubscribableRef> = IndexSet::new();
        created.insert(SubscribableRef::new(Arc::clone(cell)));
        self.notify_state_listeners(&created);
    }

    /// Re-point the weak registry entry at a restored cell without treating
    /// it as a creation.
    pub(crate) fn reregister(&self, cell: &Arc<dyn Subscribable>) {
        if let Some(id) = cell.id() {
            self.registry
                .lock()
                .unwrap()
                .references
                .insert(id, Arc::downgrade(cell));
        }
    }

    /// All currently live subscribables, dropping registry entries whose
    /// target has been reclaimed.
    pub fn subscribables(&self) -> IndexSet<SubscribableRef> {
        let mut registry = self.registry.lock().unwrap();
        registry
            .references
            .retain(|_, reference| reference.strong_count() > 0);
        registry
            .references
            .values()
            .filter_map(Weak::upgrade)
            .map(SubscribableRef::new)
            .collect()
    }

    /// Seed the initial table with `observable`, to be consumed by exactly
    /// one future construction call with the same id.
    ///
    /// Enables identity-preserving restoration, e.g. rehydrating previously
    /// captured state. Observables without an id cannot be restored and are
    /// ignored.
    pub fn register_initial<T>(&self, observable: &Observable<T>)
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let cell = observable.erased();
        match cell.id() {
            Some(id) => {
                trace!(id = %id, "seeding initial value");
                self.registry.lock().unwrap().initial.insert(id, cell);
            }
            None => debug!("register_initial ignored for observable without id"),
        }
    }
}

/// Seed the current runtime's initial table with `observable`; the next
/// construction call with the same id returns this exact instance instead of
/// building a fresh one.
///
/// # Examples
///
/// ```
/// use ripple::{observable_with, register_initial, Options};
///
/// # ripple::Runtime::scope(|| {
/// let restored = observable_with("saved".to_string(), Options::new().id("message"));
/// register_initial(&restored);
/// drop(restored);
///
/// let message = observable_with("default".to_string(), Options::new().id("message"));
/// assert_eq!(message.get(), "saved");
/// # });
/// ```
pub fn register_initial<T>(observable: &Observable<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Runtime::current().register_initial(observable);
}
