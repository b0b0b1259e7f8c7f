use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

/// The two kinds of reactive cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A mutable cell written to directly.
    Observable,
    /// A derived cell computed from the cells it reads.
    Computed,
}

/// A subscriber callback, compared by allocation identity.
///
/// Keep the `Arc` around if you intend to unsubscribe later; a freshly
/// wrapped closure is a different subscriber even if the code is identical.
pub type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// Wrap a closure as a [`Subscriber`].
pub fn subscriber<F>(f: F) -> Subscriber
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn subscriber_key(subscriber: &Subscriber) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}

/// Common capability of [`Observable`](crate::Observable) and
/// [`Computed`](crate::Computed): identity, change flag, dependents and
/// subscribers.
///
/// Dependent/dependency edges are mirrored: a cell appears in another cell's
/// dependents exactly when that cell appears in its dependencies.
pub trait Subscribable: Send + Sync {
    /// Runtime-unique key of this cell.
    fn key(&self) -> usize;

    /// The id this cell was registered under, if any.
    fn id(&self) -> Option<Arc<str>>;

    /// Whether this cell is an observable or a computed.
    fn kind(&self) -> Kind;

    /// Whether the most recent write or recomputation changed the value.
    fn changed(&self) -> bool;

    /// The live cells that read this one while dependency tracking was
    /// active.
    fn dependents(&self) -> Vec<Arc<dyn Subscribable>>;

    /// Record `dependent` as reading this cell. Idempotent.
    fn register_dependent(&self, dependent: &Arc<dyn Subscribable>);

    /// Remove the dependent registered under `key`.
    fn unregister_dependent(&self, key: usize);

    /// Current subscribers as `(identity, callback, priority)` in
    /// registration order.
    fn subscribers(&self) -> Vec<(usize, Subscriber, i32)>;

    /// Add a subscriber with the given priority. Lower priorities are
    /// notified first during a flush.
    fn subscribe_with_priority(&self, subscriber: &Subscriber, priority: i32);

    /// Add a subscriber at the default priority (0).
    fn subscribe(&self, subscriber: &Subscriber) {
        self.subscribe_with_priority(subscriber, 0);
    }

    /// Remove a previously added subscriber.
    fn unsubscribe(&self, subscriber: &Subscriber);

    /// Recompute if this is a computed whose dependencies changed. No-op for
    /// observables.
    fn maybe_update(&self);

    /// Downcast support for registry recall.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared handle to any live cell, hashed and compared by identity.
///
/// This is the element type of every set the runtime exposes: capture sets
/// from [`track`](crate::track), the update sets passed to state listeners
/// and the result of [`subscribables`](crate::subscribables).
#[derive(Clone)]
pub struct SubscribableRef(pub(crate) Arc<dyn Subscribable>);

impl SubscribableRef {
    /// Wrap a type-erased cell.
    pub fn new(inner: Arc<dyn Subscribable>) -> Self {
        SubscribableRef(inner)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Deref for SubscribableRef {
    type Target = dyn Subscribable;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for SubscribableRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for SubscribableRef {}

impl Hash for SubscribableRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for SubscribableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribableRef")
            .field("kind", &self.0.kind())
            .field("id", &self.0.id())
            .field("key", &self.0.key())
            .finish()
    }
}

/// Graph bookkeeping shared by both cell kinds.
///
/// Dependents are weak so a dependency never keeps a dropped dependent
/// alive; the dependent's own strong dependency edges point the other way.
pub(crate) struct CellMeta {
    pub(crate) dependents: IndexMap<usize, Weak<dyn Subscribable>>,
    pub(crate) subscribers: IndexMap<usize, (Subscriber, i32)>,
    pub(crate) changed: bool,
}

impl CellMeta {
    pub(crate) fn new() -> Self {
        CellMeta {
            dependents: IndexMap::new(),
            subscribers: IndexMap::new(),
            changed: false,
        }
    }

    pub(crate) fn live_dependents(&self) -> Vec<Arc<dyn Subscribable>> {
        self.dependents
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub(crate) fn subscriber_entries(&self) -> Vec<(usize, Subscriber, i32)> {
        self.subscribers
            .iter()
            .map(|(key, (subscriber, priority))| (*key, Arc::clone(subscriber), *priority))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_identity_follows_the_allocation() {
        let a = subscriber(|| {});
        let b = a.clone();
        let c = subscriber(|| {});

        assert_eq!(subscriber_key(&a), subscriber_key(&b));
        assert_ne!(subscriber_key(&a), subscriber_key(&c));
    }
}
