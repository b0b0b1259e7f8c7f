use std::any::Any;
use std::sync::{Arc, Mutex, RwLock};

use tracing::trace;

use crate::cell::options::{EqualityFn, Options};
use crate::cell::subscribable::{
    subscriber_key, CellMeta, Kind, Subscribable, SubscribableRef, Subscriber,
};
use crate::runtime::Runtime;

struct Slot<T> {
    value: T,
    previous: T,
}

pub(crate) struct ObservableInner<T> {
    key: usize,
    id: Option<Arc<str>>,
    slot: RwLock<Slot<T>>,
    is_equal: Mutex<EqualityFn<T>>,
    meta: Mutex<CellMeta>,
}

/// A mutable reactive cell.
///
/// Reads record a dependency edge when performed inside a tracked
/// evaluation; writes are staged and propagate to dependents and
/// subscribers on the next [`flush`](crate::flush).
///
/// Cloning the handle shares the same cell.
pub struct Observable<T> {
    inner: Arc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Create an observable with the given initial value.
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(initial, Options::new())
    }

    /// Create an observable, or recall the live instance registered under
    /// the options' id.
    ///
    /// Recall order: a seeded initial-table entry wins (consumed once, with
    /// the caller's equality function swapped in), then a live registry
    /// entry (returned unchanged; the initial value argument is ignored),
    /// then a fresh cell is built, registered and announced to state
    /// listeners.
    ///
    /// # Panics
    ///
    /// Panics if the id is already in use by a cell of a different type.
    pub fn with_options(initial: T, options: Options<T>) -> Self
    where
        T: PartialEq,
    {
        let runtime = Runtime::current();

        if let Some(id) = options.id.as_deref() {
            if let Some(restored) = runtime.take_initial(id) {
                let inner = downcast_inner::<T>(restored, id);
                *inner.is_equal.lock().unwrap() = options.equality();
                let erased: Arc<dyn Subscribable> = inner.clone();
                runtime.reregister(&erased);
                trace!(id, "restored observable from initial table");
                return Observable { inner };
            }

            if let Some(existing) = runtime.recall(id) {
                return Observable {
                    inner: downcast_inner::<T>(existing, id),
                };
            }
        }

        let inner = Arc::new(ObservableInner {
            key: runtime.next_key(),
            id: options.id.as_deref().map(Arc::from),
            slot: RwLock::new(Slot {
                previous: initial.clone(),
                value: initial,
            }),
            is_equal: Mutex::new(options.equality()),
            meta: Mutex::new(CellMeta::new()),
        });

        let erased: Arc<dyn Subscribable> = inner.clone();
        runtime.register_active(&erased);

        Observable { inner }
    }

    /// Get the current value, recording a dependency edge if a tracked
    /// evaluation is in progress.
    pub fn get(&self) -> T {
        Runtime::current().track_read(self.as_subscribable());
        self.inner.slot.read().unwrap().value.clone()
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::current().track_read(self.as_subscribable());
        let slot = self.inner.slot.read().unwrap();
        f(&slot.value)
    }

    /// Stage a new value.
    ///
    /// The stored value is always replaced, but when the new value compares
    /// equal to the previous one under the configured equality function the
    /// write does not propagate: nothing is enqueued and no subscriber runs.
    pub fn set(&self, value: T) {
        let changed = {
            let mut slot = self.inner.slot.write().unwrap();
            slot.previous = std::mem::replace(&mut slot.value, value);
            let is_equal = self.inner.is_equal.lock().unwrap().clone();
            !is_equal(&slot.value, &slot.previous)
        };

        self.inner.meta.lock().unwrap().changed = changed;

        if changed {
            Runtime::current().enqueue(self.as_subscribable());
        }
    }

    /// Stage an in-place update of the value.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let changed = {
            let mut slot = self.inner.slot.write().unwrap();
            slot.previous = slot.value.clone();
            f(&mut slot.value);
            let is_equal = self.inner.is_equal.lock().unwrap().clone();
            !is_equal(&slot.value, &slot.previous)
        };

        self.inner.meta.lock().unwrap().changed = changed;

        if changed {
            Runtime::current().enqueue(self.as_subscribable());
        }
    }

    /// Add a subscriber at the default priority (0).
    pub fn subscribe(&self, subscriber: &Subscriber) {
        self.inner.subscribe_with_priority(subscriber, 0);
    }

    /// Add a subscriber at the given priority. Lower priorities are
    /// notified first during a flush.
    pub fn subscribe_with_priority(&self, subscriber: &Subscriber, priority: i32) {
        self.inner.subscribe_with_priority(subscriber, priority);
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        Subscribable::unsubscribe(&*self.inner, subscriber);
    }

    /// The id this observable was registered under, if any.
    pub fn id(&self) -> Option<Arc<str>> {
        self.inner.id.clone()
    }

    /// Always [`Kind::Observable`].
    pub fn kind(&self) -> Kind {
        Kind::Observable
    }

    /// Type-erased handle for sets, registries and introspection.
    pub fn as_subscribable(&self) -> SubscribableRef {
        SubscribableRef::new(self.erased())
    }

    pub(crate) fn erased(&self) -> Arc<dyn Subscribable> {
        self.inner.clone()
    }
}

fn downcast_inner<T: Clone + Send + Sync + 'static>(
    cell: Arc<dyn Subscribable>,
    id: &str,
) -> Arc<ObservableInner<T>> {
    cell.as_any()
        .downcast::<ObservableInner<T>>()
        .unwrap_or_else(|_| {
            panic!("subscribable id `{id}` is already in use by a different cell type")
        })
}

impl<T: Clone + Send + Sync + 'static> Subscribable for ObservableInner<T> {
    fn key(&self) -> usize {
        self.key
    }

    fn id(&self) -> Option<Arc<str>> {
        self.id.clone()
    }

    fn kind(&self) -> Kind {
        Kind::Observable
    }

    fn changed(&self) -> bool {
        self.meta.lock().unwrap().changed
    }

    fn dependents(&self) -> Vec<Arc<dyn Subscribable>> {
        self.meta.lock().unwrap().live_dependents()
    }

    fn register_dependent(&self, dependent: &Arc<dyn Subscribable>) {
        self.meta
            .lock()
            .unwrap()
            .dependents
            .insert(dependent.key(), Arc::downgrade(dependent));
    }

    fn unregister_dependent(&self, key: usize) {
        self.meta.lock().unwrap().dependents.shift_remove(&key);
    }

    fn subscribers(&self) -> Vec<(usize, Subscriber, i32)> {
        self.meta.lock().unwrap().subscriber_entries()
    }

    fn subscribe_with_priority(&self, subscriber: &Subscriber, priority: i32) {
        self.meta
            .lock()
            .unwrap()
            .subscribers
            .insert(subscriber_key(subscriber), (Arc::clone(subscriber), priority));
    }

    fn unsubscribe(&self, subscriber: &Subscriber) {
        self.meta
            .lock()
            .unwrap()
            .subscribers
            .shift_remove(&subscriber_key(subscriber));
    }

    fn maybe_update(&self) {}

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Create a mutable reactive cell with the given initial value.
///
/// # Examples
///
/// ```
/// use ripple::observable;
///
/// let count = observable(0);
/// count.set(42);
/// assert_eq!(count.get(), 42);
/// ```
pub fn observable<T>(initial: T) -> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Observable::new(initial)
}

/// Create a mutable reactive cell, or recall the live instance registered
/// under the options' id.
///
/// # Examples
///
/// ```
/// use ripple::{observable_with, Options};
///
/// # ripple::Runtime::scope(|| {
/// let first = observable_with(1, Options::new().id("counter"));
/// let second = observable_with(99, Options::new().id("counter"));
///
/// // Construction by id is idempotent; the second initial value is ignored.
/// assert_eq!(second.get(), 1);
/// # });
/// ```
pub fn observable_with<T>(initial: T, options: Options<T>) -> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Observable::with_options(initial, options)
}
