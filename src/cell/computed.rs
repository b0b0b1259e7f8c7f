use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock, Weak};

use indexmap::IndexSet;
use tracing::trace;

use crate::cell::options::{EqualityFn, Options};
use crate::cell::subscribable::{
    subscriber_key, CellMeta, Kind, Subscribable, SubscribableRef, Subscriber,
};
use crate::runtime::Runtime;

struct Slot<T> {
    value: Option<T>,
    previous: Option<T>,
}

struct ActivationState {
    active: bool,
    dependencies: IndexSet<SubscribableRef>,
}

pub(crate) struct ComputedInner<T> {
    key: usize,
    id: Option<Arc<str>>,
    weak_self: Weak<ComputedInner<T>>,
    derive: Box<dyn Fn() -> T + Send + Sync>,
    slot: RwLock<Slot<T>>,
    is_equal: Mutex<EqualityFn<T>>,
    meta: Mutex<CellMeta>,
    state: Mutex<ActivationState>,
}

/// A derived reactive cell.
///
/// While ACTIVE (some cell depends on it, or it has subscribers) the value
/// is cached and kept fresh by the flush pass, and the dependency set is
/// maintained from whatever the derivation actually read. While INACTIVE it
/// carries no graph edges and recomputes on every direct read.
///
/// Cloning the handle shares the same cell.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Computed {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ComputedInner<T> {
    fn erased(&self) -> Arc<dyn Subscribable> {
        self.weak_self.upgrade().expect("computed cell gone")
    }

    /// Re-run the derivation inside a fresh dependency context, store the
    /// result and rewire the dependency edges to the newly captured read
    /// set.
    ///
    /// The captured set stays installed as the current context while the new
    /// dependencies are registered, so an activation triggered by the
    /// registration never recomputes a second time. A panicking derivation
    /// leaves the previous value and edges in place.
    fn recompute(&self) {
        let runtime = Runtime::current();
        let parent = runtime.swap_tracking(Some(IndexSet::new()));

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.derive)()));
        let value = match outcome {
            Ok(value) => value,
            Err(panic) => {
                runtime.swap_tracking(parent);
                resume_unwind(panic);
            }
        };

        let captured = runtime.tracking_snapshot();
        let was_active = self.state.lock().unwrap().active;

        let changed = {
            let mut slot = self.slot.write().unwrap();
            slot.previous = slot.value.take();
            slot.value = Some(value);
            if !was_active {
                // First activation: a fresh value is not a change.
                slot.previous = slot.value.clone();
            }
            let is_equal = self.is_equal.lock().unwrap().clone();
            match (&slot.value, &slot.previous) {
                (Some(value), Some(previous)) => !is_equal(value, previous),
                _ => true,
            }
        };
        self.meta.lock().unwrap().changed = changed;

        let removed: Vec<SubscribableRef> = {
            let mut state = self.state.lock().unwrap();
            let removed = state
                .dependencies
                .iter()
                .filter(|dependency| !captured.contains(*dependency))
                .cloned()
                .collect();
            state.dependencies = captured.clone();
            removed
        };

        let erased = self.erased();
        for dependency in &captured {
            dependency.register_dependent(&erased);
        }
        for dependency in &removed {
            dependency.unregister_dependent(self.key);
        }

        runtime.swap_tracking(parent);
    }

    /// Drive the INACTIVE/ACTIVE state machine after any change to the
    /// dependent or subscriber counts.
    fn update_activation(&self) {
        let (dependents, subscribers) = {
            let meta = self.meta.lock().unwrap();
            (meta.dependents.len(), meta.subscribers.len())
        };
        let active = self.state.lock().unwrap().active;

        if active {
            if dependents == 0 && subscribers == 0 {
                let dependencies: Vec<SubscribableRef> = {
                    let mut state = self.state.lock().unwrap();
                    state.active = false;
                    std::mem::take(&mut state.dependencies).into_iter().collect()
                };
                trace!(key = self.key, "computed deactivated");

                for dependency in &dependencies {
                    dependency.unregister_dependent(self.key);
                }
            }
        } else if dependents > 0 || subscribers > 0 {
            if !Runtime::current().is_tracking() {
                // Not reached through a tracked read, so nothing has
                // computed a fresh value yet.
                self.recompute();
            }
            self.state.lock().unwrap().active = true;
            trace!(key = self.key, "computed activated");
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Computed<T> {
    /// Create a computed from a derivation callback.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::with_options(derive, Options::new())
    }

    /// Create a computed, or recall the live instance registered under the
    /// options' id.
    ///
    /// Unlike observables there is no initial-table lookup: a computed is
    /// re-derivable from its callback and needs no value restoration.
    ///
    /// # Panics
    ///
    /// Panics if the id is already in use by a cell of a different type.
    pub fn with_options<F>(derive: F, options: Options<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        let runtime = Runtime::current();

        if let Some(id) = options.id.as_deref() {
            if let Some(existing) = runtime.recall(id) {
                let inner = existing
                    .as_any()
                    .downcast::<ComputedInner<T>>()
                    .unwrap_or_else(|_| {
                        panic!(
                            "subscribable id `{id}` is already in use by a different cell type"
                        )
                    });
                return Computed { inner };
            }
        }

        let inner = Arc::new_cyclic(|weak_self| ComputedInner {
            key: runtime.next_key(),
            id: options.id.as_deref().map(Arc::from),
            weak_self: weak_self.clone(),
            derive: Box::new(derive),
            slot: RwLock::new(Slot {
                value: None,
                previous: None,
            }),
            is_equal: Mutex::new(options.equality()),
            meta: Mutex::new(CellMeta::new()),
            state: Mutex::new(ActivationState {
                active: false,
                dependencies: IndexSet::new(),
            }),
        });

        let erased: Arc<dyn Subscribable> = inner.clone();
        runtime.register_active(&erased);

        Computed { inner }
    }

    /// Read the value with a function without cloning.
    ///
    /// Active: the cached value, no recomputation. Inactive inside a
    /// tracked evaluation: recompute now; the caller's dependency
    /// registration completes the activation. Inactive and untracked:
    /// recompute fresh on every call, since without tracking there is no
    /// signal of staleness.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let runtime = Runtime::current();
        runtime.track_read(self.as_subscribable());

        if self.inner.state.lock().unwrap().active {
            let slot = self.inner.slot.read().unwrap();
            if let Some(value) = slot.value.as_ref() {
                return f(value);
            }
            // Activated before any recomputation (subscribed inside a
            // tracked block); compute now.
        }

        if runtime.is_tracking() {
            self.inner.recompute();
            let slot = self.inner.slot.read().unwrap();
            return f(slot.value.as_ref().expect("just recomputed"));
        }

        let value = (self.inner.derive)();
        {
            let mut slot = self.inner.slot.write().unwrap();
            slot.previous = slot.value.take();
            slot.value = Some(value.clone());
        }
        f(&value)
    }

    /// Get the current value, recording a dependency edge if a tracked
    /// evaluation is in progress.
    pub fn get(&self) -> T {
        self.with(|value| value.clone())
    }

    /// Add a subscriber at the default priority (0).
    ///
    /// Subscribing activates the computed: it recomputes eagerly and keeps
    /// its cached value fresh from then on.
    pub fn subscribe(&self, subscriber: &Subscriber) {
        self.inner.subscribe_with_priority(subscriber, 0);
    }

    /// Add a subscriber at the given priority. Lower priorities are
    /// notified first during a flush.
    pub fn subscribe_with_priority(&self, subscriber: &Subscriber, priority: i32) {
        self.inner.subscribe_with_priority(subscriber, priority);
    }

    /// Remove a subscriber. A computed with no subscribers and no
    /// dependents deactivates and drops its dependency edges.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        Subscribable::unsubscribe(&*self.inner, subscriber);
    }

    /// The id this computed was registered under, if any.
    pub fn id(&self) -> Option<Arc<str>> {
        self.inner.id.clone()
    }

    /// Always [`Kind::Computed`].
    pub fn kind(&self) -> Kind {
        Kind::Computed
    }

    /// Type-erased handle for sets, registries and introspection.
    pub fn as_subscribable(&self) -> SubscribableRef {
        SubscribableRef::new(self.inner.erased())
    }
}

impl<T: Clone + Send + Sync + 'static> Subscribable for ComputedInner<T> {
    fn key(&self) -> usize {
        self.key
    }

    fn id(&self) -> Option<Arc<str>> {
        self.id.clone()
    }

    fn kind(&self) -> Kind {
        Kind::Computed
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
        self.update_activation();
    }

    fn unregister_dependent(&self, key: usize) {
        self.meta.lock().unwrap().dependents.shift_remove(&key);
        self.update_activation();
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
        self.update_activation();
    }

    fn unsubscribe(&self, subscriber: &Subscriber) {
        self.meta
            .lock()
            .unwrap()
            .subscribers
            .shift_remove(&subscriber_key(subscriber));
        self.update_activation();
    }

    /// Recompute when any current dependency changed during this flush; the
    /// flush order guarantees the dependency's own update already ran.
    fn maybe_update(&self) {
        let dependencies: Vec<SubscribableRef> = self
            .state
            .lock()
            .unwrap()
            .dependencies
            .iter()
            .cloned()
            .collect();

        if dependencies.iter().any(|dependency| dependency.changed()) {
            self.recompute();
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        // Mirror maintenance: remove our edge from every remaining
        // dependency so they can deactivate.
        if let Ok(state) = self.state.get_mut() {
            let dependencies = std::mem::take(&mut state.dependencies);
            for dependency in &dependencies {
                dependency.unregister_dependent(self.key);
            }
        }
    }
}

/// Create a derived reactive cell from a derivation callback.
///
/// # Examples
///
/// ```
/// use ripple::{computed, flush, observable, subscriber};
///
/// # ripple::Runtime::scope(|| {
/// let a = observable(0);
/// let b = observable(0);
///
/// let sum = computed({
///     let a = a.clone();
///     let b = b.clone();
///     move || a.get() + b.get()
/// });
/// sum.subscribe(&subscriber(|| {}));
///
/// a.set(4);
/// b.set(2);
/// flush();
///
/// assert_eq!(sum.get(), 6);
/// # });
/// ```
pub fn computed<T, F>(derive: F) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(derive)
}

/// Create a derived reactive cell, or recall the live instance registered
/// under the options' id.
pub fn computed_with<T, F>(derive: F, options: Options<T>) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::with_options(derive, options)
}
