use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use indexmap::{IndexMap, IndexSet};

use crate::cell::SubscribableRef;
use crate::runtime::flush::Scheduler;
use crate::runtime::registry::Registry;

const DEFAULT_MAX_FLUSH_ROUNDS: usize = 1024;

/// A state listener callback, compared by allocation identity.
///
/// Called with a single-element set when a subscribable is created and with
/// the set of changed subscribables after every flush round.
pub type StateListener = Arc<dyn Fn(&IndexSet<SubscribableRef>) + Send + Sync>;

/// Wrap a closure as a [`StateListener`].
pub fn state_listener<F>(f: F) -> StateListener
where
    F: Fn(&IndexSet<SubscribableRef>) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn listener_key(listener: &StateListener) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

/// The reactive runtime: dependency context, pending writes, registry and
/// state listeners.
///
/// All graph mutation goes through the runtime that is current when a cell
/// is used. Supports both a global runtime (default) and scoped runtimes for
/// isolation.
///
/// # Examples
///
/// Using the default global runtime:
///
/// ```
/// use ripple::observable;
///
/// let count = observable(42);
/// assert_eq!(count.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use ripple::{observable, Runtime};
///
/// Runtime::scope(|| {
///     let count = observable(0);
///     assert_eq!(count.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct Runtime {
    weak_self: Weak<Runtime>,
    next_key: AtomicUsize,
    max_flush_rounds: AtomicUsize,
    tracking: Mutex<Option<IndexSet<SubscribableRef>>>,
    pub(crate) sched: Mutex<Scheduler>,
    pub(crate) registry: Mutex<Registry>,
    listeners: Mutex<IndexMap<usize, StateListener>>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<Runtime>>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Create a new isolated runtime with its own dependency graph, pending
    /// writes and registry.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Runtime {
            weak_self: weak_self.clone(),
            next_key: AtomicUsize::new(0),
            max_flush_rounds: AtomicUsize::new(DEFAULT_MAX_FLUSH_ROUNDS),
            tracking: Mutex::new(None),
            sched: Mutex::new(Scheduler::new()),
            registry: Mutex::new(Registry::new()),
            listeners: Mutex::new(IndexMap::new()),
        })
    }

    /// A strong handle to this runtime; methods are always reached through
    /// one, so the upgrade cannot fail.
    pub(crate) fn shared(&self) -> Arc<Runtime> {
        self.weak_self.upgrade().expect("runtime dropped")
    }

    pub(crate) fn weak(&self) -> Weak<Runtime> {
        self.weak_self.clone()
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Useful for testing or creating isolated reactive contexts. The
    /// runtime and all its state is automatically cleaned up when the
    /// function returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use ripple::{observable, Runtime};
    ///
    /// Runtime::scope(|| {
    ///     let count = observable(0);
    ///     assert_eq!(count.get(), 0);
    /// });
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    ///
    /// This is used as the default runtime when no scoped runtime is active.
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current runtime (scoped or global fallback).
    ///
    /// Returns the runtime from the top of the thread-local stack, or the
    /// global runtime if no scoped runtime is active.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// This pushes the runtime onto the thread-local stack for the duration
    /// of the function execution.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Clear all cells, pending writes and listeners from this runtime.
    ///
    /// Useful for resetting between tests. The flush hook and the flush
    /// round cap are configuration and survive a clear.
    pub fn clear(&self) {
        *self.tracking.lock().unwrap() = None;
        self.sched.lock().unwrap().pending.clear();
        self.registry.lock().unwrap().clear();
        self.listeners.lock().unwrap().clear();
        self.next_key.store(0, Ordering::SeqCst);
    }

    /// Generate the next unique key for a cell.
    pub(crate) fn next_key(&self) -> usize {
        self.next_key.fetch_add(1, Ordering::SeqCst)
    }

    /// Cap on flush rounds within one [`flush`](Runtime::flush) call before
    /// the runtime treats the subscriber graph as divergent and panics.
    pub fn max_flush_rounds(&self) -> usize {
        self.max_flush_rounds.load(Ordering::SeqCst)
    }

    /// Replace the flush round cap. Defaults to 1024.
    pub fn set_max_flush_rounds(&self, rounds: usize) {
        self.max_flush_rounds.store(rounds, Ordering::SeqCst);
    }

    /// Record a read of `cell` in the active dependency context, if any.
    pub(crate) fn track_read(&self, cell: SubscribableRef) {
        if let Some(captured) = self.tracking.lock().unwrap().as_mut() {
            captured.insert(cell);
        }
    }

    /// Whether a dependency context is currently installed.
    pub(crate) fn is_tracking(&self) -> bool {
        self.tracking.lock().unwrap().is_some()
    }

    /// Install `context` as the dependency context, returning the previous
    /// one for later restoration.
    pub(crate) fn swap_tracking(
        &self,
        context: Option<IndexSet<SubscribableRef>>,
    ) -> Option<IndexSet<SubscribableRef>> {
        std::mem::replace(&mut *self.tracking.lock().unwrap(), context)
    }

    /// Clone of the currently captured read set.
    pub(crate) fn tracking_snapshot(&self) -> IndexSet<SubscribableRef> {
        self.tracking.lock().unwrap().clone().unwrap_or_default()
    }

    /// Run `f` with a fresh dependency context and return the set of cells
    /// it read.
    ///
    /// The capture does not subscribe to anything; it is the primitive both
    /// computed recomputation and external introspection build on. The
    /// previous context is restored even if `f` panics.
    pub fn track<F>(&self, f: F) -> IndexSet<SubscribableRef>
    where
        F: FnOnce(),
    {
        let parent = self.swap_tracking(Some(IndexSet::new()));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        let captured = self.swap_tracking(parent).unwrap_or_default();

        match result {
            Ok(()) => captured,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Add a state listener.
    pub fn add_state_listener(&self, listener: &StateListener) {
        self.listeners
            .lock()
            .unwrap()
            .insert(listener_key(listener), Arc::clone(listener));
    }

    /// Remove a state listener.
    pub fn remove_state_listener(&self, listener: &StateListener) {
        self.listeners
            .lock()
            .unwrap()
            .shift_remove(&listener_key(listener));
    }

    pub(crate) fn notify_state_listeners(&self, updates: &IndexSet<SubscribableRef>) {
        let listeners: Vec<StateListener> =
            self.listeners.lock().unwrap().values().cloned().collect();

        for listener in listeners {
            listener(updates);
        }
    }
}

/// Run a function with a fresh dependency context on the current runtime and
/// return the set of cells it read, without subscribing to any of them.
///
/// # Examples
///
/// ```
/// use ripple::{observable, track};
///
/// let a = observable(1);
/// let b = observable(2);
///
/// let captured = track(|| {
///     a.get();
///     b.get();
/// });
///
/// assert_eq!(captured.len(), 2);
/// ```
pub fn track<F>(f: F) -> IndexSet<SubscribableRef>
where
    F: FnOnce(),
{
    Runtime::current().track(f)
}

/// Add a state listener to the current runtime.
///
/// The listener is called with a single-element set whenever a subscribable
/// is created and with the set of changed subscribables after every flush
/// round.
pub fn add_state_listener(listener: &StateListener) {
    Runtime::current().add_state_listener(listener);
}

/// Remove a state listener from the current runtime.
pub fn remove_state_listener(listener: &StateListener) {
    Runtime::current().remove_state_listener(listener);
}

/// All currently live subscribables of the current runtime.
pub fn subscribables() -> IndexSet<SubscribableRef> {
    Runtime::current().subscribables()
}

/// Force synchronous propagation of all pending writes on the current
/// runtime.
pub fn flush() {
    Runtime::current().flush();
}
