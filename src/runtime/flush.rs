use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::cell::{SubscribableRef, Subscriber};
use crate::runtime::context::Runtime;

/// The host's deferred-callback primitive, used to coalesce multiple
/// synchronous writes into one flush.
///
/// The runtime arms the hook on every staged write and cancels it when a
/// flush runs; `arm` replaces any previously armed callback, so at most one
/// flush is pending regardless of how many writes occur before it fires.
/// Without an installed hook the runtime is manual-flush only.
pub trait FlushHook: Send + Sync {
    /// Schedule a deferred, fire-once call of [`FlushHandle::flush`],
    /// replacing any previously armed callback.
    fn arm(&self, handle: FlushHandle);

    /// Drop any armed callback.
    fn cancel(&self);
}

/// Capability handed to a [`FlushHook`] to fire the deferred flush.
///
/// Holds the runtime weakly; firing after the runtime is gone is a no-op.
#[derive(Clone)]
pub struct FlushHandle {
    runtime: Weak<Runtime>,
}

impl FlushHandle {
    /// Flush the runtime this handle was armed for, if it is still alive.
    pub fn flush(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.flush();
        }
    }
}

/// Pending writes and the armed flush hook.
pub(crate) struct Scheduler {
    pub(crate) pending: IndexSet<SubscribableRef>,
    hook: Option<Arc<dyn FlushHook>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Scheduler {
            pending: IndexSet::new(),
            hook: None,
        }
    }
}

/// Compute the affected closure of `roots`: repeatedly union in each node's
/// dependents, re-inserting already-visited nodes at the end of the working
/// order whenever they are revisited.
///
/// The re-insertion linearizes the graph so every node is ordered after all
/// nodes it transitively depends on, without in-degree bookkeeping.
fn collect_work(roots: &[SubscribableRef], work: &mut IndexSet<SubscribableRef>) {
    let mut dependents: IndexSet<SubscribableRef> = IndexSet::new();

    for node in roots {
        work.shift_remove(node);
        work.insert(node.clone());

        for dependent in node.dependents() {
            dependents.insert(SubscribableRef::new(dependent));
        }
    }

    if !dependents.is_empty() {
        let next: Vec<SubscribableRef> = dependents.into_iter().collect();
        collect_work(&next, work);
    }
}

impl Runtime {
    /// Install the deferred flush hook, replacing any previous one.
    pub fn set_flush_hook(&self, hook: Arc<dyn FlushHook>) {
        self.sched.lock().unwrap().hook = Some(hook);
    }

    /// Remove the deferred flush hook; the runtime becomes manual-flush
    /// only.
    pub fn clear_flush_hook(&self) {
        self.sched.lock().unwrap().hook = None;
    }

    fn hook(&self) -> Option<Arc<dyn FlushHook>> {
        self.sched.lock().unwrap().hook.clone()
    }

    /// Stage `cell` for the next flush and re-arm the deferred flush hook.
    pub(crate) fn enqueue(&self, cell: SubscribableRef) {
        trace!(cell = ?cell, "staging write");
        let hook = {
            let mut sched = self.sched.lock().unwrap();
            sched.pending.insert(cell);
            sched.hook.clone()
        };

        if let Some(hook) = hook {
            hook.cancel();
            hook.arm(FlushHandle {
                runtime: self.weak(),
            });
        }
    }

    fn has_pending(&self) -> bool {
        !self.sched.lock().unwrap().pending.is_empty()
    }

    /// Force synchronous propagation of all pending writes.
    ///
    /// Collects the transitive set of potentially affected cells, recomputes
    /// stale computeds in dependency order, invokes the changed cells'
    /// subscribers in ascending priority order (each exactly once) and
    /// notifies state listeners with the set of changed cells. Writes made
    /// by subscribers start another round, so chained reactions converge
    /// within one externally observed call.
    ///
    /// # Panics
    ///
    /// Panics when the subscriber graph keeps producing writes for more
    /// rounds than [`max_flush_rounds`](Runtime::max_flush_rounds) allows.
    pub fn flush(&self) {
        Runtime::with_runtime(self.shared(), || {
            let mut rounds = 0;

            loop {
                rounds += 1;
                let cap = self.max_flush_rounds();
                if rounds > cap {
                    panic!(
                        "flush did not converge after {cap} rounds; \
                         a subscriber keeps writing on every notification"
                    );
                }

                self.flush_once(rounds);

                // subscriptions made new updates
                if !self.has_pending() {
                    break;
                }
            }
        });
    }

    fn flush_once(&self, round: usize) {
        let pending: Vec<SubscribableRef> = self
            .sched
            .lock()
            .unwrap()
            .pending
            .iter()
            .cloned()
            .collect();

        let mut work: IndexSet<SubscribableRef> = IndexSet::new();
        collect_work(&pending, &mut work);

        debug!(round, pending = pending.len(), work = work.len(), "flush");

        let mut updates: IndexSet<SubscribableRef> = IndexSet::new();
        let mut queued: IndexMap<usize, (Subscriber, i32)> = IndexMap::new();

        for cell in &work {
            cell.maybe_update();

            if cell.changed() {
                updates.insert(cell.clone());

                // Last-visited priority wins; first-merge order is kept for
                // the stable tie break below.
                for (key, subscriber, priority) in cell.subscribers() {
                    queued.insert(key, (subscriber, priority));
                }
            }
        }

        // Writes staged after this point belong to the next round.
        self.sched.lock().unwrap().pending.clear();

        let mut invocation: Vec<(Subscriber, i32)> = queued.into_values().collect();
        invocation.sort_by_key(|(_, priority)| *priority);

        for (subscriber, _) in &invocation {
            subscriber();
        }

        self.notify_state_listeners(&updates);

        if let Some(hook) = self.hook() {
            hook.cancel();
        }
    }
}
