//! # Ripple
//!
//! A fine-grained reactive dataflow runtime for Rust.
//!
//! Ripple tracks which cells a derivation reads and propagates changes
//! through a batched, priority-ordered notification pass:
//!
//! - `Observable<T>` - Mutable cells whose writes are staged, not applied
//!   synchronously to dependents
//! - `Computed<T>` - Derived cells that track their own read set and cache
//!   while anything depends on them
//! - `flush` - One propagation pass: recompute stale computeds bottom-up,
//!   then notify subscribers in priority order, exactly once each
//!
//! ## Batched propagation
//!
//! Writes never call subscribers directly. They are staged on the current
//! [`Runtime`] and delivered together by the next [`flush`], either invoked
//! manually or by a host-installed [`FlushHook`]:
//!
//! ```
//! use ripple::{computed, flush, observable, subscriber};
//!
//! # ripple::Runtime::scope(|| {
//! let a = observable(0);
//! let b = observable(0);
//!
//! let sum = computed({
//!     let a = a.clone();
//!     let b = b.clone();
//!     move || a.get() + b.get()
//! });
//!
//! let on_change = subscriber(|| println!("sum changed"));
//! sum.subscribe(&on_change);
//!
//! a.set(4);
//! b.set(2);
//! flush(); // prints "sum changed" exactly once
//!
//! assert_eq!(sum.get(), 6);
//! # });
//! ```
//!
//! ## Introspection
//!
//! Development tooling hooks in through [`track`] (read-dependency capture
//! without subscribing), [`subscribables`] (all live cells of the current
//! runtime) and [`add_state_listener`] (creation and flush notifications).

pub mod cell;
pub mod runtime;

// Re-export main types for convenience
pub use cell::{
    computed, computed_with, observable, observable_with, subscriber, Computed, Kind, Observable,
    Options, Subscribable, SubscribableRef, Subscriber,
};
pub use runtime::{
    add_state_listener, flush, register_initial, remove_state_listener, state_listener,
    subscribables, track, FlushHandle, FlushHook, Runtime, StateListener,
};
