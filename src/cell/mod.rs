//! Reactive cells.
//!
//! This module provides the two cell kinds and their shared capability:
//! - Observables: mutable cells with staged, batched writes
//! - Computeds: derived cells with automatic dependency tracking
//! - Subscribable: the capability set common to both

mod computed;
mod observable;
mod options;
mod subscribable;

pub use computed::{computed, computed_with, Computed};
pub use observable::{observable, observable_with, Observable};
pub use options::Options;
pub use subscribable::{subscriber, Kind, Subscribable, SubscribableRef, Subscriber};
