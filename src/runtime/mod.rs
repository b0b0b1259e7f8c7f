//! Runtime support for the reactive graph.
//!
//! A [`Runtime`] owns everything that is process-wide in the reactive
//! model: the single active dependency context, the pending-write queue,
//! the id-keyed registry of live subscribables and the state listeners.
//! One global runtime exists by default; [`Runtime::scope`] provides
//! isolated runtimes for tests and embedded uses.

mod context;
mod flush;
mod registry;

pub use context::{
    add_state_listener, flush, remove_state_listener, state_listener, subscribables, track,
    Runtime, StateListener,
};
pub use flush::{FlushHandle, FlushHook};
pub use registry::register_initial;
