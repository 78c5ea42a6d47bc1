//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects, plus batching and the runtime that coordinates them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically becomes a dependency of that context. When the signal's value
//! changes, all dependents are marked stale.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when someone asks for its
//! value. Computeds are useful for expensive computations that should not be
//! repeated unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating a view, logging or persisting state.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, record the read.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod batch;
mod cell;
mod computed;
mod context;
mod effect;
mod observer;
mod runtime;
mod signal;
mod subscriber;

pub use batch::{batch, batch_depth, end_batch, flush_sync, start_batch, try_batch};
pub use cell::ReactiveCell;
pub use computed::Computed;
pub use context::{is_tracking, untrack};
pub use effect::{Cleanup, Effect, EffectOutput};
pub use observer::{NodeInfo, Observer, ObserverId, UpdateEvent, UpdateSource};
pub use runtime::Runtime;
pub use signal::Signal;
pub use subscriber::Subscription;
