//! SignalForge Core
//!
//! This crate provides the core runtime for SignalForge fine-grained
//! reactivity. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic dependency tracking with dynamic dependency sets
//! - Glitch-free, level-ordered propagation with batching
//! - A string-keyed store of dynamically typed signals for host bridges
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, batching and the per-thread runtime
//! - `graph`: Dependency graph metadata and the update scheduler
//! - `store`: Keyed signal store over [`store::SignalValue`]
//! - `config`: Runtime tunables
//!
//! # Example
//!
//! ```rust,ignore
//! use signalforge_core::{batch, Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let effect = Effect::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! effect.dispose();
//! ```
//!
//! # Threading
//!
//! Every thread has its own runtime, and handles cannot cross threads.
//! Build and use a graph on one thread.

pub mod config;
mod error;
pub mod graph;
pub mod reactive;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{BoxError, Error, Phase, Result};
pub use graph::{BatchPhase, NodeId, NodeKind, NodeState};
pub use reactive::{
    batch, batch_depth, end_batch, flush_sync, is_tracking, start_batch, try_batch, untrack,
    Cleanup, Computed, Effect, Observer, ReactiveCell, Runtime, Signal, Subscription,
};
pub use store::{SignalKey, SignalStore, SignalValue};
