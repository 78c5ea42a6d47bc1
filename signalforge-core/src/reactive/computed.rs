//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the cached value.
//!
//! 3. When a dependency changes, the computed is marked dirty (direct
//!    dependency) or maybe-dirty (something further upstream changed).
//!
//! 4. On next access, a maybe-dirty computed re-checks whether its inputs
//!    actually moved.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return the cache.
//!
//! A recompute that produces a value equal to the cached one does not bump
//! the computed's version, so its own readers are not recomputed either.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually accessed (or watched by an effect) recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::context::untrack;
use super::runtime::{raise, Reactive, Runtime};
use super::subscriber::Subscription;
use crate::error::{BoxError, Error, Phase, Result};
use crate::graph::{NodeId, NodeKind, NodeState};

type ComputeFn<T> = Box<dyn Fn() -> std::result::Result<T, BoxError>>;

struct ComputedInner<T> {
    id: NodeId,
    compute: ComputeFn<T>,
    /// `None` until the first successful evaluation.
    value: RefCell<Option<T>>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    runs: Cell<usize>,
}

impl<T: 'static> Reactive for ComputedInner<T> {
    fn evaluate(&self) -> Result<bool> {
        self.runs.set(self.runs.get() + 1);
        let next = (self.compute)().map_err(|err| Error::from_evaluator(self.id, Phase::Compute, err))?;

        let changed = match &*self.value.borrow() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            let previous = self.value.replace(Some(next));
            drop(previous);
        }
        Ok(changed)
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn phase(&self) -> Phase {
        Phase::Compute
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::dispose(self.id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Computeds are read-only. The `PartialEq` bound on [`Computed::new`] is
/// needed to detect when the computed value actually changed (some
/// computeds return the same value even if inputs changed).
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a new computed with the given function.
    ///
    /// The function is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::build(
            Box::new(move || Ok::<T, BoxError>(compute())),
            Box::new(|a: &T, b: &T| a == b),
        )
    }

    /// Create a computed whose function can fail.
    ///
    /// An `Err` leaves the computed dirty with its previous value, and is
    /// returned from [`Computed::try_get`] wrapped as [`Error::Evaluator`].
    pub fn try_new<E>(compute: impl Fn() -> std::result::Result<T, E> + 'static) -> Self
    where
        T: PartialEq,
        E: Into<BoxError>,
    {
        Self::build(
            Box::new(move || compute().map_err(Into::<BoxError>::into)),
            Box::new(|a: &T, b: &T| a == b),
        )
    }

    /// Create a computed with a custom equality function.
    pub fn with_equals(
        compute: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::build(Box::new(move || Ok::<T, BoxError>(compute())), Box::new(equals))
    }

    fn build(compute: ComputeFn<T>, equals: Box<dyn Fn(&T, &T) -> bool>) -> Self {
        let id = Runtime::create_node(NodeKind::Computed);
        let inner = Rc::new(ComputedInner {
            id,
            compute,
            value: RefCell::new(None),
            equals,
            runs: Cell::new(0),
        });
        Runtime::attach(id, inner.clone());
        Self { inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// If the computed reads itself (directly or through other computeds),
    /// or if its function fails. Use [`Computed::try_get`] to handle these.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| raise(err))
    }

    pub fn try_get(&self) -> Result<T> {
        let id = self.inner.id;
        Runtime::update(id)?;
        Runtime::track_read(id)?;
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(Error::CycleDetected { node: id })
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Still recomputes if the cached value is stale.
    pub fn peek(&self) -> T {
        self.try_peek().unwrap_or_else(|err| raise(err))
    }

    pub fn try_peek(&self) -> Result<T> {
        untrack(|| self.try_get())
    }

    /// Call `listener` with the new value every time the computed changes.
    ///
    /// Subscribing makes the computed observed, so it is recomputed by each
    /// flush instead of on the next read.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let computed = self.clone();
        Subscription::new(move || computed.try_get(), listener)
    }

    /// Number of committed value changes.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id).unwrap_or_default()
    }

    /// How many times the function has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> NodeState {
        Runtime::node_state(self.inner.id).unwrap_or(NodeState::Disposed)
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
