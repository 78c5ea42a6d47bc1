//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It runs during the
//!    next flush, never inline inside the `set` that changed it.
//!
//! 3. Each run tracks a fresh dependency set, which replaces the previous one.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed. This is useful for
//! cleaning up resources like event listeners or timers.
//!
//! # Lifetime
//!
//! The runtime keeps an effect alive until [`Effect::dispose`] is called.
//! Dropping every `Effect` handle does not stop it; an effect that is never
//! disposed lives as long as the thread.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::context::untrack;
use super::runtime::{Reactive, Runtime};
use crate::error::{BoxError, Error, Phase, Result};
use crate::graph::{NodeId, NodeKind, NodeState};

/// Function returned from an effect run, called before the next run and
/// on disposal.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Reads inside a cleanup never become dependencies of the effect.
    fn run(self, node: NodeId) -> Result<()> {
        Runtime::guarded(node, Phase::Cleanup, || {
            untrack(self.0);
            Ok(())
        })
    }
}

impl Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
///
/// Implemented for `()`, [`Cleanup`], `Option<Cleanup>` and `Result`s of
/// those, so effects can use `?` on fallible work.
pub trait EffectOutput {
    fn into_cleanup(self) -> std::result::Result<Option<Cleanup>, BoxError>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        Ok(self)
    }
}

impl<O, E> EffectOutput for std::result::Result<O, E>
where
    O: EffectOutput,
    E: Into<BoxError>,
{
    fn into_cleanup(self) -> std::result::Result<Option<Cleanup>, BoxError> {
        match self {
            Ok(output) => output.into_cleanup(),
            Err(err) => Err(err.into()),
        }
    }
}

pub(crate) type EffectFn = Box<dyn FnMut() -> std::result::Result<Option<Cleanup>, BoxError>>;

struct EffectInner {
    id: NodeId,
    phase: Phase,
    run: RefCell<EffectFn>,
    cleanup: RefCell<Option<Cleanup>>,
    runs: Cell<usize>,
    disposed: Cell<bool>,
}

impl Reactive for EffectInner {
    fn evaluate(&self) -> Result<bool> {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run(self.id)?;
        }

        self.runs.set(self.runs.get() + 1);
        let cleanup = {
            let mut run = self.run.borrow_mut();
            (*run)().map_err(|err| Error::from_evaluator(self.id, self.phase, err))?
        };

        if let Some(cleanup) = cleanup {
            if self.disposed.get() {
                // Disposed from inside its own run.
                cleanup.run(self.id)?;
            } else {
                *self.cleanup.borrow_mut() = Some(cleanup);
            }
        }
        Ok(false)
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it once.
    ///
    /// The first run happens inside a batch, so writes it performs are
    /// flushed after it returns. Failures, here and in later runs, go to the
    /// runtime's error reporter.
    pub fn new<F, O>(mut f: F) -> Self
    where
        F: FnMut() -> O + 'static,
        O: EffectOutput,
    {
        Self::build(Phase::Effect, Box::new(move || f().into_cleanup()))
    }

    pub(crate) fn build(phase: Phase, run: EffectFn) -> Self {
        let id = Runtime::create_node(NodeKind::Effect);
        let inner = Rc::new(EffectInner {
            id,
            phase,
            run: RefCell::new(run),
            cleanup: RefCell::new(None),
            runs: Cell::new(0),
            disposed: Cell::new(false),
        });
        Runtime::attach(id, inner.clone());

        Runtime::start_batch();
        if let Err(err) = Runtime::update(id) {
            Runtime::report(&err);
        }
        if let Err(err) = Runtime::end_batch() {
            Runtime::report(&err);
        }

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Stop the effect. Idempotent.
    ///
    /// Runs the pending cleanup, removes every dependency edge and cancels a
    /// queued run.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        Runtime::dispose(self.inner.id);

        if let Some(cleanup) = self.inner.cleanup.take() {
            if let Err(err) = cleanup.run(self.inner.id) {
                Runtime::report(&err);
            }
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// How many times the effect function has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    pub fn state(&self) -> NodeState {
        Runtime::node_state(self.inner.id).unwrap_or(NodeState::Disposed)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Signal};

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn effect_runs_immediately() {
        let calls = counter();
        let calls_clone = calls.clone();

        let effect = Effect::new(move || calls_clone.set(calls_clone.get() + 1));
        assert_eq!(calls.get(), 1);
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.state(), NodeState::Clean);
        effect.dispose();
    }

    #[test]
    fn effect_reruns_on_change() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let effect = Effect::new({
            let signal = signal.clone();
            let seen = seen.clone();
            move || seen.borrow_mut().push(signal.get())
        });

        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        effect.dispose();
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let cleanups = counter();

        let effect = Effect::new({
            let signal = signal.clone();
            let cleanups = cleanups.clone();
            move || {
                signal.get();
                let cleanups = cleanups.clone();
                Cleanup::new(move || cleanups.set(cleanups.get() + 1))
            }
        });
        assert_eq!(cleanups.get(), 0);

        signal.set(1);
        assert_eq!(cleanups.get(), 1);
        signal.set(2);
        assert_eq!(cleanups.get(), 2);

        effect.dispose();
        assert_eq!(cleanups.get(), 3);
        effect.dispose();
        assert_eq!(cleanups.get(), 3);
    }

    #[test]
    fn effect_dispose() {
        let signal = Signal::new(0);
        let calls = counter();

        let effect = Effect::new({
            let signal = signal.clone();
            let calls = calls.clone();
            move || {
                signal.get();
                calls.set(calls.get() + 1);
            }
        });
        assert_eq!(calls.get(), 1);
        assert!(!effect.is_disposed());

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn dispose_cancels_a_queued_run() {
        let signal = Signal::new(0);
        let calls = counter();
        let effect = Effect::new({
            let signal = signal.clone();
            let calls = calls.clone();
            move || {
                signal.get();
                calls.set(calls.get() + 1);
            }
        });

        batch(|| {
            signal.set(1);
            effect.dispose();
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failing_effect_reports_and_retries() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let reported_clone = reported.clone();
        Runtime::set_error_reporter(move |err| reported_clone.borrow_mut().push(err.to_string()));

        let signal = Signal::new(1);
        let effect = Effect::new({
            let signal = signal.clone();
            move || -> std::result::Result<(), String> {
                let v = signal.get();
                if v % 2 == 0 {
                    Err(format!("even value {v}"))
                } else {
                    Ok(())
                }
            }
        });
        assert!(reported.borrow().is_empty());

        signal.set(2);
        assert_eq!(reported.borrow().len(), 1);
        assert!(reported.borrow()[0].contains("even value 2"));
        assert_eq!(effect.state(), NodeState::Dirty);

        signal.set(3);
        assert_eq!(effect.state(), NodeState::Clean);
        assert_eq!(effect.run_count(), 3);

        effect.dispose();
        Runtime::reset();
    }

    #[test]
    fn dispose_from_inside_runs_the_new_cleanup() {
        let cleanups = counter();
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let signal = Signal::new(0);

        let effect = Effect::new({
            let cleanups = cleanups.clone();
            let slot = slot.clone();
            let signal = signal.clone();
            move || {
                if signal.get() > 0 {
                    if let Some(me) = slot.borrow().as_ref() {
                        me.dispose();
                    }
                }
                let cleanups = cleanups.clone();
                Cleanup::new(move || cleanups.set(cleanups.get() + 1))
            }
        });
        *slot.borrow_mut() = Some(effect.clone());

        signal.set(1);
        assert!(effect.is_disposed());
        // One for the first run's cleanup, one for the run that disposed.
        assert_eq!(cleanups.get(), 2);

        slot.borrow_mut().take();
    }
}
