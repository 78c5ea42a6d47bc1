//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    read is recorded and the computation becomes a subscriber.
//!
//! 2. When a signal's value changes, its version is bumped and everything
//!    downstream is marked stale.
//!
//! 3. Unless a batch is open, effects that were reached run before `set`
//!    returns.
//!
//! Writes that are equal to the current value (under the signal's equality
//! function) are no-ops: no version bump, no marking, no listener calls.
//!
//! # Memory Layout
//!
//! The value lives in the handle, behind an `Rc`. The runtime only knows the
//! signal's id, version and edges. Dropping the last handle detaches the
//! signal from the graph exactly like [`Signal::destroy`].

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::observer::{UpdateEvent, UpdateSource};
use super::runtime::{raise, Runtime};
use super::subscriber::Subscription;
use crate::error::{Error, Result};
use crate::graph::{NodeId, NodeKind};

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    destroyed: Cell<bool>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if !self.destroyed.get() {
            Runtime::dispose(self.id);
        }
    }
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    ///
    /// Writes are compared with `PartialEq`. Note that under `PartialEq` a
    /// float `NaN` is never equal to itself, so writing `NaN` always counts
    /// as a change; use [`Signal::with_equals`] if that matters.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(value, |a, b| a == b)
    }

    /// Create a signal with a custom equality function.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let id = Runtime::create_node(NodeKind::Signal);
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                equals: Box::new(equals),
                destroyed: Cell::new(false),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of committed changes so far.
    pub fn version(&self) -> u64 {
        self.try_version().unwrap_or_else(|err| raise(err))
    }

    pub fn try_version(&self) -> Result<u64> {
        self.check_alive()?;
        Runtime::version(self.inner.id)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, the current computation starts
    /// depending on this signal.
    ///
    /// # Panics
    ///
    /// If the signal was destroyed.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| raise(err))
    }

    pub fn try_get(&self) -> Result<T> {
        self.check_alive()?;
        Runtime::track_read(self.inner.id)?;
        Ok(self.inner.value.borrow().clone())
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.try_peek().unwrap_or_else(|err| raise(err))
    }

    pub fn try_peek(&self) -> Result<T> {
        self.check_alive()?;
        Ok(self.inner.value.borrow().clone())
    }

    /// Tracked read that borrows the value instead of cloning it.
    ///
    /// `f` must not write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Err(err) = self.check_alive().and_then(|()| Runtime::track_read(self.inner.id)) {
            raise(err);
        }
        f(&*self.inner.value.borrow())
    }

    /// Set a new value.
    ///
    /// Unless a batch is open, dependent effects have run by the time this
    /// returns.
    ///
    /// # Panics
    ///
    /// If the signal was destroyed.
    pub fn set(&self, value: T) {
        self.commit(value, UpdateSource::Set);
    }

    /// Set a new value and report whether it was a change.
    ///
    /// Unlike [`Signal::set`], a flush that fails to settle is returned
    /// rather than reported.
    pub fn try_set(&self, value: T) -> Result<bool> {
        self.write(value, UpdateSource::Set)
    }

    /// Set a new value, labelling the write for observers.
    pub fn set_tagged(&self, value: T, tag: &'static str) {
        self.commit(value, UpdateSource::Tagged(tag));
    }

    /// Update the value using a function of the current one.
    ///
    /// `f` sees the value untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        if let Err(err) = self.check_alive() {
            raise(err);
        }
        let next = f(&*self.inner.value.borrow());
        self.commit(next, UpdateSource::Update);
    }

    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<bool> {
        self.check_alive()?;
        let next = f(&*self.inner.value.borrow());
        self.write(next, UpdateSource::Update)
    }

    /// Call `listener` with the new value after every committed change.
    ///
    /// Writes inside a batch are coalesced: the listener runs once, after the
    /// batch, with the final value. The listener is not called for the
    /// current value.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let weak: Weak<SignalInner<T>> = Rc::downgrade(&self.inner);
        let id = self.inner.id;
        Subscription::new(
            move || {
                let inner = weak.upgrade().ok_or(Error::UseAfterDestroy { node: id })?;
                Signal { inner }.try_get()
            },
            listener,
        )
    }

    /// Detach the signal from the graph. Idempotent.
    ///
    /// Computations that read it lose the edge; any later `get` or `set`
    /// on this signal fails with [`Error::UseAfterDestroy`].
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        Runtime::dispose(self.inner.id);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }

    fn check_alive(&self) -> Result<()> {
        if self.inner.destroyed.get() {
            Err(Error::UseAfterDestroy {
                node: self.inner.id,
            })
        } else {
            Ok(())
        }
    }

    /// Infallible write: programming errors panic, anything else goes to
    /// the error reporter.
    fn commit(&self, value: T, source: UpdateSource) {
        match self.write(value, source) {
            Ok(_) => {}
            Err(err) if err.is_programming_error() => raise(err),
            Err(err) => Runtime::report(&err),
        }
    }

    fn write(&self, value: T, source: UpdateSource) -> Result<bool> {
        self.check_alive()?;
        let id = self.inner.id;
        if (self.inner.equals)(&*self.inner.value.borrow(), &value) {
            return Ok(false);
        }

        let version = Runtime::version(id)?;
        Runtime::notify(|observer| {
            let old = self.inner.value.borrow();
            observer.before_update(&UpdateEvent {
                node: id,
                version,
                old: &*old,
                new: &value,
                source,
            });
        });

        let old = self.inner.value.replace(value);
        let version = Runtime::commit_write(id)?;

        Runtime::notify(|observer| {
            let new = self.inner.value.borrow();
            observer.after_update(&UpdateEvent {
                node: id,
                version,
                old: &old,
                new: &*new,
                source,
            });
        });
        drop(old);

        Runtime::flush_if_idle()?;
        Ok(true)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Signal");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<borrowed>"),
        };
        s.field("destroyed", &self.inner.destroyed.get()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Effect};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_writes_do_not_bump_version() {
        let signal = Signal::new(7);
        assert_eq!(signal.version(), 0);

        assert!(!signal.try_set(7).unwrap());
        assert_eq!(signal.version(), 0);

        assert!(signal.try_set(8).unwrap());
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn custom_equality() {
        // Case-insensitive strings.
        let signal = Signal::with_equals(String::from("Hello"), |a: &String, b: &String| {
            a.eq_ignore_ascii_case(b)
        });

        assert!(!signal.try_set("HELLO".to_string()).unwrap());
        assert_eq!(signal.peek(), "Hello");
        assert!(signal.try_set("world".to_string()).unwrap());
    }

    #[test]
    fn nan_is_always_a_change() {
        let signal = Signal::new(f64::NAN);
        assert!(signal.try_set(f64::NAN).unwrap());
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let subscription = signal.subscribe(move |v| seen_clone.borrow_mut().push(*v));
        assert!(seen.borrow().is_empty());

        signal.set(1);
        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);

        subscription.unsubscribe();
        signal.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn subscriptions_are_coalesced_by_batches() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _subscription = signal.subscribe(move |_| calls_clone.set(calls_clone.get() + 1));

        batch(|| {
            signal.set(1);
            signal.set(2);
            signal.set(3);
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn destroyed_signal_rejects_use() {
        let signal = Signal::new(1);
        signal.destroy();
        signal.destroy();

        assert!(signal.is_destroyed());
        assert!(matches!(signal.try_get(), Err(Error::UseAfterDestroy { .. })));
        assert!(matches!(signal.try_set(2), Err(Error::UseAfterDestroy { .. })));
        assert!(std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| signal.get())).is_err());
    }

    #[test]
    fn destroy_detaches_subscribers() {
        let signal = Signal::new(1);
        let reader = signal.clone();
        let effect = Effect::new(move || {
            let _ = reader.try_get();
        });
        assert_eq!(signal.subscriber_count(), 1);

        signal.destroy();
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(effect.run_count(), 1);
        effect.dispose();
    }

    #[test]
    fn dropping_the_last_handle_removes_the_node() {
        let before = Runtime::node_count();
        let signal = Signal::new(String::from("temp"));
        assert_eq!(Runtime::node_count(), before + 1);

        drop(signal);
        assert_eq!(Runtime::node_count(), before);
    }
}
