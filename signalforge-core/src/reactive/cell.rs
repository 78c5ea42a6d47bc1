//! A common interface over signals and computeds.
//!
//! Code that only needs to read, subscribe to, or possibly write a reactive
//! value (persistence, bindings, inspectors) can take a `&dyn ReactiveCell<T>`
//! and work with either kind. Writing through the trait to a computed fails
//! with [`Error::ReadOnlyViolation`].

use super::computed::Computed;
use super::signal::Signal;
use super::subscriber::Subscription;
use crate::error::{Error, Result};
use crate::graph::NodeId;

pub trait ReactiveCell<T> {
    fn node_id(&self) -> NodeId;

    /// Tracked read.
    fn try_get(&self) -> Result<T>;

    /// Untracked read.
    fn try_peek(&self) -> Result<T>;

    fn try_set(&self, value: T) -> Result<()>;

    fn subscribe(&self, listener: Box<dyn Fn(&T)>) -> Subscription;

    fn is_writable(&self) -> bool;
}

impl<T: Clone + 'static> ReactiveCell<T> for Signal<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn try_get(&self) -> Result<T> {
        Signal::try_get(self)
    }

    fn try_peek(&self) -> Result<T> {
        Signal::try_peek(self)
    }

    fn try_set(&self, value: T) -> Result<()> {
        Signal::try_set(self, value).map(|_| ())
    }

    fn subscribe(&self, listener: Box<dyn Fn(&T)>) -> Subscription {
        Signal::subscribe(self, listener)
    }

    fn is_writable(&self) -> bool {
        !self.is_destroyed()
    }
}

impl<T: Clone + 'static> ReactiveCell<T> for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn try_get(&self) -> Result<T> {
        Computed::try_get(self)
    }

    fn try_peek(&self) -> Result<T> {
        Computed::try_peek(self)
    }

    fn try_set(&self, _value: T) -> Result<()> {
        Err(Error::ReadOnlyViolation { node: self.id() })
    }

    fn subscribe(&self, listener: Box<dyn Fn(&T)>) -> Subscription {
        Computed::subscribe(self, listener)
    }

    fn is_writable(&self) -> bool {
        false
    }
}
