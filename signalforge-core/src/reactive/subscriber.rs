//! Subscriptions.
//!
//! A subscription calls a listener with a node's new value every time the
//! node commits a change. Under the hood it is an effect that reads the node
//! and skips its first run, so listeners get the same batching and ordering
//! as every other effect.

use super::context::untrack;
use super::effect::{Cleanup, Effect};
use crate::error::{BoxError, Phase, Result};
use crate::graph::NodeId;

/// Handle to a registered listener.
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`].
#[must_use = "the listener stays registered until `unsubscribe` is called"]
#[derive(Debug, Clone)]
pub struct Subscription {
    effect: Effect,
}

impl Subscription {
    pub(crate) fn new<T: 'static>(
        read: impl Fn() -> Result<T> + 'static,
        listener: impl Fn(&T) + 'static,
    ) -> Self {
        let mut initial = true;
        let effect = Effect::build(
            Phase::Listener,
            Box::new(move || -> std::result::Result<Option<Cleanup>, BoxError> {
                let value = read()?;
                if initial {
                    initial = false;
                } else {
                    untrack(|| listener(&value));
                }
                Ok(None)
            }),
        );
        Self { effect }
    }

    /// Stop calling the listener. Idempotent.
    pub fn unsubscribe(self) {
        self.effect.dispose();
    }

    pub fn is_active(&self) -> bool {
        !self.effect.is_disposed()
    }

    /// The id of the effect backing this subscription.
    pub fn id(&self) -> NodeId {
        self.effect.id()
    }
}
