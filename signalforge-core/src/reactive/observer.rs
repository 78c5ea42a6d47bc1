//! Introspection hooks.
//!
//! Observers are how inspectors, loggers and time-travel tools watch the
//! graph without being part of it. Every hook is a pure notification: the
//! return value is ignored and the runtime behaves identically with or
//! without observers attached. Observers may read values (`peek`) but must
//! not write to signals or create nodes from inside a hook.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::graph::{EdgeChange, NodeId, NodeKind};

/// Static facts about a node, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub kind: NodeKind,
    pub level: u32,
}

/// Who issued a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// `Signal::set` / `Signal::try_set`.
    Set,
    /// `Signal::update`.
    Update,
    /// `Signal::set_tagged`, with the caller's tag.
    Tagged(&'static str),
}

/// A committed signal write.
///
/// Values are type-erased; observers that know the signal's type can
/// `downcast_ref` them.
pub struct UpdateEvent<'a> {
    pub node: NodeId,
    /// Version before the write for `before_update`, after it for `after_update`.
    pub version: u64,
    pub old: &'a dyn Any,
    pub new: &'a dyn Any,
    pub source: UpdateSource,
}

impl std::fmt::Debug for UpdateEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateEvent")
            .field("node", &self.node)
            .field("version", &self.version)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Receives notifications about graph activity.
///
/// All methods default to no-ops.
pub trait Observer {
    fn node_created(&self, _node: NodeInfo) {}

    fn node_disposed(&self, _node: NodeInfo) {}

    /// A write is about to be committed.
    fn before_update(&self, _event: &UpdateEvent<'_>) {}

    /// A write was committed. Subscribers are already marked but the flush
    /// has not run yet.
    fn after_update(&self, _event: &UpdateEvent<'_>) {}

    fn edge_changed(&self, _change: EdgeChange) {}
}

/// Handle for removing an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
