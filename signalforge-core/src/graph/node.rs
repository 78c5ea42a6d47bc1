//! Graph Nodes
//!
//! This module defines the metadata every reactive value keeps in the
//! dependency graph. Values themselves live in the typed handles
//! ([`Signal`](crate::reactive::Signal), [`Computed`](crate::reactive::Computed));
//! the graph only sees ids, versions, dirty state and edges.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are process-unique and never reused, so a stale id can only ever
/// miss in the graph, never alias a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A writable source node. Signals are the roots of the graph:
    /// they have subscribers but never dependencies.
    Signal,

    /// A derived node. Computeds have dependencies and may have subscribers.
    /// Their value is cached in the handle.
    Computed,

    /// A side-effecting node. Effects are the leaves of the graph:
    /// they have dependencies but nothing can subscribe to them.
    Effect,
}

/// Freshness of a node.
///
/// The first three states are ordered by staleness, which is what
/// [`Node::mark`] relies on to only ever raise a node's staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// The node's value is consistent with its dependencies.
    Clean,

    /// Something upstream changed. The node must compare its dependencies'
    /// versions before deciding whether to recompute.
    MaybeDirty,

    /// A direct dependency changed. The node must recompute.
    Dirty,

    /// The node's function is running (or its dependencies are being
    /// verified). Re-entering it in this state is a cycle.
    Evaluating,

    /// The node was destroyed or disposed.
    Disposed,
}

impl NodeState {
    /// Whether the node needs any work before its value can be trusted.
    pub fn is_stale(self) -> bool {
        matches!(self, NodeState::MaybeDirty | NodeState::Dirty)
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    state: NodeState,

    /// Staleness requested while the node was evaluating. Applied when the
    /// evaluation finishes so that a write issued from inside the node's own
    /// function is not lost.
    pending: NodeState,

    /// Bumped on every observable value change.
    version: u64,

    /// Topological depth: 0 for signals, `max(dependency levels) + 1` otherwise.
    level: u32,

    /// Nodes read during the last successful evaluation, in read order,
    /// with the version each one had when it was read.
    dependencies: IndexMap<NodeId, u64>,

    /// Nodes that read this node while tracking. Inverse of `dependencies`.
    subscribers: IndexSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Create a node for an id that was allocated ahead of time.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            state: match kind {
                NodeKind::Signal => NodeState::Clean,
                // Start dirty to ensure the first evaluation happens.
                NodeKind::Computed | NodeKind::Effect => NodeState::Dirty,
            },
            pending: NodeState::Clean,
            version: 0,
            level: match kind {
                NodeKind::Signal => 0,
                NodeKind::Computed | NodeKind::Effect => 1,
            },
            dependencies: IndexMap::new(),
            subscribers: IndexSet::new(),
        }
    }

    /// Create a new signal node.
    pub fn signal() -> Self {
        Self::new(NodeKind::Signal)
    }

    /// Create a new computed node.
    pub fn computed() -> Self {
        Self::new(NodeKind::Computed)
    }

    /// Create a new effect node.
    pub fn effect() -> Self {
        Self::new(NodeKind::Effect)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub(crate) fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    /// Record that the node's value changed.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Raise the node's staleness to `state` (`MaybeDirty` or `Dirty`).
    ///
    /// Never lowers staleness. A node that is evaluating remembers the mark
    /// and applies it when the evaluation finishes. Returns `true` if the
    /// node was clean before the call.
    pub fn mark(&mut self, state: NodeState) -> bool {
        debug_assert!(state.is_stale(), "can only mark a node stale");
        match self.state {
            NodeState::Clean => {
                self.state = state;
                true
            }
            NodeState::MaybeDirty | NodeState::Dirty => {
                self.state = self.state.max(state);
                false
            }
            NodeState::Evaluating => {
                self.pending = self.pending.max(state);
                false
            }
            NodeState::Disposed => false,
        }
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        if self.state != NodeState::Disposed {
            self.state = NodeState::Clean;
        }
    }

    /// Enter the `Evaluating` state.
    pub fn begin_evaluation(&mut self) {
        self.state = NodeState::Evaluating;
        self.pending = NodeState::Clean;
    }

    /// Leave the `Evaluating` state.
    ///
    /// `outcome` is `Clean` after a successful evaluation and `Dirty` after a
    /// failed one; any mark received mid-evaluation wins if it is staler.
    pub fn finish_evaluation(&mut self, outcome: NodeState) {
        if self.state == NodeState::Disposed {
            return;
        }
        self.state = outcome.max(self.pending);
        self.pending = NodeState::Clean;
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.state = NodeState::Disposed;
    }

    /// Dependencies with the versions observed when they were read.
    pub fn dependencies(&self) -> &IndexMap<NodeId, u64> {
        &self.dependencies
    }

    pub(crate) fn replace_dependencies(
        &mut self,
        dependencies: IndexMap<NodeId, u64>,
    ) -> IndexMap<NodeId, u64> {
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Add a subscriber (a node that reads from this node).
    pub fn add_subscriber(&mut self, node_id: NodeId) {
        self.subscribers.insert(node_id);
    }

    /// Remove a subscriber.
    pub fn remove_subscriber(&mut self, node_id: NodeId) {
        self.subscribers.shift_remove(&node_id);
    }

    /// Subscribers in the order they first subscribed.
    pub fn subscribers(&self) -> &IndexSet<NodeId> {
        &self.subscribers
    }
}
