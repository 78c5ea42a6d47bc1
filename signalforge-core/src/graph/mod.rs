//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! signals, computeds and effects, plus the batcher that schedules their
//! updates.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent signals (sources), computeds (derived) or effects (sinks)
//! - Edges represent reads: if A read B during its last evaluation, there is
//!   an edge from B to A
//!
//! When a signal changes, we walk the graph to find all affected nodes and
//! mark them stale. The scheduler then settles them in level order so that a
//! node never observes a half-updated set of inputs.
//!
//! # Design Decisions
//!
//! 1. We use a centralized arena rather than per-node linked lists because:
//!    - It makes level ordering and edge symmetry easy to maintain
//!    - Subscriber edges are plain ids, so nothing keeps a consumer alive
//!
//! 2. The arena is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (subscribers) edges
//!    to enable efficient traversal in both directions.

mod arena;
mod node;
mod scheduler;

pub use arena::{EdgeChange, EdgeChangeKind};
pub use node::{Node, NodeId, NodeKind, NodeState};
pub use scheduler::BatchPhase;

pub(crate) use arena::{EdgeChanges, Graph};
pub(crate) use scheduler::Batcher;
