//! Update Scheduler
//!
//! The batcher collects stale nodes between a write and the flush that
//! settles them, and decides the order in which a flush pass visits them.
//!
//! # State machine
//!
//! ```text
//! idle (depth 0) --start--> batching (depth >= 1) --end to 0--> flushing --drained--> idle
//! ```
//!
//! Writes issued while batching only mark and enqueue. The flush drains the
//! queues in passes; each pass first settles observed computeds in ascending
//! level order, then runs effects in ascending level order (ties keep the
//! order in which they were scheduled). Writes made by effects land in the
//! queues again and are picked up by the next pass.

use indexmap::IndexSet;

use super::arena::{Graph, Marked};
use super::node::NodeId;

/// Where the batcher is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// No batch open, nothing flushing.
    Idle,
    /// At least one batch scope is open.
    Batching,
    /// A flush is draining the queues.
    Flushing,
}

/// One pass worth of work, already in execution order.
#[derive(Debug, Default)]
pub(crate) struct Pass {
    pub computeds: Vec<NodeId>,
    pub effects: Vec<NodeId>,
}

impl Pass {
    pub fn is_empty(&self) -> bool {
        self.computeds.is_empty() && self.effects.is_empty()
    }
}

/// Batch depth plus the queues of nodes waiting for a flush.
#[derive(Debug, Default)]
pub(crate) struct Batcher {
    depth: usize,
    flushing: bool,
    pending_computeds: IndexSet<NodeId>,
    pending_effects: IndexSet<NodeId>,
}

impl Batcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BatchPhase {
        if self.flushing {
            BatchPhase::Flushing
        } else if self.depth > 0 {
            BatchPhase::Batching
        } else {
            BatchPhase::Idle
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn start(&mut self) {
        self.depth += 1;
    }

    /// Close one batch scope.
    ///
    /// Returns `None` if no scope was open, otherwise whether the outermost
    /// scope just closed.
    pub fn end(&mut self) -> Option<bool> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        Some(self.depth == 0)
    }

    /// Whether a write right now should flush immediately.
    pub fn is_idle(&self) -> bool {
        self.depth == 0 && !self.flushing
    }

    /// Enter the flushing state. Returns `false` if a flush is already running.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        true
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    pub fn enqueue(&mut self, marked: Marked) {
        self.pending_computeds.extend(marked.computeds);
        self.pending_effects.extend(marked.effects);
    }

    pub fn enqueue_effect(&mut self, node_id: NodeId) {
        self.pending_effects.insert(node_id);
    }

    /// Drop a node from both queues, e.g. because it was disposed.
    pub fn forget(&mut self, node_id: NodeId) {
        self.pending_computeds.shift_remove(&node_id);
        self.pending_effects.shift_remove(&node_id);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_computeds.is_empty() || !self.pending_effects.is_empty()
    }

    /// Take everything queued so far, ordered for execution.
    ///
    /// Nodes that no longer exist in the graph are dropped here.
    pub fn take_pass(&mut self, graph: &Graph) -> Pass {
        let level = |id: &NodeId| graph.get(*id).map(|node| node.level());

        let mut computeds: Vec<(u32, NodeId)> = self
            .pending_computeds
            .drain(..)
            .filter_map(|id| level(&id).map(|l| (l, id)))
            .collect();
        let mut effects: Vec<(u32, NodeId)> = self
            .pending_effects
            .drain(..)
            .filter_map(|id| level(&id).map(|l| (l, id)))
            .collect();

        // Stable sorts: equal levels keep their scheduling order.
        computeds.sort_by_key(|(level, _)| *level);
        effects.sort_by_key(|(level, _)| *level);

        Pass {
            computeds: computeds.into_iter().map(|(_, id)| id).collect(),
            effects: effects.into_iter().map(|(_, id)| id).collect(),
        }
    }

    /// Clear the queues and return to idle.
    pub fn reset(&mut self) {
        self.depth = 0;
        self.flushing = false;
        self.pending_computeds.clear();
        self.pending_effects.clear();
    }

    /// Clear the queues only, leaving batch depth alone.
    pub fn clear_pending(&mut self) {
        self.pending_computeds.clear();
        self.pending_effects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use indexmap::IndexMap;

    #[test]
    fn depth_tracks_nested_scopes() {
        let mut batcher = Batcher::new();
        assert_eq!(batcher.phase(), BatchPhase::Idle);

        batcher.start();
        batcher.start();
        assert_eq!(batcher.phase(), BatchPhase::Batching);
        assert_eq!(batcher.depth(), 2);

        assert_eq!(batcher.end(), Some(false));
        assert_eq!(batcher.end(), Some(true));
        assert_eq!(batcher.end(), None);
        assert!(batcher.is_idle());
    }

    #[test]
    fn flushing_is_not_reentrant() {
        let mut batcher = Batcher::new();
        assert!(batcher.begin_flush());
        assert!(!batcher.begin_flush());
        assert_eq!(batcher.phase(), BatchPhase::Flushing);
        assert!(!batcher.is_idle());

        batcher.end_flush();
        assert!(batcher.is_idle());
    }

    #[test]
    fn pass_is_ordered_by_level_then_schedule_order() {
        let mut graph = Graph::new();
        let s = graph.insert(Node::signal());
        let low = graph.insert(Node::computed());
        let high = graph.insert(Node::computed());
        let e_high = graph.insert(Node::effect());
        let e_low = graph.insert(Node::effect());
        let e_low2 = graph.insert(Node::effect());

        graph.replace_dependencies(low, [(s, 0)].into_iter().collect::<IndexMap<_, _>>());
        graph.replace_dependencies(high, [(low, 0)].into_iter().collect::<IndexMap<_, _>>());
        graph.replace_dependencies(e_high, [(high, 0)].into_iter().collect::<IndexMap<_, _>>());
        graph.replace_dependencies(e_low, [(s, 0)].into_iter().collect::<IndexMap<_, _>>());
        graph.replace_dependencies(e_low2, [(s, 0)].into_iter().collect::<IndexMap<_, _>>());

        let mut batcher = Batcher::new();
        batcher.enqueue(Marked {
            computeds: vec![high, low],
            effects: vec![e_high, e_low, e_low2],
        });
        assert!(batcher.has_pending());

        let pass = batcher.take_pass(&graph);
        assert_eq!(pass.computeds, vec![low, high]);
        assert_eq!(pass.effects, vec![e_low, e_low2, e_high]);
        assert!(!batcher.has_pending());
    }

    #[test]
    fn forgotten_and_missing_nodes_are_skipped() {
        let mut graph = Graph::new();
        let kept = graph.insert(Node::effect());
        let forgotten = graph.insert(Node::effect());
        let missing = NodeId::new();

        let mut batcher = Batcher::new();
        batcher.enqueue_effect(kept);
        batcher.enqueue_effect(forgotten);
        batcher.enqueue_effect(missing);
        batcher.forget(forgotten);

        let pass = batcher.take_pass(&graph);
        assert_eq!(pass.effects, vec![kept]);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut batcher = Batcher::new();
        batcher.start();
        batcher.begin_flush();
        batcher.enqueue_effect(NodeId::new());

        batcher.reset();
        assert_eq!(batcher.phase(), BatchPhase::Idle);
        assert!(!batcher.has_pending());
    }
}
