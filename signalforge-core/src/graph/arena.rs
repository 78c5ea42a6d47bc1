//! Node Arena
//!
//! The arena owns every node's metadata, indexed by [`NodeId`]. Edges are
//! stored on both ends (dependencies and subscribers) and every mutation
//! goes through this type so that the two sides never disagree.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

use super::node::{Node, NodeId, NodeKind, NodeState};

/// Whether an edge appeared or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeChangeKind {
    Added,
    Removed,
}

/// A dependency edge that was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeChange {
    /// The node being read.
    pub dependency: NodeId,
    /// The node doing the reading.
    pub subscriber: NodeId,
    pub kind: EdgeChangeKind,
}

pub(crate) type EdgeChanges = SmallVec<[EdgeChange; 4]>;

/// Nodes reached by a change, split by how the scheduler treats them.
#[derive(Debug, Default)]
pub(crate) struct Marked {
    pub computeds: Vec<NodeId>,
    pub effects: Vec<NodeId>,
}

/// The dependency graph.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    nodes: HashMap<NodeId, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph together with every edge touching it.
    pub fn remove(&mut self, node_id: NodeId) -> Option<(Node, EdgeChanges)> {
        let mut node = self.nodes.remove(&node_id)?;
        let mut changes = EdgeChanges::new();

        for &dependency in node.dependencies().keys() {
            if let Some(dep) = self.nodes.get_mut(&dependency) {
                dep.remove_subscriber(node_id);
            }
            changes.push(EdgeChange {
                dependency,
                subscriber: node_id,
                kind: EdgeChangeKind::Removed,
            });
        }

        for &subscriber in node.subscribers() {
            if let Some(sub) = self.nodes.get_mut(&subscriber) {
                sub.remove_dependency(node_id);
            }
            changes.push(EdgeChange {
                dependency: node_id,
                subscriber,
                kind: EdgeChangeKind::Removed,
            });
        }

        node.mark_disposed();
        Some((node, changes))
    }

    pub fn get(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Install the dependency set recorded by an evaluation of `subscriber`.
    ///
    /// The new set replaces the old one: edges to nodes that were not read
    /// this time are removed, edges to newly read nodes are added. The
    /// subscriber's level is recomputed and pushed downstream if it grew.
    pub fn replace_dependencies(
        &mut self,
        subscriber: NodeId,
        dependencies: IndexMap<NodeId, u64>,
    ) -> EdgeChanges {
        let mut changes = EdgeChanges::new();

        // Reads of nodes that vanished mid-evaluation cannot form edges.
        let dependencies: IndexMap<NodeId, u64> = dependencies
            .into_iter()
            .filter(|(id, _)| *id != subscriber && self.nodes.contains_key(id))
            .collect();

        let level = dependencies
            .keys()
            .filter_map(|id| self.nodes.get(id))
            .map(|dep| dep.level() + 1)
            .max()
            .unwrap_or(1);

        let previous = match self.nodes.get_mut(&subscriber) {
            Some(node) => node.replace_dependencies(dependencies.clone()),
            None => return changes,
        };

        for &dependency in previous.keys() {
            if !dependencies.contains_key(&dependency) {
                if let Some(dep) = self.nodes.get_mut(&dependency) {
                    dep.remove_subscriber(subscriber);
                }
                changes.push(EdgeChange {
                    dependency,
                    subscriber,
                    kind: EdgeChangeKind::Removed,
                });
            }
        }

        for &dependency in dependencies.keys() {
            if !previous.contains_key(&dependency) {
                if let Some(dep) = self.nodes.get_mut(&dependency) {
                    dep.add_subscriber(subscriber);
                }
                changes.push(EdgeChange {
                    dependency,
                    subscriber,
                    kind: EdgeChangeKind::Added,
                });
            }
        }

        self.update_level(subscriber, level);
        changes
    }

    /// Set a node's level and re-level everything downstream that depends on it.
    fn update_level(&mut self, node_id: NodeId, level: u32) {
        let mut queue = VecDeque::new();
        match self.nodes.get_mut(&node_id) {
            Some(node) if node.level() != level => {
                node.set_level(level);
                queue.extend(node.subscribers().iter().copied());
            }
            _ => return,
        }

        // Bounded by the node count so a malformed graph cannot spin forever.
        let mut budget = self.nodes.len();
        while let Some(id) = queue.pop_front() {
            if budget == 0 {
                break;
            }
            budget -= 1;

            let wanted = match self.nodes.get(&id) {
                Some(node) => node
                    .dependencies()
                    .keys()
                    .filter_map(|dep| self.nodes.get(dep))
                    .map(|dep| dep.level() + 1)
                    .max()
                    .unwrap_or(1),
                None => continue,
            };

            if let Some(node) = self.nodes.get_mut(&id) {
                if node.level() < wanted {
                    node.set_level(wanted);
                    queue.extend(node.subscribers().iter().copied());
                }
            }
        }
    }

    /// Propagate a change of `source` through the graph.
    ///
    /// Direct subscribers become `Dirty`, everything further downstream
    /// `MaybeDirty`. Every reached computed and effect is returned so the
    /// scheduler can queue it.
    pub fn mark_changed(&mut self, source: NodeId) -> Marked {
        let mut marked = Marked::default();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(NodeId, NodeState)> = match self.nodes.get(&source) {
            Some(node) => node
                .subscribers()
                .iter()
                .map(|&id| (id, NodeState::Dirty))
                .collect(),
            None => return marked,
        };

        // BFS: direct subscribers are queued first, so each is visited
        // with `Dirty` before any transitive `MaybeDirty` visit.
        while let Some((node_id, state)) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if node.state() == NodeState::Disposed {
                continue;
            }

            node.mark(state);
            match node.kind() {
                NodeKind::Computed => marked.computeds.push(node_id),
                NodeKind::Effect => marked.effects.push(node_id),
                NodeKind::Signal => {}
            }

            for &subscriber in node.subscribers() {
                queue.push_back((subscriber, NodeState::MaybeDirty));
            }
        }

        tracing::trace!(
            source = %source,
            computeds = marked.computeds.len(),
            effects = marked.effects.len(),
            "marked subgraph stale"
        );
        marked
    }

    /// Whether some effect (transitively) reads this node.
    ///
    /// Unobserved computeds stay lazy: nothing is waiting for their value.
    pub fn is_observed(&self, node_id: NodeId, cache: &mut HashMap<NodeId, bool>) -> bool {
        if let Some(&known) = cache.get(&node_id) {
            return known;
        }
        // Provisional answer guards against revisiting during the walk.
        cache.insert(node_id, false);

        let observed = match self.nodes.get(&node_id) {
            Some(node) if node.kind() == NodeKind::Effect => true,
            Some(node) => node
                .subscribers()
                .iter()
                .any(|&sub| self.is_observed(sub, cache)),
            None => false,
        };

        cache.insert(node_id, observed);
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(entries: &[(NodeId, u64)]) -> IndexMap<NodeId, u64> {
        entries.iter().copied().collect()
    }

    fn clean(graph: &mut Graph, ids: &[NodeId]) {
        for id in ids {
            graph.get_mut(*id).unwrap().mark_clean();
        }
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = Graph::new();

        let id1 = graph.insert(Node::signal());
        let id2 = graph.insert(Node::computed());
        assert_eq!(graph.len(), 2);

        let (removed, _) = graph.remove(id1).unwrap();
        assert_eq!(removed.state(), NodeState::Disposed);
        assert_eq!(graph.len(), 1);
        assert!(graph.get(id1).is_none());
        assert!(graph.get(id2).is_some());
    }

    #[test]
    fn replacing_dependencies_keeps_edges_symmetric() {
        let mut graph = Graph::new();
        let a = graph.insert(Node::signal());
        let b = graph.insert(Node::signal());
        let c = graph.insert(Node::computed());

        let changes = graph.replace_dependencies(c, deps(&[(a, 0), (b, 0)]));
        assert_eq!(changes.len(), 2);
        assert!(graph.get(a).unwrap().subscribers().contains(&c));
        assert!(graph.get(b).unwrap().subscribers().contains(&c));

        let changes = graph.replace_dependencies(c, deps(&[(b, 0)]));
        assert_eq!(
            changes.as_slice(),
            &[EdgeChange {
                dependency: a,
                subscriber: c,
                kind: EdgeChangeKind::Removed,
            }]
        );
        assert!(!graph.get(a).unwrap().subscribers().contains(&c));
        assert!(graph.get(b).unwrap().subscribers().contains(&c));
        assert_eq!(graph.get(c).unwrap().dependencies().len(), 1);
    }

    #[test]
    fn removing_a_node_detaches_both_directions() {
        let mut graph = Graph::new();
        let s = graph.insert(Node::signal());
        let c = graph.insert(Node::computed());
        let e = graph.insert(Node::effect());
        graph.replace_dependencies(c, deps(&[(s, 0)]));
        graph.replace_dependencies(e, deps(&[(c, 0)]));

        let (_, changes) = graph.remove(c).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(graph.get(s).unwrap().subscribers().is_empty());
        assert!(graph.get(e).unwrap().dependencies().is_empty());
    }

    #[test]
    fn levels_follow_dependency_depth() {
        let mut graph = Graph::new();
        let s = graph.insert(Node::signal());
        let a = graph.insert(Node::computed());
        let b = graph.insert(Node::computed());
        let e = graph.insert(Node::effect());

        graph.replace_dependencies(a, deps(&[(s, 0)]));
        graph.replace_dependencies(b, deps(&[(s, 0)]));
        graph.replace_dependencies(e, deps(&[(b, 0)]));
        assert_eq!(graph.get(a).unwrap().level(), 1);
        assert_eq!(graph.get(e).unwrap().level(), 2);

        // b now also reads a, so b and everything below it move down a level.
        graph.replace_dependencies(b, deps(&[(s, 0), (a, 0)]));
        assert_eq!(graph.get(b).unwrap().level(), 2);
        assert_eq!(graph.get(e).unwrap().level(), 3);
    }

    #[test]
    fn mark_changed_propagates() {
        let mut graph = Graph::new();

        // source -> derived1 -> derived2 -> effect
        let source = graph.insert(Node::signal());
        let derived1 = graph.insert(Node::computed());
        let derived2 = graph.insert(Node::computed());
        let effect = graph.insert(Node::effect());
        graph.replace_dependencies(derived1, deps(&[(source, 0)]));
        graph.replace_dependencies(derived2, deps(&[(derived1, 0)]));
        graph.replace_dependencies(effect, deps(&[(derived2, 0)]));
        clean(&mut graph, &[derived1, derived2, effect]);

        let marked = graph.mark_changed(source);

        assert_eq!(marked.computeds, vec![derived1, derived2]);
        assert_eq!(marked.effects, vec![effect]);
        assert_eq!(graph.get(derived1).unwrap().state(), NodeState::Dirty);
        assert_eq!(graph.get(derived2).unwrap().state(), NodeState::MaybeDirty);
        assert_eq!(graph.get(effect).unwrap().state(), NodeState::MaybeDirty);
    }

    #[test]
    fn diamond_is_visited_once_per_node() {
        let mut graph = Graph::new();
        let s = graph.insert(Node::signal());
        let a = graph.insert(Node::computed());
        let b = graph.insert(Node::computed());
        let c = graph.insert(Node::computed());
        graph.replace_dependencies(a, deps(&[(s, 0)]));
        graph.replace_dependencies(b, deps(&[(s, 0)]));
        graph.replace_dependencies(c, deps(&[(a, 0), (b, 0)]));
        clean(&mut graph, &[a, b, c]);

        let marked = graph.mark_changed(s);
        assert_eq!(marked.computeds, vec![a, b, c]);
    }

    #[test]
    fn observation_requires_a_downstream_effect() {
        let mut graph = Graph::new();
        let s = graph.insert(Node::signal());
        let lazy = graph.insert(Node::computed());
        let watched = graph.insert(Node::computed());
        let effect = graph.insert(Node::effect());
        graph.replace_dependencies(lazy, deps(&[(s, 0)]));
        graph.replace_dependencies(watched, deps(&[(s, 0)]));
        graph.replace_dependencies(effect, deps(&[(watched, 0)]));

        let mut cache = HashMap::new();
        assert!(!graph.is_observed(lazy, &mut cache));
        assert!(graph.is_observed(watched, &mut cache));
        assert!(graph.is_observed(s, &mut cache));
    }
}
