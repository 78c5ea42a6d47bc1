//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or computed is
//! read, the read is attributed to the computation on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Evaluating a computed or effect
//! pushes a frame for that node; [`untrack`] pushes an inert frame that
//! swallows reads for its dynamic extent. Frames are popped by an RAII guard,
//! so the stack stays balanced even when the computation fails or unwinds.
//!
//! Reads are collected per frame together with the version each node had
//! when it was read. The runtime turns that set into graph edges once the
//! evaluation finishes.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The node being evaluated, or `None` for an untracked scope.
    observer: Option<NodeId>,
    /// Nodes read so far, in read order, with the version seen.
    dependencies: IndexMap<NodeId, u64>,
}

/// Guard that pops its frame when dropped.
pub(crate) struct ReactiveContext {
    observer: Option<NodeId>,
    depth: usize,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a tracking frame for `node`.
    pub fn enter(node: NodeId) -> Self {
        Self::push(Some(node))
    }

    /// Enter an inert frame: reads inside it create no edges.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(observer: Option<NodeId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                observer,
                dependencies: IndexMap::new(),
            });
            stack.len()
        });

        Self {
            observer,
            depth,
            popped: false,
        }
    }

    /// The node reads are currently attributed to, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
            .ok()
            .flatten()
    }

    /// Record a read of `node` at `version` in the top frame.
    ///
    /// The first read of a node within a frame wins; repeated reads are no-ops.
    pub fn track_dependency(node: NodeId, version: u64) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.observer.is_some() && entry.observer != Some(node) {
                    entry.dependencies.entry(node).or_insert(version);
                }
            }
        });
    }

    /// Pop the frame and hand back what was read inside it.
    pub fn finish(mut self) -> IndexMap<NodeId, u64> {
        self.popped = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                // Verify we're popping the right frame. This catches guards
                // being dropped out of order.
                debug_assert_eq!(
                    stack.len(),
                    self.depth,
                    "ReactiveContext mismatch for {:?}",
                    self.observer
                );
                let entry = stack.pop();
                if let Some(entry) = &entry {
                    debug_assert_eq!(entry.observer, self.observer);
                }
                entry
            })
            .ok()
            .flatten()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.popped {
            self.pop();
        }
    }
}

/// Whether reads right now would be recorded as dependencies.
pub fn is_tracking() -> bool {
    ReactiveContext::current_observer().is_some()
}

/// Run `f` without attributing any of its reads to the current computation.
///
/// Values read inside `f` are current, but no dependency edges are created,
/// so later changes to them will not re-run the enclosing computed or effect.
///
/// ```rust,ignore
/// let total = Computed::new(move || a.get() + untrack(|| b.get()));
/// ```
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let id = NodeId::new();

        assert!(!is_tracking());
        assert!(ReactiveContext::current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(id);
            assert!(is_tracking());
            assert_eq!(ReactiveContext::current_observer(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!is_tracking());
    }

    #[test]
    fn context_collects_dependencies_in_read_order() {
        let id = NodeId::new();
        let (a, b, c) = (NodeId::new(), NodeId::new(), NodeId::new());
        let ctx = ReactiveContext::enter(id);

        ReactiveContext::track_dependency(b, 3);
        ReactiveContext::track_dependency(a, 1);
        ReactiveContext::track_dependency(b, 4);
        ReactiveContext::track_dependency(c, 0);

        let deps = ctx.finish();
        let order: Vec<_> = deps.iter().map(|(id, v)| (*id, *v)).collect();
        assert_eq!(order, vec![(b, 3), (a, 1), (c, 0)]);
        assert!(!is_tracking());
    }

    #[test]
    fn self_reads_are_not_dependencies() {
        let id = NodeId::new();
        let ctx = ReactiveContext::enter(id);
        ReactiveContext::track_dependency(id, 0);
        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_observer(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_observer(), Some(id1));
        }

        assert!(ReactiveContext::current_observer().is_none());
    }

    #[test]
    fn untrack_suspends_only_its_extent() {
        let outer = NodeId::new();
        let read_inside = NodeId::new();
        let read_after = NodeId::new();
        let ctx = ReactiveContext::enter(outer);

        untrack(|| {
            assert!(!is_tracking());
            ReactiveContext::track_dependency(read_inside, 0);
        });
        assert!(is_tracking());
        ReactiveContext::track_dependency(read_after, 0);

        let deps = ctx.finish();
        assert!(!deps.contains_key(&read_inside));
        assert!(deps.contains_key(&read_after));
    }

    #[test]
    fn frames_pop_on_unwind() {
        let id = NodeId::new();
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(id);
            panic!("evaluation failed");
        });

        assert!(result.is_err());
        assert!(!is_tracking());
    }
}
