//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the batcher and the registry
//! of evaluators, and it runs the propagation algorithm.
//!
//! # How It Works
//!
//! 1. Creating a signal, computed or effect registers a node with the runtime.
//!
//! 2. Reads inside a computed or effect are recorded by the reactive context
//!    and turned into graph edges when the evaluation finishes.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Bumps the signal's version
//!    b. Marks direct subscribers dirty and everything below them maybe-dirty
//!    c. Queues the reached computeds and effects
//!    d. Flushes, unless a batch is open
//!
//! 4. Settling a node is pull-based: a maybe-dirty node first settles its
//!    dependencies in the order it read them and only recomputes if one of
//!    their versions moved. Computeds with no observing effect are never
//!    settled by a flush; they recompute on their next read.
//!
//! # Threading
//!
//! Each thread has its own runtime. Handles are `!Send`, so a graph is only
//! ever touched by the thread that built it and no locking is needed.
//! Everything that calls into user code does so without holding a borrow of
//! the runtime's state, so user code may freely read and write other nodes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::observer::{NodeInfo, Observer, ObserverId};
use crate::config::RuntimeConfig;
use crate::error::{Error, Phase, Result};
use crate::graph::{BatchPhase, Batcher, EdgeChanges, Graph, Node, NodeId, NodeKind, NodeState};

/// A node the runtime knows how to (re)evaluate.
pub(crate) trait Reactive {
    /// Run the node's function once. Reads are attributed to the node by
    /// the caller. Returns whether the node's observable value changed.
    fn evaluate(&self) -> Result<bool>;

    /// Eager nodes (effects) are kept alive by the runtime until disposed.
    /// Lazy nodes (computeds) live as long as their handles.
    fn is_eager(&self) -> bool;

    /// What to call a failure of this node in error reports.
    fn phase(&self) -> Phase;
}

/// How the registry holds a node's evaluator.
enum Entry {
    Lazy(Weak<dyn Reactive>),
    Eager(Rc<dyn Reactive>),
}

impl Entry {
    fn upgrade(&self) -> Option<Rc<dyn Reactive>> {
        match self {
            Entry::Lazy(weak) => weak.upgrade(),
            Entry::Eager(rc) => Some(Rc::clone(rc)),
        }
    }
}

type Reporter = Rc<dyn Fn(&Error)>;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// The per-thread reactive runtime.
///
/// There is exactly one per thread and it is reached through associated
/// functions; the struct itself is never handed out.
pub struct Runtime {
    graph: RefCell<Graph>,
    batcher: RefCell<Batcher>,
    registry: RefCell<HashMap<NodeId, Entry>>,
    observers: RefCell<Vec<(ObserverId, Rc<dyn Observer>)>>,
    config: RefCell<RuntimeConfig>,
    reporter: RefCell<Option<Reporter>>,
    /// Number of evaluations on the stack that will catch an unwinding error.
    catch_depth: Cell<usize>,
}

/// Clears the flushing flag however the flush loop exits.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.batcher.borrow_mut().end_flush());
    }
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            batcher: RefCell::new(Batcher::new()),
            registry: RefCell::new(HashMap::new()),
            observers: RefCell::new(Vec::new()),
            config: RefCell::new(RuntimeConfig::default()),
            reporter: RefCell::new(None),
            catch_depth: Cell::new(0),
        }
    }

    fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    // ------------------------------------------------------------------
    // Configuration and test support
    // ------------------------------------------------------------------

    /// Replace this thread's runtime configuration.
    pub fn configure(config: RuntimeConfig) {
        Self::with(|rt| *rt.config.borrow_mut() = config);
    }

    /// This thread's runtime configuration.
    pub fn config() -> RuntimeConfig {
        Self::with(|rt| rt.config.borrow().clone())
    }

    /// Route errors from scheduler-driven work (effects, listeners, flush
    /// divergence from infallible writes) to `reporter` instead of the log.
    pub fn set_error_reporter(reporter: impl Fn(&Error) + 'static) {
        Self::with(|rt| *rt.reporter.borrow_mut() = Some(Rc::new(reporter)));
    }

    /// Clear pending work, zero the batch depth and restore the default
    /// configuration and error reporter.
    ///
    /// Nodes are left in place. Meant for isolating test cases.
    pub fn reset() {
        Self::with(|rt| {
            rt.batcher.borrow_mut().reset();
            *rt.config.borrow_mut() = RuntimeConfig::default();
            *rt.reporter.borrow_mut() = None;
        });
    }

    pub fn add_observer(observer: Rc<dyn Observer>) -> ObserverId {
        let id = ObserverId::new();
        Self::with(|rt| rt.observers.borrow_mut().push((id, observer)));
        id
    }

    /// Returns `false` if no observer with that id was registered.
    pub fn remove_observer(id: ObserverId) -> bool {
        Self::with(|rt| {
            let mut observers = rt.observers.borrow_mut();
            let before = observers.len();
            observers.retain(|(observer_id, _)| *observer_id != id);
            observers.len() != before
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of live nodes on this thread.
    pub fn node_count() -> usize {
        Self::with(|rt| rt.graph.borrow().len())
    }

    pub fn node_info(node: NodeId) -> Option<NodeInfo> {
        Self::with(|rt| rt.graph.borrow().get(node).map(info))
    }

    /// Snapshot of every live node.
    pub fn nodes() -> Vec<NodeInfo> {
        Self::with(|rt| rt.graph.borrow().nodes().map(info).collect())
    }

    pub fn node_state(node: NodeId) -> Option<NodeState> {
        Self::with(|rt| rt.graph.borrow().get(node).map(Node::state))
    }

    /// Dependencies of `node` from its last successful evaluation.
    pub fn dependencies(node: NodeId) -> Vec<NodeId> {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .get(node)
                .map(|n| n.dependencies().keys().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Nodes that currently read `node`.
    pub fn subscribers(node: NodeId) -> Vec<NodeId> {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .get(node)
                .map(|n| n.subscribers().iter().copied().collect())
                .unwrap_or_default()
        })
    }

    pub fn batch_phase() -> BatchPhase {
        Self::with(|rt| rt.batcher.borrow().phase())
    }

    pub fn batch_depth() -> usize {
        Self::with(|rt| rt.batcher.borrow().depth())
    }

    /// Whether writes are queued waiting for a flush.
    pub fn has_pending() -> bool {
        Self::with(|rt| rt.batcher.borrow().has_pending())
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    /// Add a node of `kind` to the graph.
    pub(crate) fn create_node(kind: NodeKind) -> NodeId {
        let node = Node::new(kind);
        let id = node.id();
        let created = info(&node);
        Self::with(|rt| rt.graph.borrow_mut().insert(node));

        tracing::trace!(node = %id, ?kind, "node created");
        Self::notify(|observer| observer.node_created(created));
        id
    }

    /// Register the evaluator for a computed or effect node.
    pub(crate) fn attach(node: NodeId, reactive: Rc<dyn Reactive>) {
        let entry = if reactive.is_eager() {
            Entry::Eager(reactive)
        } else {
            Entry::Lazy(Rc::downgrade(&reactive))
        };
        Self::with(|rt| rt.registry.borrow_mut().insert(node, entry));
    }

    /// Remove a node and all of its edges. Idempotent.
    ///
    /// Safe to call from `Drop`, including during thread teardown.
    pub(crate) fn dispose(node: NodeId) {
        let detached = RUNTIME.try_with(|rt| {
            let removed = rt.graph.borrow_mut().remove(node);
            rt.batcher.borrow_mut().forget(node);
            let entry = rt.registry.borrow_mut().remove(&node);
            (removed, entry)
        });

        let Ok((removed, entry)) = detached else {
            return;
        };
        if let Some((node_data, changes)) = removed {
            tracing::trace!(node = %node, kind = ?node_data.kind(), "node disposed");
            Self::notify_edges(&changes);
            let disposed = info(&node_data);
            Self::notify(|observer| observer.node_disposed(disposed));
        }

        // The evaluator may own handles whose own `Drop` re-enters the
        // runtime, so it goes last, with nothing borrowed.
        drop(entry);
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    pub(crate) fn version(node: NodeId) -> Result<u64> {
        Self::with(|rt| rt.graph.borrow().get(node).map(Node::version))
            .ok_or(Error::UseAfterDestroy { node })
    }

    pub(crate) fn subscriber_count(node: NodeId) -> usize {
        Self::with(|rt| {
            rt.graph
                .borrow()
                .get(node)
                .map_or(0, |n| n.subscribers().len())
        })
    }

    /// Attribute a read of `node` to the computation being evaluated, if any.
    pub(crate) fn track_read(node: NodeId) -> Result<()> {
        if ReactiveContext::current_observer().is_none() {
            return Ok(());
        }
        let version = Self::version(node)?;
        ReactiveContext::track_dependency(node, version);
        Ok(())
    }

    /// Record that a signal's value changed: bump its version and mark
    /// everything downstream stale. Does not flush.
    pub(crate) fn commit_write(node: NodeId) -> Result<u64> {
        Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            let version = graph
                .get_mut(node)
                .ok_or(Error::UseAfterDestroy { node })?
                .bump_version();
            let marked = graph.mark_changed(node);
            rt.batcher.borrow_mut().enqueue(marked);
            Ok(version)
        })
    }

    // ------------------------------------------------------------------
    // Batching and flushing
    // ------------------------------------------------------------------

    pub(crate) fn start_batch() {
        Self::with(|rt| rt.batcher.borrow_mut().start());
    }

    pub(crate) fn end_batch() -> Result<()> {
        match Self::with(|rt| rt.batcher.borrow_mut().end()) {
            None => {
                tracing::warn!("end_batch called without a matching start_batch");
                Ok(())
            }
            Some(true) => Self::flush(),
            Some(false) => Ok(()),
        }
    }

    /// Flush now unless a batch is open or a flush is already running.
    pub(crate) fn flush_if_idle() -> Result<()> {
        if Self::with(|rt| rt.batcher.borrow().is_idle()) {
            Self::flush()
        } else {
            Ok(())
        }
    }

    /// Drain the pending queues until nothing is left.
    ///
    /// A no-op if called while a flush is already running: the running
    /// flush picks up whatever was queued.
    pub(crate) fn flush() -> Result<()> {
        if !Self::with(|rt| rt.batcher.borrow_mut().begin_flush()) {
            return Ok(());
        }
        let _flushing = FlushGuard;
        let max_passes = Self::with(|rt| rt.config.borrow().max_flush_passes);
        let mut passes = 0;

        loop {
            let pass = Self::with(|rt| {
                let graph = rt.graph.borrow();
                rt.batcher.borrow_mut().take_pass(&graph)
            });
            if pass.is_empty() {
                break;
            }

            passes += 1;
            if passes > max_passes {
                Self::with(|rt| rt.batcher.borrow_mut().clear_pending());
                tracing::error!(passes = max_passes, "flush did not settle, dropping pending work");
                return Err(Error::FlushDivergence { passes: max_passes });
            }
            tracing::debug!(
                pass = passes,
                computeds = pass.computeds.len(),
                effects = pass.effects.len(),
                "flush pass"
            );

            // Phase (a): settle observed computeds, lowest level first.
            let observed: SmallVec<[NodeId; 16]> = Self::with(|rt| {
                let graph = rt.graph.borrow();
                let mut cache = HashMap::new();
                pass.computeds
                    .iter()
                    .copied()
                    .filter(|&id| {
                        graph.get(id).is_some_and(|n| n.state().is_stale())
                            && graph.is_observed(id, &mut cache)
                    })
                    .collect()
            });
            for id in observed {
                if let Err(err) = Self::update(id) {
                    // The node stays dirty; its readers re-raise the error.
                    tracing::debug!(node = %id, error = %err, "computed failed during flush");
                }
            }

            // Phase (b): run effects.
            for id in pass.effects {
                let stale = Self::with(|rt| {
                    rt.graph
                        .borrow()
                        .get(id)
                        .is_some_and(|n| n.state().is_stale())
                });
                if !stale {
                    continue;
                }
                if let Err(err) = Self::update(id) {
                    Self::report(&err);
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Settling nodes
    // ------------------------------------------------------------------

    /// Bring a computed or effect up to date.
    ///
    /// Clean nodes return immediately. Maybe-dirty nodes check their
    /// dependencies first and only re-run if one of them actually changed.
    /// On failure the node stays dirty and keeps its previous value and
    /// dependencies, so the next read retries.
    pub(crate) fn update(node: NodeId) -> Result<()> {
        let previous = Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            let n = graph.get_mut(node).ok_or(Error::UseAfterDestroy { node })?;
            match n.state() {
                NodeState::Clean => Ok(None),
                NodeState::Evaluating => Err(Error::CycleDetected { node }),
                NodeState::Disposed => Err(Error::UseAfterDestroy { node }),
                state => {
                    n.begin_evaluation();
                    Ok(Some(state))
                }
            }
        })?;
        let Some(previous) = previous else {
            return Ok(());
        };

        let outcome = if previous == NodeState::MaybeDirty {
            match Self::dependencies_changed(node) {
                Ok(true) => Self::run(node),
                Ok(false) => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            Self::run(node)
        };

        Self::with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            if let Some(n) = graph.get_mut(node) {
                let result_state = if outcome.is_ok() {
                    NodeState::Clean
                } else {
                    NodeState::Dirty
                };
                n.finish_evaluation(result_state);

                // Marked again while it ran (it wrote to its own input):
                // an effect goes back in the queue for the next pass.
                if outcome.is_ok() && n.kind() == NodeKind::Effect && n.state().is_stale() {
                    rt.batcher.borrow_mut().enqueue_effect(node);
                }
            }
        });

        outcome
    }

    /// Settle each dependency in read order and report whether any of them
    /// moved past the version this node last saw.
    ///
    /// Stops at the first changed dependency, so dependencies that belong to
    /// a branch the node no longer takes are never evaluated.
    fn dependencies_changed(node: NodeId) -> Result<bool> {
        let dependencies: SmallVec<[(NodeId, u64, NodeKind); 8]> = Self::with(|rt| {
            let graph = rt.graph.borrow();
            graph
                .get(node)
                .map(|n| {
                    n.dependencies()
                        .iter()
                        .filter_map(|(&id, &seen)| graph.get(id).map(|d| (id, seen, d.kind())))
                        .collect()
                })
                .unwrap_or_default()
        });

        for (dependency, seen, kind) in dependencies {
            if kind == NodeKind::Computed {
                Self::update(dependency)?;
            }
            let current = Self::with(|rt| rt.graph.borrow().get(dependency).map(Node::version));
            if current != Some(seen) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Evaluate a node inside a fresh tracking frame and install the
    /// dependencies it read.
    fn run(node: NodeId) -> Result<()> {
        let reactive = Self::with(|rt| rt.registry.borrow().get(&node).and_then(Entry::upgrade))
            .ok_or(Error::UseAfterDestroy { node })?;

        let ctx = ReactiveContext::enter(node);
        let result = Self::guarded(node, reactive.phase(), || reactive.evaluate());
        let dependencies = ctx.finish();

        let result = result.map(|changed| {
            let changes = Self::with(|rt| {
                let mut graph = rt.graph.borrow_mut();
                let changes = graph.replace_dependencies(node, dependencies);
                if changed {
                    if let Some(n) = graph.get_mut(node) {
                        n.bump_version();
                    }
                }
                changes
            });
            Self::notify_edges(&changes);
        });

        // Last strong reference to a computed whose handles were dropped
        // mid-evaluation; its `Drop` needs the runtime unborrowed.
        drop(reactive);
        result
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    /// Run user code, turning panics into errors.
    ///
    /// A panic whose payload is an [`Error`] (see [`raise`]) comes back as
    /// that error, so a failure deep inside nested evaluations surfaces
    /// unchanged at the outermost `try_` call.
    pub(crate) fn guarded<R>(node: NodeId, phase: Phase, f: impl FnOnce() -> Result<R>) -> Result<R> {
        Self::with(|rt| rt.catch_depth.set(rt.catch_depth.get() + 1));
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        Self::with(|rt| rt.catch_depth.set(rt.catch_depth.get().saturating_sub(1)));

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(Error::from_panic(node, phase, payload)),
        }
    }

    /// Hand a scheduler-side error to the configured reporter.
    pub(crate) fn report(err: &Error) {
        let reporter = RUNTIME
            .try_with(|rt| rt.reporter.borrow().clone())
            .ok()
            .flatten();
        match reporter {
            Some(reporter) => reporter(err),
            None => tracing::error!(error = %err, node = ?err.node(), "reactive update failed"),
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub(crate) fn notify(f: impl Fn(&dyn Observer)) {
        let observers: SmallVec<[Rc<dyn Observer>; 2]> = match RUNTIME.try_with(|rt| {
            rt.observers
                .borrow()
                .iter()
                .map(|(_, observer)| Rc::clone(observer))
                .collect()
        }) {
            Ok(observers) => observers,
            Err(_) => return,
        };
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    fn notify_edges(changes: &EdgeChanges) {
        if changes.is_empty() {
            return;
        }
        Self::notify(|observer| {
            for change in changes {
                observer.edge_changed(*change);
            }
        });
    }
}

fn info(node: &Node) -> NodeInfo {
    NodeInfo {
        id: node.id(),
        kind: node.kind(),
        level: node.level(),
    }
}

/// Fail loudly with `err`.
///
/// Inside an evaluation the error unwinds to the evaluation's boundary and
/// is returned from there as a typed error. Outside one it is an ordinary
/// panic carrying the error's message.
pub(crate) fn raise(err: Error) -> ! {
    let catching = RUNTIME
        .try_with(|rt| rt.catch_depth.get() > 0)
        .unwrap_or(false);
    if catching {
        panic::resume_unwind(Box::new(err));
    }
    panic!("{err}");
}
