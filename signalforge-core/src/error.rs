//! Error types for signalforge-core.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::graph::NodeId;

/// Result type for signalforge-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error accepted from user-supplied functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What the runtime was doing when user code failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Evaluating a computed.
    Compute,
    /// Running an effect.
    Effect,
    /// Running an effect's cleanup.
    Cleanup,
    /// Invoking a subscription listener.
    Listener,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Compute => "compute",
            Phase::Effect => "effect",
            Phase::Cleanup => "cleanup",
            Phase::Listener => "listener",
        })
    }
}

/// Errors that can occur in signalforge-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A computed or effect was re-entered before its evaluation finished.
    #[error("cycle detected: node {node} was read while it was being evaluated")]
    CycleDetected { node: NodeId },

    /// A write was attempted on a derived value.
    #[error("node {node} is read-only")]
    ReadOnlyViolation { node: NodeId },

    /// An operation was attempted on a destroyed signal or disposed node.
    #[error("node {node} was used after it was destroyed")]
    UseAfterDestroy { node: NodeId },

    /// The flush loop kept finding new work. Usually an effect that writes
    /// to one of its own dependencies unconditionally.
    #[error("flush did not settle after {passes} passes")]
    FlushDivergence { passes: usize },

    /// A user-supplied function returned an error.
    #[error("{phase} of node {node} failed: {source}")]
    Evaluator {
        node: NodeId,
        phase: Phase,
        #[source]
        source: BoxError,
    },

    /// A user-supplied function panicked.
    #[error("{phase} of node {node} panicked: {message}")]
    Panicked {
        node: NodeId,
        phase: Phase,
        message: String,
    },

    /// A keyed store lookup missed.
    #[error("signal not found: {0}")]
    SignalNotFound(String),
}

impl Error {
    /// Errors that indicate a bug in the calling code rather than a runtime
    /// condition. These are never swallowed.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::CycleDetected { .. }
                | Error::ReadOnlyViolation { .. }
                | Error::UseAfterDestroy { .. }
        )
    }

    /// The node the error is about, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Error::CycleDetected { node }
            | Error::ReadOnlyViolation { node }
            | Error::UseAfterDestroy { node }
            | Error::Evaluator { node, .. }
            | Error::Panicked { node, .. } => Some(*node),
            Error::FlushDivergence { .. } | Error::SignalNotFound(_) => None,
        }
    }

    /// Wrap an error returned by user code.
    ///
    /// Core errors that bubbled up through the user function (for example a
    /// cycle detected further down) are passed through unchanged.
    pub(crate) fn from_evaluator(node: NodeId, phase: Phase, source: BoxError) -> Self {
        match source.downcast::<Error>() {
            Ok(core) => *core,
            Err(source) => Error::Evaluator {
                node,
                phase,
                source,
            },
        }
    }

    /// Convert a caught panic payload.
    pub(crate) fn from_panic(node: NodeId, phase: Phase, payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Error>() {
            Ok(core) => return *core,
            Err(payload) => payload,
        };
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::Panicked {
            node,
            phase,
            message,
        }
    }
}
