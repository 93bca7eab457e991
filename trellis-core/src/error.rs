//! Graph Errors
//!
//! Every fallible graph operation returns [`GraphError`]. Structural misuse
//! (reading during notification, cycles, forbidden writes) is reported to the
//! immediate caller. Failures raised by a memo body are cached as the memo's
//! outcome and replayed to every reader until an upstream change forces a
//! recomputation.

use std::fmt::Display;

use crate::graph::NodeId;

/// Errors produced by the reactive graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A producer was read while change notifications were being propagated,
    /// for example from inside an effect's schedule hook.
    #[error("signal read during notification phase")]
    InvalidReadDuringNotification,

    /// A memo's computation (directly or transitively) read itself.
    #[error("detected cycle in computations at node {0}")]
    CycleDetected(NodeId),

    /// A signal was written from a context that forbids writes, such as the
    /// body of a memo.
    #[error("write to signal {0} is not allowed in the current reactive context")]
    InvalidWriteToSignal(NodeId),

    /// A memo or effect body failed.
    #[error("computation failed: {0}")]
    Computation(String),

    /// The handle refers to a node that was disposed or belongs to another graph.
    #[error("node {0} is not part of this graph")]
    UnknownNode(NodeId),

    /// `Runtime::stabilize` gave up after this many flush rounds.
    #[error("effects did not settle after {0} flush rounds")]
    StabilizeLimit(usize),
}

impl GraphError {
    /// Wrap a user-level failure raised inside a memo or effect body.
    pub fn computation(reason: impl Display) -> Self {
        Self::Computation(reason.to_string())
    }

    /// Whether this error describes misuse of the graph rather than a failing body.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Computation(_))
    }
}
