//! Graph Nodes
//!
//! This module defines the node records that live in the graph's arena.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use smallvec::SmallVec;

use super::edge::{LiveConsumers, ProducerEdge};
use super::Graph;
use crate::error::GraphError;

/// Monotonic counter bumped whenever a node's produced value semantically changes.
pub type Version = u64;

/// Process-wide write counter, advanced on every source write.
pub type Epoch = u64;

/// Unique identifier for a node in the dependency graph.
///
/// Ids come from a process-wide counter and are never reused, so a handle
/// created by one graph never aliases a node of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh node id.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    /// A settable value (signal). Producer only.
    Source,

    /// A memoized derivation (memo). Both producer and consumer.
    Computed,

    /// A side-effecting consumer (effect). Always live, never a producer.
    Reaction,
}

/// How stale a consumer is.
///
/// The ordering is meaningful: escalation only ever moves a node towards
/// `Dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// Some transitive producer changed; the direct producers must be polled
    /// before deciding whether to recompute.
    Check,

    /// A direct producer changed. The node must recompute.
    Dirty,
}

/// Callback fired when a node gains its first or loses its last live consumer.
pub(crate) type LivenessHook = Rc<dyn Fn()>;

/// Type-erased behavior of a memo, as seen by the propagation algorithm.
pub(crate) trait Derivation {
    /// Access to the concrete cell for typed reads.
    fn as_any(&self) -> &dyn Any;

    /// Whether no usable outcome is cached (never computed, or mid-computation).
    fn must_recompute(&self) -> bool;

    /// Whether the body is currently executing.
    fn is_computing(&self) -> bool;

    /// Run the body and store its outcome. Returns whether the outcome
    /// changed under the memo's equality predicate.
    fn recompute(&self, graph: &Graph) -> bool;
}

/// Type-erased behavior of an effect, as seen by the propagation algorithm.
pub(crate) trait Reaction {
    /// Hand the effect to its external scheduler.
    fn schedule(&self, id: NodeId);

    /// Whether the body is currently executing.
    fn is_running(&self) -> bool;

    /// Run the body, capturing the cleanups it registers.
    fn execute(&self, graph: &Graph) -> Result<(), GraphError>;

    /// Run and forget the cleanups registered by the previous execution.
    fn run_cleanups(&self);
}

/// Effect payload plus its scheduling bookkeeping.
pub(crate) struct ReactionSlot {
    pub cell: Rc<dyn Reaction>,
    /// Handed to the scheduler and not yet run.
    pub pending: bool,
    /// Completed executions of the body.
    pub runs: u64,
}

/// Kind-specific payload of a node.
pub(crate) enum NodeBody {
    Source(Rc<dyn Any>),
    Computed(Rc<dyn Derivation>),
    Reaction(ReactionSlot),
}

/// A node in the dependency graph.
pub(crate) struct NodeRecord {
    pub label: Option<String>,

    /// Version of the value this node produces.
    pub version: Version,

    pub state: DirtyState,

    /// Epoch at which this node was last verified clean.
    pub last_clean_epoch: Option<Epoch>,

    /// Producers read during the latest evaluation, in read order.
    pub producers: SmallVec<[ProducerEdge; 4]>,

    /// Slot in `producers` the next read of the running evaluation will use.
    pub next_producer_index: usize,

    /// Consumers that want eager notification from this node.
    pub live_consumers: LiveConsumers,

    /// Whether signal writes are permitted while this node is the active consumer.
    pub allow_signal_writes: bool,

    pub on_watched: Option<LivenessHook>,
    pub on_unwatched: Option<LivenessHook>,

    pub body: NodeBody,
}

impl NodeRecord {
    fn new(body: NodeBody, state: DirtyState, allow_signal_writes: bool) -> Self {
        Self {
            label: None,
            version: 0,
            state,
            last_clean_epoch: None,
            producers: SmallVec::new(),
            next_producer_index: 0,
            live_consumers: LiveConsumers::default(),
            allow_signal_writes,
            on_watched: None,
            on_unwatched: None,
            body,
        }
    }

    /// Create a source record. Sources are always clean.
    pub fn source(cell: Rc<dyn Any>) -> Self {
        Self::new(NodeBody::Source(cell), DirtyState::Clean, true)
    }

    /// Create a memo record. Memos start dirty and compute on first read.
    pub fn computed(cell: Rc<dyn Derivation>) -> Self {
        Self::new(NodeBody::Computed(cell), DirtyState::Dirty, false)
    }

    /// Create an effect record. Effects start dirty so they run at least once.
    pub fn reaction(cell: Rc<dyn Reaction>, allow_signal_writes: bool) -> Self {
        let slot = ReactionSlot {
            cell,
            pending: false,
            runs: 0,
        };
        Self::new(NodeBody::Reaction(slot), DirtyState::Dirty, allow_signal_writes)
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn with_hooks(
        mut self,
        on_watched: Option<LivenessHook>,
        on_unwatched: Option<LivenessHook>,
    ) -> Self {
        self.on_watched = on_watched;
        self.on_unwatched = on_unwatched;
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Source(_) => NodeKind::Source,
            NodeBody::Computed(_) => NodeKind::Computed,
            NodeBody::Reaction(_) => NodeKind::Reaction,
        }
    }

    pub fn is_always_live(&self) -> bool {
        matches!(self.body, NodeBody::Reaction(_))
    }

    /// Live nodes are kept current by eager notification.
    pub fn is_live(&self) -> bool {
        self.is_always_live() || !self.live_consumers.is_empty()
    }

    /// Raise the dirty state to at least `target`. Returns false when the
    /// node was already at or above it.
    pub fn escalate(&mut self, target: DirtyState) -> bool {
        if self.state >= target {
            return false;
        }
        self.state = target;
        true
    }

    pub fn mark_clean(&mut self, epoch: Epoch) {
        self.state = DirtyState::Clean;
        self.last_clean_epoch = Some(epoch);
    }

    pub fn producer_ids(&self) -> SmallVec<[NodeId; 4]> {
        self.producers.iter().map(|edge| edge.producer).collect()
    }
}
