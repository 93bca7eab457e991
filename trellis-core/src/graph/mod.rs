//! Dependency Graph
//!
//! This module implements the substrate every reactive primitive sits on:
//! node identity and versioning, producer/consumer edges, the active-consumer
//! slot, and the dirty/check/clean propagation algorithm.
//!
//! # Overview
//!
//! The graph is a DAG where:
//!
//! - Nodes are sources (signals), computeds (memos) or reactions (effects)
//! - A consumer records an ordered edge to every producer it read during its
//!   latest evaluation
//! - A producer records only its *live* consumers, the ones that want eager
//!   notification
//!
//! Writing a source pushes `Dirty`/`Check` marks down the live part of the
//! graph. Reading a memo pulls: it polls its producers in recorded order and
//! recomputes only if one of them produced a different value.
//!
//! # Design Decisions
//!
//! 1. All nodes live in one arena owned by the [`Graph`], keyed by [`NodeId`].
//!    Edges are id pairs, so there are no reference cycles between nodes and
//!    removing a node is a table removal.
//!
//! 2. The active consumer and the epoch are fields of the graph, not ambient
//!    thread-local state. Every operation takes `&Graph`.
//!
//! 3. The graph is `!Send` and `!Sync`. It assumes a single evaluator; hosts
//!    sharing it across threads must serialize access themselves.
//!
//! 4. No internal borrow is held while user code runs, so bodies may freely
//!    read other nodes.

mod context;
mod edge;
mod node;
mod propagate;
mod snapshot;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

pub use node::{DirtyState, Epoch, NodeId, NodeKind, Version};
pub use snapshot::{GraphSnapshot, NodeSnapshot};

pub(crate) use node::{Derivation, LivenessHook, NodeBody, NodeRecord, Reaction};

use crate::config::GraphConfig;
use crate::error::GraphError;

/// Mutable graph state, only touched in short borrows that never span user code.
pub(crate) struct GraphCore {
    /// All nodes in the graph, indexed by ID.
    pub nodes: HashMap<NodeId, NodeRecord>,

    /// Advanced on every source write.
    pub epoch: Epoch,

    pub active_consumer: Option<NodeId>,

    /// Set while change notifications are propagating; reads are rejected.
    pub in_notification: bool,

    /// Liveness hooks queued by edge bookkeeping, fired once the borrow ends.
    pub pending_hooks: Vec<LivenessHook>,
}

/// A reactive dependency graph.
///
/// # Example
///
/// ```rust
/// use trellis_core::graph::Graph;
/// use trellis_core::reactive::{Memo, Signal};
///
/// let graph = Graph::new();
/// let count = Signal::new(&graph, 2);
/// let doubled = Memo::new(&graph, move |g| count.get(g).map(|n| n * 2));
///
/// assert_eq!(doubled.get(&graph), Ok(4));
/// count.set(&graph, 5).unwrap();
/// assert_eq!(doubled.get(&graph), Ok(10));
/// ```
pub struct Graph {
    core: RefCell<GraphCore>,
    config: GraphConfig,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            core: RefCell::new(GraphCore {
                nodes: HashMap::new(),
                epoch: 1,
                active_consumer: None,
                in_notification: false,
                pending_hooks: Vec::new(),
            }),
            config,
        }
    }

    /// Configuration the graph was created with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Current write epoch.
    pub fn epoch(&self) -> Epoch {
        self.core().epoch
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.core().nodes.len()
    }

    /// Whether `id` names a node of this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        self.core().nodes.contains_key(&id)
    }

    /// Version of a node's produced value, if the node exists.
    pub fn version_of(&self, id: NodeId) -> Option<Version> {
        self.core().nodes.get(&id).map(|record| record.version)
    }

    /// Dirty state of a node, if the node exists.
    pub fn state_of(&self, id: NodeId) -> Option<DirtyState> {
        self.core().nodes.get(&id).map(|record| record.state)
    }

    /// Kind of a node, if the node exists.
    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.core().nodes.get(&id).map(NodeRecord::kind)
    }

    /// Whether the node currently receives eager notifications.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.core()
            .nodes
            .get(&id)
            .is_some_and(NodeRecord::is_live)
    }

    /// Number of distinct live consumers of a node.
    pub fn live_consumer_count(&self, id: NodeId) -> usize {
        self.core()
            .nodes
            .get(&id)
            .map_or(0, |record| record.live_consumers.len())
    }

    pub(crate) fn core(&self) -> Ref<'_, GraphCore> {
        self.core.borrow()
    }

    pub(crate) fn core_mut(&self) -> RefMut<'_, GraphCore> {
        self.core.borrow_mut()
    }

    /// Add a node to the arena under a fresh id.
    pub(crate) fn insert_node(&self, record: NodeRecord) -> NodeId {
        let id = NodeId::next();
        tracing::trace!(node = %id, kind = ?record.kind(), "node created");
        self.core_mut().nodes.insert(id, record);
        id
    }

    pub(crate) fn source_cell(&self, id: NodeId) -> Result<Rc<dyn std::any::Any>, GraphError> {
        match self.core().nodes.get(&id).map(|record| &record.body) {
            Some(NodeBody::Source(cell)) => Ok(Rc::clone(cell)),
            _ => Err(GraphError::UnknownNode(id)),
        }
    }

    pub(crate) fn derivation(&self, id: NodeId) -> Result<Rc<dyn Derivation>, GraphError> {
        match self.core().nodes.get(&id).map(|record| &record.body) {
            Some(NodeBody::Computed(cell)) => Ok(Rc::clone(cell)),
            _ => Err(GraphError::UnknownNode(id)),
        }
    }

    /// Fail if the graph is propagating notifications.
    pub(crate) fn ensure_readable(&self) -> Result<(), GraphError> {
        if self.core().in_notification {
            return Err(GraphError::InvalidReadDuringNotification);
        }
        Ok(())
    }

    /// Fail if the active consumer forbids writing `target`.
    pub(crate) fn ensure_writable(&self, target: NodeId) -> Result<(), GraphError> {
        let core = self.core();
        if !core.nodes.contains_key(&target) {
            return Err(GraphError::UnknownNode(target));
        }
        let forbidden = core
            .active_consumer
            .and_then(|consumer| core.nodes.get(&consumer))
            .is_some_and(|record| !record.allow_signal_writes);
        if forbidden {
            return Err(GraphError::InvalidWriteToSignal(target));
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core();
        f.debug_struct("Graph")
            .field("node_count", &core.nodes.len())
            .field("epoch", &core.epoch)
            .field("active_consumer", &core.active_consumer)
            .finish()
    }
}
