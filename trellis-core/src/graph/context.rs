//! Active Context
//!
//! The graph tracks exactly one "active consumer": the memo or effect whose
//! body is currently executing. Reads of producers are attributed to it.
//!
//! # Implementation
//!
//! The slot lives in the [`Graph`] itself rather than in thread-local storage.
//! Entering a scope swaps the slot and remembers the previous occupant; the
//! guard's `Drop` puts it back, so the slot is restored on every exit path,
//! including a panic unwinding out of a body.

use super::node::NodeId;
use super::Graph;

/// Guard that makes a consumer the active one until dropped.
pub(crate) struct ConsumerScope<'g> {
    graph: &'g Graph,
    consumer: Option<NodeId>,
    previous: Option<NodeId>,
}

impl<'g> ConsumerScope<'g> {
    /// Make `consumer` the active consumer, or clear the slot with `None`.
    ///
    /// Entering a consumer rewinds its read cursor so the evaluation
    /// re-records its dependencies from the first slot.
    pub fn enter(graph: &'g Graph, consumer: Option<NodeId>) -> Self {
        let mut core = graph.core_mut();
        if let Some(id) = consumer {
            if let Some(record) = core.nodes.get_mut(&id) {
                record.next_producer_index = 0;
            }
        }
        let previous = std::mem::replace(&mut core.active_consumer, consumer);

        Self {
            graph,
            consumer,
            previous,
        }
    }
}

impl Drop for ConsumerScope<'_> {
    fn drop(&mut self) {
        if let Ok(mut core) = self.graph.core.try_borrow_mut() {
            let popped = std::mem::replace(&mut core.active_consumer, self.previous);

            // Scopes must nest.
            debug_assert_eq!(
                popped, self.consumer,
                "ConsumerScope mismatch: expected {:?}, got {:?}",
                self.consumer, popped
            );
        }
    }
}

/// Guard that marks the graph as propagating change notifications.
pub(crate) struct NotificationScope<'g> {
    graph: &'g Graph,
    previous: bool,
}

impl<'g> NotificationScope<'g> {
    pub fn enter(graph: &'g Graph) -> Self {
        let previous = std::mem::replace(&mut graph.core_mut().in_notification, true);
        Self { graph, previous }
    }
}

impl Drop for NotificationScope<'_> {
    fn drop(&mut self) {
        if let Ok(mut core) = self.graph.core.try_borrow_mut() {
            core.in_notification = self.previous;
        }
    }
}

impl Graph {
    /// Run `f` with no active consumer.
    ///
    /// Reads performed inside establish no dependency edges. The previous
    /// active consumer is restored afterwards, even if `f` panics.
    pub fn untracked<T>(&self, f: impl FnOnce(&Graph) -> T) -> T {
        let _scope = ConsumerScope::enter(self, None);
        f(self)
    }

    /// The consumer whose evaluation is currently running, if any.
    pub fn active_consumer(&self) -> Option<NodeId> {
        self.core().active_consumer
    }

    /// Whether reads are currently being recorded as dependencies.
    pub fn is_tracking(&self) -> bool {
        self.active_consumer().is_some()
    }

    /// Whether change notifications are currently being propagated.
    pub fn is_notifying(&self) -> bool {
        self.core().in_notification
    }
}
