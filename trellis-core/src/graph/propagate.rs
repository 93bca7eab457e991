//! Change Propagation
//!
//! The algorithm is push-pull:
//!
//! 1. Writing a source bumps its version and the global epoch, then pushes
//!    marks through live consumers. Direct consumers become `Dirty`; anything
//!    further downstream only becomes `Check`, because an intermediate memo
//!    may recompute to an equal value. Marks only ever rise, and the walk
//!    stops at nodes already marked at least as severely, so diamonds are
//!    visited once.
//!
//! 2. Reading a memo resolves it first:
//!    a. live and clean: trust the cached value
//!    b. not dirty and validated in the current epoch: trust it
//!    c. otherwise poll producers in recorded order; stop at the first one
//!       whose version moved and recompute, or mark clean if none did
//!
//! 3. Recomputing re-records edges slot by slot, prunes slots past the final
//!    read, and bumps the version only if the new outcome differs.

use std::rc::Rc;

use smallvec::SmallVec;

use super::context::{ConsumerScope, NotificationScope};
use super::edge::ProducerEdge;
use super::node::{Derivation, DirtyState, NodeBody, NodeId, NodeKind, NodeRecord};
use super::{Graph, GraphCore};
use crate::error::GraphError;

impl GraphCore {
    /// Register `consumer` as a live consumer of `producer`.
    ///
    /// On the producer's 0 -> 1 transition it becomes live itself and
    /// registers with its own producers, transitively.
    pub(crate) fn add_live_consumer(&mut self, producer: NodeId, consumer: NodeId) {
        let Some(record) = self.nodes.get_mut(&producer) else {
            return;
        };
        if !record.live_consumers.insert(consumer) || record.is_always_live() {
            return;
        }

        tracing::debug!(node = %producer, "node became live");
        if let Some(hook) = &record.on_watched {
            self.pending_hooks.push(hook.clone());
        }
        for upstream in record.producer_ids() {
            self.add_live_consumer(upstream, producer);
        }
    }

    /// Drop one live edge from `consumer` to `producer`.
    ///
    /// On the producer's 1 -> 0 transition it stops being live and
    /// deregisters from its own producers, transitively.
    pub(crate) fn remove_live_consumer(&mut self, producer: NodeId, consumer: NodeId) {
        let Some(record) = self.nodes.get_mut(&producer) else {
            return;
        };
        if !record.live_consumers.remove(consumer) || record.is_always_live() {
            return;
        }

        tracing::debug!(node = %producer, "node is no longer live");
        if let Some(hook) = &record.on_unwatched {
            self.pending_hooks.push(hook.clone());
        }
        for upstream in record.producer_ids() {
            self.remove_live_consumer(upstream, producer);
        }
    }

    /// Escalate live consumers downstream of a changed source.
    ///
    /// Returns the reactions that need to be handed to their scheduler.
    fn mark_consumers(&mut self, source: NodeId) -> Vec<NodeId> {
        let mut reactions = Vec::new();
        let mut stack = vec![(source, DirtyState::Dirty)];

        while let Some((producer, severity)) = stack.pop() {
            let consumers: SmallVec<[NodeId; 8]> = match self.nodes.get(&producer) {
                Some(record) => record.live_consumers.ids().collect(),
                None => continue,
            };

            for consumer in consumers {
                let Some(record) = self.nodes.get_mut(&consumer) else {
                    continue;
                };
                if !record.escalate(severity) {
                    continue;
                }
                match record.kind() {
                    NodeKind::Computed => stack.push((consumer, DirtyState::Check)),
                    NodeKind::Reaction => reactions.push(consumer),
                    NodeKind::Source => {}
                }
            }
        }

        reactions
    }

    fn mark_clean(&mut self, id: NodeId) {
        let epoch = self.epoch;
        if let Some(record) = self.nodes.get_mut(&id) {
            record.mark_clean(epoch);
        }
    }
}

impl Graph {
    /// Record that `producer` was read by the active consumer.
    ///
    /// The read lands in the consumer's next edge slot. If that slot held a
    /// different producer, the old edge is stale and is replaced, moving the
    /// live registration along with it when the consumer is live.
    pub(crate) fn producer_accessed(&self, producer: NodeId) -> Result<(), GraphError> {
        {
            let mut guard = self.core_mut();
            let core = &mut *guard;
            if core.in_notification {
                return Err(GraphError::InvalidReadDuringNotification);
            }
            let version = core
                .nodes
                .get(&producer)
                .map(|record| record.version)
                .ok_or(GraphError::UnknownNode(producer))?;
            let Some(consumer) = core.active_consumer else {
                return Ok(());
            };
            // The consumer may have been destroyed from inside its own body.
            let Some(record) = core.nodes.get_mut(&consumer) else {
                return Ok(());
            };

            let slot = record.next_producer_index;
            record.next_producer_index += 1;
            let live = record.is_live();

            let stale = match record.producers.get_mut(slot) {
                Some(edge) if edge.producer == producer => {
                    edge.last_read_version = version;
                    return Ok(());
                }
                Some(edge) => {
                    let stale = edge.producer;
                    *edge = ProducerEdge::new(producer, version);
                    Some(stale)
                }
                None => {
                    record.producers.push(ProducerEdge::new(producer, version));
                    None
                }
            };

            tracing::trace!(%producer, %consumer, slot, "dependency recorded");
            if live {
                if let Some(stale) = stale {
                    core.remove_live_consumer(stale, consumer);
                }
                core.add_live_consumer(producer, consumer);
            }
        }
        self.fire_liveness_hooks();
        Ok(())
    }

    /// A source's value changed: bump versions and notify live consumers.
    pub(crate) fn source_changed(&self, id: NodeId) {
        let reactions = {
            let mut guard = self.core_mut();
            let core = &mut *guard;
            let Some(record) = core.nodes.get_mut(&id) else {
                return;
            };
            record.version += 1;
            let version = record.version;
            core.epoch += 1;
            tracing::debug!(node = %id, version, epoch = core.epoch, "source changed");
            core.mark_consumers(id)
        };

        self.notify_reactions(reactions);
    }

    /// Hand marked reactions to their schedulers. Reads are rejected meanwhile.
    fn notify_reactions(&self, reactions: Vec<NodeId>) {
        if reactions.is_empty() {
            return;
        }
        let _phase = NotificationScope::enter(self);
        for reaction in reactions {
            self.notify_reaction(reaction);
        }
    }

    /// Hand a reaction to its scheduler unless it is already pending.
    pub(crate) fn notify_reaction(&self, id: NodeId) {
        let cell = {
            let mut core = self.core_mut();
            let Some(NodeBody::Reaction(slot)) = core.nodes.get_mut(&id).map(|r| &mut r.body) else {
                return;
            };
            if slot.pending {
                return;
            }
            slot.pending = true;
            slot.cell.clone()
        };
        tracing::debug!(node = %id, "effect scheduled");
        cell.schedule(id);
    }

    /// Bring a memo's value and version up to date.
    ///
    /// Sources are always current. Fails with `CycleDetected` if the memo is
    /// already mid-computation.
    pub(crate) fn update_if_necessary(&self, id: NodeId) -> Result<(), GraphError> {
        let (cell, live, state, last_clean, epoch) = {
            let core = self.core();
            let record = core.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
            let NodeBody::Computed(cell) = &record.body else {
                return Ok(());
            };
            (
                cell.clone(),
                record.is_live(),
                record.state,
                record.last_clean_epoch,
                core.epoch,
            )
        };

        if cell.is_computing() {
            return Err(GraphError::CycleDetected(id));
        }
        let has_value = !cell.must_recompute();

        // Live nodes are kept current by eager notification.
        if has_value && live && state == DirtyState::Clean {
            return Ok(());
        }
        // Nothing can have changed since the last validation.
        if has_value && state != DirtyState::Dirty && last_clean == Some(epoch) {
            return Ok(());
        }
        if has_value && state != DirtyState::Dirty && !self.poll_producers_for_change(id)? {
            tracing::trace!(node = %id, "producers unchanged, skipping recompute");
            self.core_mut().mark_clean(id);
            return Ok(());
        }

        self.recompute(id, &cell)?;
        self.core_mut().mark_clean(id);
        Ok(())
    }

    /// Whether any producer recorded by `id` now has a different version.
    ///
    /// Producers are polled in read order and polling stops at the first
    /// real change. A producer that no longer exists counts as changed.
    pub(crate) fn poll_producers_for_change(&self, id: NodeId) -> Result<bool, GraphError> {
        let edges: SmallVec<[ProducerEdge; 4]> = match self.core().nodes.get(&id) {
            Some(record) => record.producers.clone(),
            None => return Ok(true),
        };

        for edge in edges {
            match self.version_of(edge.producer) {
                Some(version) if version == edge.last_read_version => {}
                _ => return Ok(true),
            }

            // The version matches but may itself be stale.
            self.update_if_necessary(edge.producer)?;

            if self.version_of(edge.producer) != Some(edge.last_read_version) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn recompute(&self, id: NodeId, cell: &Rc<dyn Derivation>) -> Result<(), GraphError> {
        if cell.is_computing() {
            return Err(GraphError::CycleDetected(id));
        }

        tracing::trace!(node = %id, "recomputing");
        let changed = {
            let _scope = ConsumerScope::enter(self, Some(id));
            cell.recompute(self)
        };
        self.finish_evaluation(id);

        if changed {
            if let Some(record) = self.core_mut().nodes.get_mut(&id) {
                record.version += 1;
            }
        }
        Ok(())
    }

    /// Prune edges past the final read of the evaluation that just ended.
    pub(crate) fn finish_evaluation(&self, id: NodeId) {
        {
            let mut guard = self.core_mut();
            let core = &mut *guard;
            let Some(record) = core.nodes.get_mut(&id) else {
                return;
            };
            let keep = record.next_producer_index;
            if record.producers.len() > keep {
                let live = record.is_live();
                let pruned: SmallVec<[ProducerEdge; 4]> = record.producers.drain(keep..).collect();
                tracing::trace!(node = %id, pruned = pruned.len(), "dropping unused dependencies");
                if live {
                    for edge in pruned {
                        core.remove_live_consumer(edge.producer, id);
                    }
                }
            }
        }
        self.fire_liveness_hooks();
    }

    /// Execute a reaction on behalf of its scheduler.
    ///
    /// Returns `Ok(false)` when polling showed that none of its producers
    /// really changed and the body was skipped.
    pub(crate) fn run_reaction(&self, id: NodeId) -> Result<bool, GraphError> {
        let (cell, first_run) = {
            let mut core = self.core_mut();
            let Some(NodeBody::Reaction(slot)) = core.nodes.get_mut(&id).map(|r| &mut r.body) else {
                return Err(GraphError::UnknownNode(id));
            };
            if slot.cell.is_running() {
                return Err(GraphError::CycleDetected(id));
            }
            slot.pending = false;
            (slot.cell.clone(), slot.runs == 0)
        };

        if !first_run && !self.poll_producers_for_change(id)? {
            tracing::trace!(node = %id, "effect inputs unchanged, skipping run");
            self.core_mut().mark_clean(id);
            return Ok(false);
        }

        // Cleared up front so writes made by the body can mark it again.
        self.core_mut().mark_clean(id);
        self.untracked(|_| cell.run_cleanups());

        tracing::debug!(node = %id, "running effect");
        let result = {
            let _scope = ConsumerScope::enter(self, Some(id));
            cell.execute(self)
        };
        self.finish_evaluation(id);

        let alive = match self.core_mut().nodes.get_mut(&id).map(|r| &mut r.body) {
            Some(NodeBody::Reaction(slot)) => {
                slot.runs += 1;
                true
            }
            _ => false,
        };
        // Destroyed from inside its own body: nobody else will run these.
        if !alive {
            self.untracked(|_| cell.run_cleanups());
        }
        result.map(|()| true)
    }

    /// Drop a scheduled run without executing it.
    ///
    /// The reaction is marked clean so that the next change reschedules it.
    /// A reaction that has never run has no producers to be rescheduled by,
    /// so it is left pending and `false` is returned.
    pub(crate) fn cancel_reaction(&self, id: NodeId) -> bool {
        let mut guard = self.core_mut();
        let core = &mut *guard;
        let epoch = core.epoch;
        let Some(record) = core.nodes.get_mut(&id) else {
            return false;
        };
        let NodeBody::Reaction(slot) = &mut record.body else {
            return false;
        };
        if slot.runs == 0 {
            return false;
        }
        slot.pending = false;
        record.mark_clean(epoch);
        true
    }

    /// Remove a node and detach it from its producers.
    ///
    /// Removal counts as a change: the epoch advances and live consumers are
    /// marked and notified. Consumers that still hold edges to the node see
    /// it as changed on their next poll and fail with `UnknownNode` if they
    /// read it again.
    pub(crate) fn remove_node(&self, id: NodeId) -> Option<NodeRecord> {
        let (record, reactions) = {
            let mut guard = self.core_mut();
            let core = &mut *guard;
            if !core.nodes.contains_key(&id) {
                return None;
            }
            core.epoch += 1;
            let reactions = core.mark_consumers(id);
            let record = core.nodes.remove(&id)?;
            if record.is_live() {
                for producer in record.producer_ids() {
                    core.remove_live_consumer(producer, id);
                }
            }
            (record, reactions)
        };
        tracing::debug!(node = %id, kind = ?record.kind(), "node removed");
        self.fire_liveness_hooks();
        self.notify_reactions(reactions);
        Some(record)
    }

    /// Run watched/unwatched hooks queued by edge bookkeeping.
    pub(crate) fn fire_liveness_hooks(&self) {
        let hooks = std::mem::take(&mut self.core_mut().pending_hooks);
        if hooks.is_empty() {
            return;
        }
        self.untracked(|_| {
            for hook in hooks {
                hook();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeRecord;

    fn source(graph: &Graph) -> NodeId {
        graph.insert_node(NodeRecord::source(Rc::new(())))
    }

    /// Edge bookkeeping does not care about payloads, so any record can
    /// stand in for a consumer.
    fn consumer(graph: &Graph) -> NodeId {
        graph.insert_node(NodeRecord::source(Rc::new(())))
    }

    #[test]
    fn reads_without_consumer_record_nothing() {
        let graph = Graph::new();
        let s = source(&graph);

        graph.producer_accessed(s).unwrap();

        let snapshot = graph.snapshot();
        assert!(snapshot.node(s).unwrap().live_consumers.is_empty());
    }

    #[test]
    fn reads_inside_scope_record_ordered_edges() {
        let graph = Graph::new();
        let a = source(&graph);
        let b = source(&graph);
        let c = consumer(&graph);

        {
            let _scope = ConsumerScope::enter(&graph, Some(c));
            graph.producer_accessed(b).unwrap();
            graph.producer_accessed(a).unwrap();
        }
        graph.finish_evaluation(c);

        assert_eq!(graph.snapshot().node(c).unwrap().producers, vec![b, a]);
    }

    #[test]
    fn stale_edges_are_pruned() {
        let graph = Graph::new();
        let a = source(&graph);
        let b = source(&graph);
        let c = consumer(&graph);

        {
            let _scope = ConsumerScope::enter(&graph, Some(c));
            graph.producer_accessed(a).unwrap();
            graph.producer_accessed(b).unwrap();
        }
        graph.finish_evaluation(c);

        {
            let _scope = ConsumerScope::enter(&graph, Some(c));
            graph.producer_accessed(b).unwrap();
        }
        graph.finish_evaluation(c);

        assert_eq!(graph.snapshot().node(c).unwrap().producers, vec![b]);
    }

    #[test]
    fn reads_during_notification_are_rejected() {
        let graph = Graph::new();
        let s = source(&graph);

        let _phase = NotificationScope::enter(&graph);
        assert_eq!(
            graph.producer_accessed(s),
            Err(GraphError::InvalidReadDuringNotification)
        );
    }

    #[test]
    fn reading_a_removed_node_fails() {
        let graph = Graph::new();
        let s = source(&graph);
        assert!(graph.remove_node(s).is_some());
        assert!(graph.remove_node(s).is_none());
        assert_eq!(graph.producer_accessed(s), Err(GraphError::UnknownNode(s)));
    }

    #[test]
    fn live_registration_is_transitive_and_counted() {
        let graph = Graph::new();
        let s = source(&graph);
        let mid = consumer(&graph);
        let top = consumer(&graph);

        // mid reads s while not live: no push edge yet
        {
            let _scope = ConsumerScope::enter(&graph, Some(mid));
            graph.producer_accessed(s).unwrap();
        }
        assert!(!graph.is_live(s));

        // mid gains a live consumer and registers upstream
        graph.core_mut().add_live_consumer(mid, top);
        assert!(graph.is_live(mid));
        assert!(graph.is_live(s));

        // A second edge from the same consumer only bumps the count
        graph.core_mut().add_live_consumer(mid, top);
        graph.core_mut().remove_live_consumer(mid, top);
        assert!(graph.is_live(s));

        graph.core_mut().remove_live_consumer(mid, top);
        assert!(!graph.is_live(mid));
        assert!(!graph.is_live(s));
    }

    #[test]
    fn source_change_bumps_version_and_epoch() {
        let graph = Graph::new();
        let s = source(&graph);
        let epoch = graph.epoch();

        graph.source_changed(s);

        assert_eq!(graph.version_of(s), Some(1));
        assert_eq!(graph.epoch(), epoch + 1);
    }
}
