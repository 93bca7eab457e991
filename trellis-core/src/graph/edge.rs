//! Dependency Edges
//!
//! Edges are stored on both sides, but not symmetrically:
//!
//! - A consumer keeps an ordered list of [`ProducerEdge`]s mirroring the
//!   order of reads in its latest evaluation, together with the producer
//!   version it observed.
//! - A producer keeps an unordered set of *live* consumers only. Non-live
//!   consumers are never pushed to; they validate lazily on read.
//!
//! The live set counts edges rather than consumers: a consumer that read the
//! same producer twice holds two references, and the producer stays live for
//! it until both are pruned.

use indexmap::IndexMap;

use super::node::{NodeId, Version};

/// Consumer-side record of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ProducerEdge {
    pub producer: NodeId,
    /// Producer version observed when the read happened.
    pub last_read_version: Version,
}

impl ProducerEdge {
    pub fn new(producer: NodeId, last_read_version: Version) -> Self {
        Self {
            producer,
            last_read_version,
        }
    }
}

/// Producer-side set of live consumers, reference counted per edge.
#[derive(Debug, Default)]
pub(crate) struct LiveConsumers {
    counts: IndexMap<NodeId, usize>,
}

impl LiveConsumers {
    /// Add one edge from `consumer`. Returns true on the set's 0 -> 1 transition.
    pub fn insert(&mut self, consumer: NodeId) -> bool {
        let was_empty = self.counts.is_empty();
        *self.counts.entry(consumer).or_insert(0) += 1;
        was_empty
    }

    /// Drop one edge from `consumer`. Returns true on the set's 1 -> 0 transition.
    pub fn remove(&mut self, consumer: NodeId) -> bool {
        match self.counts.get_mut(&consumer) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.shift_remove(&consumer);
                self.counts.is_empty()
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct live consumers.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.counts.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_reported_once() {
        let mut live = LiveConsumers::default();
        let a = NodeId::next();
        let b = NodeId::next();

        assert!(live.insert(a));
        assert!(!live.insert(b));
        assert_eq!(live.len(), 2);

        assert!(!live.remove(a));
        assert!(live.remove(b));
        assert!(live.is_empty());
    }

    #[test]
    fn repeated_edges_are_counted() {
        let mut live = LiveConsumers::default();
        let a = NodeId::next();

        assert!(live.insert(a));
        assert!(!live.insert(a));
        assert_eq!(live.len(), 1);

        // First removal only drops one of the two edges
        assert!(!live.remove(a));
        assert!(!live.is_empty());

        assert!(live.remove(a));
        assert!(live.is_empty());
    }

    #[test]
    fn removing_unknown_consumer_is_a_no_op() {
        let mut live = LiveConsumers::default();
        assert!(!live.remove(NodeId::next()));
        assert!(live.is_empty());
    }

    #[test]
    fn ids_keep_insertion_order() {
        let mut live = LiveConsumers::default();
        let ids: Vec<_> = (0..4).map(|_| NodeId::next()).collect();
        for id in &ids {
            live.insert(*id);
        }
        live.remove(ids[1]);

        let remaining: Vec<_> = live.ids().collect();
        assert_eq!(remaining, vec![ids[0], ids[2], ids[3]]);
    }
}
