//! Graph introspection.
//!
//! A [`GraphSnapshot`] is a plain, serializable copy of the graph's structure
//! at one instant. It is meant for debugging and for asserting on edges in
//! tests; it holds no values.

use serde::Serialize;

use super::node::{DirtyState, Epoch, NodeId, NodeKind, Version};
use super::Graph;

/// Structure of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: Option<String>,
    pub version: Version,
    pub state: DirtyState,
    pub live: bool,
    /// Producers in read order.
    pub producers: Vec<NodeId>,
    pub live_consumers: Vec<NodeId>,
}

/// Structure of a whole graph, nodes sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub epoch: Epoch,
    pub nodes: Vec<NodeSnapshot>,
}

impl GraphSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes
            .binary_search_by_key(&id, |node| node.id)
            .ok()
            .map(|index| &self.nodes[index])
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Graph {
    /// Capture the current structure of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let core = self.core();
        let mut nodes: Vec<NodeSnapshot> = core
            .nodes
            .iter()
            .map(|(id, record)| NodeSnapshot {
                id: *id,
                kind: record.kind(),
                label: record.label.clone(),
                version: record.version,
                state: record.state,
                live: record.is_live(),
                producers: record.producer_ids().into_vec(),
                live_consumers: record.live_consumers.ids().collect(),
            })
            .collect();
        nodes.sort_by_key(|node| node.id);

        GraphSnapshot {
            epoch: core.epoch,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::graph::NodeRecord;

    #[test]
    fn snapshot_lists_nodes_in_id_order() {
        let graph = Graph::new();
        let first = graph.insert_node(NodeRecord::source(Rc::new(1_u8)));
        let second =
            graph.insert_node(NodeRecord::source(Rc::new(2_u8)).with_label(Some("second".into())));

        let snapshot = graph.snapshot();
        let ids: Vec<_> = snapshot.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(snapshot.node(second).unwrap().label.as_deref(), Some("second"));
        assert_eq!(snapshot.node(first).unwrap().kind, NodeKind::Source);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let graph = Graph::new();
        let id = graph.insert_node(NodeRecord::source(Rc::new(())));

        let json = graph.snapshot().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["epoch"], 1);
        assert_eq!(value["nodes"][0]["id"], id.raw());
        assert_eq!(value["nodes"][0]["kind"], "Source");
        assert_eq!(value["nodes"][0]["state"], "Clean");
    }
}
