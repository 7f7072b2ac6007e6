//! Object graph and identity map.
//!
//! Every row that takes part in a copy run is stored exactly once in the
//! [`ObjectGraph`] arena, keyed by (table, original id). Nodes point at each
//! other through [`NodeId`] handles, so cyclic data needs no shared ownership
//! and a lookup before every fetch is all cycle safety requires.

mod node;

pub use node::{CreationCause, NodeId, NodeKey, ObjectNode};

use std::collections::{BTreeSet, HashMap};

use crate::controller::UnsatisfiedLink;
use crate::core::ObjectId;
use crate::schema::TableIdx;

/// A resolved forward edge: (owner, link column, target).
pub type Edge = (NodeKey, String, Option<NodeKey>);

/// Run-scoped identity map owning all nodes.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    nodes: Vec<ObjectNode>,
    index: HashMap<NodeKey, NodeId>,
    unsatisfied: Vec<UnsatisfiedLink>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the node of a key.
    pub fn lookup(&self, key: &NodeKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Find the node of a raw (table, id) pair.
    pub fn find(&self, table: TableIdx, id: impl Into<ObjectId>) -> Option<NodeId> {
        self.lookup(&NodeKey::new(table, id))
    }

    /// Return the node of `key`, creating it with `make` if absent.
    ///
    /// The boolean is `true` when the node was created by this call.
    pub fn get_or_insert_with(
        &mut self,
        key: NodeKey,
        make: impl FnOnce(NodeKey) -> ObjectNode,
    ) -> (NodeId, bool) {
        if let Some(id) = self.index.get(&key) {
            return (*id, false);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(make(key.clone()));
        self.index.insert(key, id);
        (id, true)
    }

    pub fn node(&self, id: NodeId) -> &ObjectNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ObjectNode {
        &mut self.nodes[id.0]
    }

    /// Node handles in discovery order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ObjectNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every key in the map.
    pub fn keys(&self) -> BTreeSet<NodeKey> {
        self.index.keys().cloned().collect()
    }

    /// The link shape of the graph, independent of discovery order.
    pub fn edges(&self) -> BTreeSet<Edge> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.forward_refs().iter().map(move |(column, target)| {
                    (
                        node.key().clone(),
                        column.clone(),
                        target.map(|t| self.node(t).key().clone()),
                    )
                })
            })
            .collect()
    }

    pub fn record_unsatisfied(&mut self, link: UnsatisfiedLink) {
        self.unsatisfied.push(link);
    }

    /// Links reported as unsatisfied during discovery.
    pub fn unsatisfied(&self) -> &[UnsatisfiedLink] {
        &self.unsatisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(table: usize, id: i64) -> NodeKey {
        NodeKey::new(TableIdx::new(table), id)
    }

    #[test]
    fn test_get_or_insert_never_duplicates() {
        let mut graph = ObjectGraph::new();
        let (a, created) = graph.get_or_insert_with(key(0, 1), |k| ObjectNode::new(k, 0, None));
        assert!(created);
        let (b, created) = graph.get_or_insert_with(key(0, 1), |k| ObjectNode::new(k, 5, None));
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node(a).depth(), 0);
    }

    #[test]
    fn test_lookup_by_raw_id_and_key() {
        let mut graph = ObjectGraph::new();
        let (id, _) = graph.get_or_insert_with(key(1, 42), |k| ObjectNode::new(k, 0, None));
        assert_eq!(graph.find(TableIdx::new(1), 42), Some(id));
        assert_eq!(graph.lookup(&key(1, 42)), Some(id));
        assert_eq!(graph.find(TableIdx::new(0), 42), None);
    }

    #[test]
    fn test_edges() {
        let mut graph = ObjectGraph::new();
        let (a, _) = graph.get_or_insert_with(key(0, 2), |k| ObjectNode::new(k, 0, None));
        let (b, _) = graph.get_or_insert_with(key(0, 1), |k| ObjectNode::new(k, 1, None));
        graph.node_mut(a).set_forward_ref("mother_id", Some(b));
        graph.node_mut(b).set_forward_ref("mother_id", None);

        let edges = graph.edges();
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&(key(0, 2), "mother_id".to_string(), Some(key(0, 1)))));
        assert!(edges.contains(&(key(0, 1), "mother_id".to_string(), None)));
    }
}
