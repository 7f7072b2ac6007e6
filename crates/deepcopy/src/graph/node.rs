//! A single row taking part in the copy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::controller::CopyAction;
use crate::core::{ObjectId, Row, Value};
use crate::schema::TableIdx;

/// Stable handle of a node inside an [`ObjectGraph`](super::ObjectGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identity-map key: (table, original id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub table: TableIdx,
    pub id: ObjectId,
}

impl NodeKey {
    pub fn new(table: TableIdx, id: impl Into<ObjectId>) -> Self {
        Self {
            table,
            id: id.into(),
        }
    }
}

/// How a node entered the graph. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationCause {
    /// Selected as a root object.
    Root,
    /// Target of a forward reference of `from`.
    Forward { from: NodeId, reference: String },
    /// Found pointing at `from` through a backward reference.
    Backward { from: NodeId, reference: String },
}

/// One row to copy.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    key: NodeKey,
    new_id: Option<ObjectId>,
    /// Link column → resolved target (`None` when resolution failed).
    forward_refs: BTreeMap<String, Option<NodeId>>,
    /// Reference name → referrers, once backward references were walked.
    back_refs: Option<BTreeMap<String, Vec<NodeId>>>,
    field_values: Row,
    creation_cause: Option<CreationCause>,
    references_filled: bool,
    excluded: bool,
    depth: usize,
    copy_action: Option<CopyAction>,
    nullified: BTreeSet<String>,
}

impl ObjectNode {
    pub fn new(key: NodeKey, depth: usize, cause: Option<CreationCause>) -> Self {
        Self {
            key,
            new_id: None,
            forward_refs: BTreeMap::new(),
            back_refs: None,
            field_values: Row::new(),
            creation_cause: cause,
            references_filled: false,
            excluded: false,
            depth,
            copy_action: None,
            nullified: BTreeSet::new(),
        }
    }

    /// A tombstone for an excluded row: it satisfies referrers but is never
    /// traversed or copied.
    pub fn placeholder(key: NodeKey, depth: usize, cause: Option<CreationCause>) -> Self {
        let mut node = Self::new(key, depth, cause);
        node.excluded = true;
        node.references_filled = true;
        node
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn table(&self) -> TableIdx {
        self.key.table
    }

    pub fn original_id(&self) -> &ObjectId {
        &self.key.id
    }

    pub fn new_id(&self) -> Option<&ObjectId> {
        self.new_id.as_ref()
    }

    pub fn set_new_id(&mut self, id: ObjectId) {
        self.new_id = Some(id);
    }

    /// The new id once copied, the original id before that.
    pub fn current_id(&self) -> &ObjectId {
        self.new_id.as_ref().unwrap_or(&self.key.id)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.field_values.get(column)
    }

    pub fn set_value(&mut self, column: impl Into<String>, value: Value) {
        self.field_values.insert(column.into(), value);
    }

    /// Captured reference values.
    pub fn values(&self) -> &Row {
        &self.field_values
    }

    /// Resolved target of a forward reference.
    pub fn forward_ref(&self, column: &str) -> Option<NodeId> {
        self.forward_refs.get(column).copied().flatten()
    }

    pub fn set_forward_ref(&mut self, column: impl Into<String>, target: Option<NodeId>) {
        self.forward_refs.insert(column.into(), target);
    }

    pub fn forward_refs(&self) -> &BTreeMap<String, Option<NodeId>> {
        &self.forward_refs
    }

    pub fn back_refs(&self) -> Option<&BTreeMap<String, Vec<NodeId>>> {
        self.back_refs.as_ref()
    }

    /// Record a referrer under `reference`, ignoring duplicates.
    pub fn add_back_ref(&mut self, reference: &str, from: NodeId) {
        let referrers = self
            .back_refs
            .get_or_insert_with(BTreeMap::new)
            .entry(reference.to_string())
            .or_default();
        if !referrers.contains(&from) {
            referrers.push(from);
        }
    }

    pub fn creation_cause(&self) -> Option<&CreationCause> {
        self.creation_cause.as_ref()
    }

    pub fn references_filled(&self) -> bool {
        self.references_filled
    }

    pub fn mark_references_filled(&mut self) {
        self.references_filled = true;
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    /// Traversal depth at which the node was discovered.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn copy_action(&self) -> Option<CopyAction> {
        self.copy_action
    }

    pub fn set_copy_action(&mut self, action: CopyAction) {
        self.copy_action = Some(action);
    }

    /// Clear a link value that could not be resolved.
    pub fn nullify(&mut self, column: &str) {
        self.field_values.insert(column.to_string(), Value::Null);
        self.nullified.insert(column.to_string());
    }

    pub fn is_nullified(&self, column: &str) -> bool {
        self.nullified.contains(column)
    }

    pub fn nullified(&self) -> impl Iterator<Item = &str> {
        self.nullified.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_id_follows_new_id() {
        let mut node = ObjectNode::new(NodeKey::new(TableIdx::new(0), 7), 0, None);
        assert_eq!(node.current_id(), &ObjectId::Single(7));
        node.set_new_id(ObjectId::Single(107));
        assert_eq!(node.current_id(), &ObjectId::Single(107));
        assert_eq!(node.original_id(), &ObjectId::Single(7));
    }

    #[test]
    fn test_placeholder_is_filled_and_excluded() {
        let node = ObjectNode::placeholder(NodeKey::new(TableIdx::new(1), 3), 2, None);
        assert!(node.is_excluded());
        assert!(node.references_filled());
        assert_eq!(node.depth(), 2);
    }

    #[test]
    fn test_back_refs_are_deduplicated() {
        let mut node = ObjectNode::new(NodeKey::new(TableIdx::new(0), 1), 0, None);
        assert!(node.back_refs().is_none());
        node.add_back_ref("folder.mother_id", NodeId(4));
        node.add_back_ref("folder.mother_id", NodeId(4));
        node.add_back_ref("folder.mother_id", NodeId(5));
        assert_eq!(
            node.back_refs().unwrap()["folder.mother_id"],
            vec![NodeId(4), NodeId(5)]
        );
    }

    #[test]
    fn test_nullify() {
        let mut node = ObjectNode::new(NodeKey::new(TableIdx::new(0), 1), 0, None);
        node.set_value("template_id", Value::Int(99));
        node.nullify("template_id");
        assert_eq!(node.value("template_id"), Some(&Value::Null));
        assert!(node.is_nullified("template_id"));
        assert_eq!(node.nullified().collect::<Vec<_>>(), ["template_id"]);
    }
}
