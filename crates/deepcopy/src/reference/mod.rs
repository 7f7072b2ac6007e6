//! Reference resolution strategies.
//!
//! A reference describes how a row of one table points at a row of another
//! table: which column carries the link, which table the link resolves to
//! and how the copy treats the edge in each direction. The engine only talks
//! to the [`ReferenceDescriptor`] trait; implementations are registered by
//! name in the [`ExtensionCatalog`](crate::core::ExtensionCatalog):
//!
//! - [`NormalReference`]: a single static link column and target table
//! - [`TypedReference`]: the target table is selected per row from a type
//!   discriminator column
//!
//! Traversal (following an edge forwards or backwards, which needs the
//! identity map and the controller) lives in the orchestrator; descriptors
//! stay pure so they can be shared by every node of a table.

mod normal;
mod typed;

pub use normal::NormalReference;
pub use typed::TypedReference;

use std::fmt;

use crate::core::{Filter, ObjectId, Row, Value};
use crate::error::{CopyError, Result};
use crate::graph::ObjectNode;
use crate::schema::{CopyPolicy, TableDescriptor, TableIdx};

/// Capability set of a reference.
pub trait ReferenceDescriptor: Send + Sync + fmt::Debug {
    /// Reference name, `<table>.<column>`.
    fn name(&self) -> &str;

    /// Table owning the link column.
    fn owner(&self) -> TableIdx;

    /// Column holding the link value.
    fn link_column(&self) -> &str;

    fn forward_policy(&self) -> CopyPolicy;

    fn backward_policy(&self) -> CopyPolicy;

    /// Every table this reference may point to.
    fn possible_targets(&self) -> Vec<TableIdx>;

    /// Target table for a concrete row, or `None` if the row does not
    /// point at any known table.
    fn resolve_target(&self, node: &ObjectNode) -> Option<TableIdx>;

    /// Columns whose values must be captured on every node of the owner
    /// table for this reference to work.
    fn needed_columns(&self) -> Vec<String> {
        vec![self.link_column().to_string()]
    }

    /// Whether the value of `column` is relevant for this particular row.
    fn is_reference_value_needed(&self, _row: &Row, _column: &str) -> bool {
        true
    }

    /// Whether the node points at something through this reference.
    ///
    /// An already resolved link counts as linked without looking at the
    /// stored value again.
    fn is_linked(&self, node: &ObjectNode) -> bool {
        if node.forward_ref(self.link_column()).is_some() {
            return true;
        }
        node.value(self.link_column())
            .map(Value::is_link)
            .unwrap_or(false)
    }

    /// Raw link value of the node, if linked.
    fn link_id(&self, node: &ObjectNode) -> Option<ObjectId> {
        node.value(self.link_column()).and_then(ObjectId::from_value)
    }

    /// Filter selecting the owner-table rows that point at `id` of `target`.
    ///
    /// Returns `None` when this reference cannot point at `target`.
    fn backward_filter(&self, target: &TableDescriptor, id: &ObjectId) -> Option<Filter> {
        if !self.possible_targets().contains(&target.idx()) {
            return None;
        }
        let id = id.as_single()?;
        Some(Filter::new().eq(self.link_column(), id))
    }

    /// Store the new identity of the target in the node's link value.
    fn rewrite(&self, node: &mut ObjectNode, target: &TableDescriptor, new_id: &ObjectId) -> Result<()> {
        let id = new_id.as_single().ok_or_else(|| {
            CopyError::invariant(format!(
                "{} cannot link to composite identity {} of {}",
                self.name(),
                new_id,
                target.id()
            ))
        })?;
        node.set_value(self.link_column(), Value::Int(id));
        Ok(())
    }
}
