//! Copy controller contract.
//!
//! The orchestrator is backend-agnostic: every read, insert and update goes
//! through a [`CopyController`]. A controller also owns the lifecycle hooks
//! around the copy phases and decides what happens with links that cannot be
//! resolved and with rows that are excluded from the copy.
//!
//! - [`StorageController`]: generic controller over any [`Storage`](crate::core::Storage)

mod storage;

pub use storage::StorageController;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Filter, ObjectId, Row, Value};
use crate::error::{CopyError, Result};
use crate::graph::{NodeId, ObjectGraph};
use crate::schema::{TableDescriptor, Tables};

/// Read-only view of a run handed to controllers and modifiers.
#[derive(Clone, Copy)]
pub struct CopyContext<'a> {
    pub tables: &'a Tables,
    pub graph: &'a ObjectGraph,
}

impl<'a> CopyContext<'a> {
    pub fn new(tables: &'a Tables, graph: &'a ObjectGraph) -> Self {
        Self { tables, graph }
    }

    /// Table descriptor of a node.
    pub fn table_of(&self, node: NodeId) -> &'a TableDescriptor {
        self.tables.get(self.graph.node(node).table())
    }
}

/// Which columns a by-id read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadScope {
    /// Identity and reference columns only (discovery).
    References,
    /// Every copyable column (copy).
    Full,
}

/// What the controller did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyAction {
    Created,
    Updated,
    Removed,
    Ignored,
}

impl CopyAction {
    /// Whether the action leaves a row that carries a new identity.
    pub fn has_new_row(self) -> bool {
        matches!(self, CopyAction::Created | CopyAction::Updated)
    }
}

/// Result of copying one object.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyOutcome {
    pub action: CopyAction,
    pub new_id: Option<ObjectId>,
}

impl CopyOutcome {
    pub fn created(new_id: ObjectId) -> Self {
        Self {
            action: CopyAction::Created,
            new_id: Some(new_id),
        }
    }

    pub fn updated(new_id: ObjectId) -> Self {
        Self {
            action: CopyAction::Updated,
            new_id: Some(new_id),
        }
    }

    pub fn removed() -> Self {
        Self {
            action: CopyAction::Removed,
            new_id: None,
        }
    }

    pub fn ignored() -> Self {
        Self {
            action: CopyAction::Ignored,
            new_id: None,
        }
    }
}

/// Controller response to an unsatisfied link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsatisfiedLinkAction {
    /// Leave the foreign value as it is.
    #[default]
    Ignore,
    /// Write NULL into the copied row.
    Nullify,
    /// Fail the run.
    Abort,
}

/// What happens to a cross-table row pointing at an excluded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossExclusionPolicy {
    /// Skip the row (`Ignored`).
    #[default]
    Drop,
    /// Copy the row keeping the original value.
    Keep,
    /// Fail the run.
    Report,
}

/// Exclusion state of a (table, id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    #[default]
    NotExcluded,
    /// The row acts as if it did not exist.
    Drop,
    /// The row is a tombstone: it satisfies referrers but emits no edges.
    Placeholder,
}

/// Why a link could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFailure {
    /// The target row does not exist in the source.
    TargetMissing,
    /// The target row is excluded from the copy.
    TargetExcluded,
    /// The row's value does not select any known target table.
    UnknownTarget,
    /// The reference is not followed (NEVER or ASK) and the target is not
    /// part of the copy.
    NotFollowed,
    /// A restrictor vetoed the edge.
    Restricted,
}

/// A forward reference that should be linked but could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsatisfiedLink {
    /// Table id of the referring row.
    pub table: String,
    /// Identity of the referring row.
    pub id: ObjectId,
    /// Reference name.
    pub reference: String,
    /// Link column.
    pub column: String,
    /// Target table id, when it could be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Raw link value.
    pub value: Value,
    pub reason: LinkFailure,
}

impl UnsatisfiedLink {
    /// Error raised when a controller aborts on this link.
    pub fn to_error(&self) -> CopyError {
        CopyError::UnsatisfiedLink {
            table: self.table.clone(),
            column: self.column.clone(),
            target: self.target.clone().unwrap_or_else(|| "?".to_string()),
            value: self.value.to_string(),
        }
    }
}

/// Backend strategy driven by the orchestrator.
///
/// Lifecycle hooks have no-op defaults. The orchestrator calls them in a
/// fixed order: `start_copy`, discovery, `begin_copy_objects`, the two copy
/// passes, relink, `finish_copy_objects`, `commit`, `post_commit`,
/// `finish_copy`. Whenever a run fails, `handle_errors` is notified before
/// the error reaches the caller.
#[async_trait]
pub trait CopyController: Send + Sync {
    /// Called once before discovery.
    async fn start_copy(&self) -> Result<()> {
        Ok(())
    }

    /// Called once after a successful run.
    async fn finish_copy(&self) -> Result<()> {
        Ok(())
    }

    /// Called with the failure of a run before it is propagated.
    async fn handle_errors(&self, _error: &CopyError) -> Result<()> {
        Ok(())
    }

    /// Called before the first object is copied.
    async fn begin_copy_objects(&self, _ctx: &CopyContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after relinking, before commit.
    async fn finish_copy_objects(&self, _ctx: &CopyContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Make the copy durable.
    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    /// Called only after a successful commit.
    async fn post_commit(&self, _ctx: &CopyContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Physical columns of a table, or `None` if it does not exist.
    async fn get_object_structure(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Rows of `table` matching `filter`, restricted to its reference columns.
    async fn get_objects(&self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>>;

    /// A single row by identity.
    async fn get_object_by_id(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        scope: ReadScope,
    ) -> Result<Option<Row>>;

    /// Materialize the copy of one object.
    ///
    /// Cross-table objects are copied after every normal object, so their
    /// targets' new identities are available in `ctx.graph`.
    async fn copy_object(&self, ctx: &CopyContext<'_>, node: NodeId) -> Result<CopyOutcome>;

    /// Copy data owned by an object that lives outside the configured tables
    /// (files, blobs). Called after `copy_object` returned `Created`.
    async fn copy_object_structure(
        &self,
        _ctx: &CopyContext<'_>,
        _node: NodeId,
        _new_id: &ObjectId,
    ) -> Result<()> {
        Ok(())
    }

    /// Write `values` into the row of `table` identified by `id`.
    async fn update_object(&self, table: &TableDescriptor, id: &ObjectId, values: &Row)
        -> Result<()>;

    /// Write rewritten link values into the copy of `node`.
    async fn update_object_links(
        &self,
        ctx: &CopyContext<'_>,
        node: NodeId,
        values: &Row,
    ) -> Result<()> {
        let object = ctx.graph.node(node);
        let table = ctx.table_of(node);
        let new_id = object.new_id().ok_or_else(|| {
            CopyError::invariant(format!(
                "{} {} has no new identity to relink",
                table.id(),
                object.original_id()
            ))
        })?;
        self.update_object(table, new_id, values).await
    }

    /// Decide what to do with a link that could not be resolved.
    async fn handle_unsatisfied_link(&self, link: &UnsatisfiedLink) -> Result<UnsatisfiedLinkAction>;

    /// Exclusion state of a row.
    async fn is_excluded(&self, _table: &TableDescriptor, _id: &ObjectId) -> Result<Exclusion> {
        Ok(Exclusion::NotExcluded)
    }

    /// Get the controller type identifier (e.g., "storage").
    fn controller_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_has_new_row() {
        assert!(CopyAction::Created.has_new_row());
        assert!(CopyAction::Updated.has_new_row());
        assert!(!CopyAction::Removed.has_new_row());
        assert!(!CopyAction::Ignored.has_new_row());
    }

    #[test]
    fn test_settings_parse_snake_case() {
        let action: UnsatisfiedLinkAction = serde_yaml::from_str("nullify").unwrap();
        assert_eq!(action, UnsatisfiedLinkAction::Nullify);
        let policy: CrossExclusionPolicy = serde_yaml::from_str("report").unwrap();
        assert_eq!(policy, CrossExclusionPolicy::Report);
    }

    #[test]
    fn test_unsatisfied_link_error() {
        let link = UnsatisfiedLink {
            table: "page".into(),
            id: ObjectId::Single(4),
            reference: "page.template_id".into(),
            column: "template_id".into(),
            target: Some("template".into()),
            value: Value::Int(99),
            reason: LinkFailure::TargetMissing,
        };
        let err = link.to_error();
        assert_eq!(
            err.to_string(),
            "Unsatisfied link page.template_id -> template (value 99)"
        );
    }
}
