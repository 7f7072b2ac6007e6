//! Object discovery.
//!
//! Discovery runs in two passes over an explicit worklist:
//!
//! 1. [`Pass::Initial`] starts from the root selection and follows every
//!    forward reference with forward policy ALWAYS and every backward
//!    reference with backward policy ALWAYS, fetching targets that are not in
//!    the identity map yet.
//! 2. [`Pass::ClosureResolving`] re-walks the forward references of every
//!    discovered node without fetching anything. Deferred references (ASK,
//!    NEVER) resolve only if their target was pulled in by another path;
//!    whatever is still unresolved is handed to the controller as an
//!    unsatisfied link.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{
    CopyController, Exclusion, LinkFailure, ReadScope, UnsatisfiedLink, UnsatisfiedLinkAction,
};
use crate::core::{Filter, ObjectId, Row};
use crate::error::{CopyError, Result};
use crate::extension::ReferenceRestrictor;
use crate::graph::{CreationCause, NodeId, NodeKey, ObjectGraph, ObjectNode};
use crate::reference::ReferenceDescriptor;
use crate::schema::{BackReference, CopyPolicy, TableDescriptor, TableIdx, Tables};

/// Discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Initial,
    ClosureResolving,
}

/// Selection of root objects.
#[derive(Debug, Clone, Default)]
pub struct CopyRequest {
    /// Root ids to copy; `None` selects every root row matching `filter`.
    pub root_ids: Option<Vec<i64>>,
    /// Additional conditions on the root table.
    pub filter: Filter,
}

impl CopyRequest {
    /// Every row of the root table.
    pub fn all() -> Self {
        Self::default()
    }

    /// The given root ids.
    pub fn ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            root_ids: Some(ids.into_iter().collect()),
            filter: Filter::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }
}

pub(crate) struct Discovery<'a> {
    tables: &'a Tables,
    controller: &'a dyn CopyController,
    restrictors: &'a [Arc<dyn ReferenceRestrictor>],
    max_depth: usize,
    cancel: &'a CancellationToken,
    graph: &'a mut ObjectGraph,
    queue: VecDeque<NodeId>,
    /// Why a fetch in the initial pass came back empty.
    failures: HashMap<(NodeId, String), LinkFailure>,
}

impl<'a> Discovery<'a> {
    pub(crate) fn new(
        tables: &'a Tables,
        controller: &'a dyn CopyController,
        restrictors: &'a [Arc<dyn ReferenceRestrictor>],
        max_depth: usize,
        cancel: &'a CancellationToken,
        graph: &'a mut ObjectGraph,
    ) -> Self {
        Self {
            tables,
            controller,
            restrictors,
            max_depth,
            cancel,
            graph,
            queue: VecDeque::new(),
            failures: HashMap::new(),
        }
    }

    pub(crate) async fn run(&mut self, request: &CopyRequest) -> Result<()> {
        let roots = self.select_roots(request).await?;
        info!(
            "Selected {} root object(s) from '{}'",
            roots,
            self.tables.root().id()
        );

        while let Some(id) = self.queue.pop_front() {
            self.check_cancelled()?;
            self.fill_references(id).await?;
        }
        info!("Initial pass discovered {} object(s)", self.graph.len());

        let ids: Vec<NodeId> = self.graph.ids().collect();
        for id in ids {
            self.check_cancelled()?;
            self.resolve_closure(id).await?;
        }
        info!(
            "Closure pass finished, {} unsatisfied link(s)",
            self.graph.unsatisfied().len()
        );
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        Ok(())
    }

    async fn select_roots(&mut self, request: &CopyRequest) -> Result<usize> {
        let tables = self.tables;
        let root = tables.root();
        let mut filter = request.filter.clone();
        if let (Some(ids), Some(id_column)) = (&request.root_ids, root.id_column()) {
            filter = filter.is_in(id_column, ids.iter().copied());
        }

        let rows = self.controller.get_objects(root, &filter).await?;
        let mut selected = 0;
        for row in rows {
            self.check_cancelled()?;
            let Some(id) = ObjectId::from_row(&row, root.id_columns()) else {
                warn!("Skipping {} row without identity", root.id());
                continue;
            };
            match self.controller.is_excluded(root, &id).await? {
                Exclusion::Drop => {
                    warn!("Root {} {} is excluded", root.id(), id);
                    continue;
                }
                Exclusion::Placeholder => {
                    self.placeholder(root, id, 0, CreationCause::Root)?;
                }
                Exclusion::NotExcluded => {
                    self.materialize(root, id, &row, 0, CreationCause::Root)?;
                }
            }
            selected += 1;
        }
        Ok(selected)
    }

    /// Initial pass for one node.
    async fn fill_references(&mut self, id: NodeId) -> Result<()> {
        let tables = self.tables;
        let node = self.graph.node(id);
        if node.references_filled() || node.is_excluded() {
            return Ok(());
        }
        let table = tables.get(node.table());

        for reference in table.references() {
            self.follow_forward(id, reference.as_ref(), Pass::Initial)
                .await?;
        }
        for back in table.deep_back_references() {
            self.follow_backward(id, *back).await?;
        }

        self.graph.node_mut(id).mark_references_filled();
        Ok(())
    }

    /// Closure pass for one node.
    async fn resolve_closure(&mut self, id: NodeId) -> Result<()> {
        let tables = self.tables;
        let node = self.graph.node(id);
        if node.is_excluded() {
            return Ok(());
        }
        let table = tables.get(node.table());
        for reference in table.references() {
            self.follow_forward(id, reference.as_ref(), Pass::ClosureResolving)
                .await?;
        }
        Ok(())
    }

    fn is_restricted(
        &self,
        reference: &dyn ReferenceDescriptor,
        node: &ObjectNode,
        backward: bool,
    ) -> bool {
        self.restrictors
            .iter()
            .any(|r| r.is_restricted(self.tables, reference, node, backward))
    }

    /// Resolve one forward reference of `id`.
    ///
    /// In the initial pass only ALWAYS references are followed and missing
    /// targets are fetched. In the closure pass every reference is resolved
    /// against the identity map only, and unresolved links are reported.
    async fn follow_forward(
        &mut self,
        id: NodeId,
        reference: &dyn ReferenceDescriptor,
        pass: Pass,
    ) -> Result<()> {
        let column = reference.link_column();
        let node = self.graph.node(id);
        if node.is_excluded() || node.forward_ref(column).is_some() {
            return Ok(());
        }

        if self.is_restricted(reference, node, false) {
            if pass == Pass::ClosureResolving && reference.is_linked(node) {
                let target = reference.resolve_target(node);
                self.unsatisfied(id, reference, target, LinkFailure::Restricted)
                    .await?;
            }
            return Ok(());
        }
        if pass == Pass::Initial && reference.forward_policy() != CopyPolicy::Always {
            return Ok(());
        }
        if !reference.is_linked(node) {
            return Ok(());
        }

        let Some(target_idx) = reference.resolve_target(node) else {
            if pass == Pass::ClosureResolving {
                self.unsatisfied(id, reference, None, LinkFailure::UnknownTarget)
                    .await?;
            }
            return Ok(());
        };
        let Some(target_id) = reference.link_id(node) else {
            if pass == Pass::ClosureResolving {
                self.unsatisfied(id, reference, Some(target_idx), LinkFailure::TargetMissing)
                    .await?;
            }
            return Ok(());
        };

        let depth = node.depth() + 1;
        let key = NodeKey::new(target_idx, target_id.clone());
        if let Some(target) = self.graph.lookup(&key) {
            self.graph.node_mut(id).set_forward_ref(column, Some(target));
            return Ok(());
        }

        match pass {
            Pass::Initial => {
                let cause = CreationCause::Forward {
                    from: id,
                    reference: reference.name().to_string(),
                };
                match self.fetch(target_idx, target_id, depth, cause).await? {
                    Ok(target) => {
                        self.graph.node_mut(id).set_forward_ref(column, Some(target));
                    }
                    Err(failure) => {
                        self.graph.node_mut(id).set_forward_ref(column, None);
                        self.failures.insert((id, column.to_string()), failure);
                    }
                }
            }
            Pass::ClosureResolving => {
                let failure = match self.failures.get(&(id, column.to_string())) {
                    Some(failure) => *failure,
                    None if reference.forward_policy().is_always() => LinkFailure::TargetMissing,
                    None => LinkFailure::NotFollowed,
                };
                self.unsatisfied(id, reference, Some(target_idx), failure)
                    .await?;
            }
        }
        Ok(())
    }

    /// Walk one backward reference: collect every row of the owning table
    /// that points at `id`.
    async fn follow_backward(&mut self, id: NodeId, back: BackReference) -> Result<()> {
        let tables = self.tables;
        let reference = tables.reference(back);
        let owner = tables.get(back.table);
        let node = self.graph.node(id);
        if node.is_excluded() || self.is_restricted(reference.as_ref(), node, true) {
            return Ok(());
        }

        let target = tables.get(node.table());
        let Some(filter) = reference.backward_filter(target, node.original_id()) else {
            return Ok(());
        };
        let depth = node.depth() + 1;

        let rows = self.controller.get_objects(owner, &filter).await?;
        for row in rows {
            self.check_cancelled()?;
            let Some(referrer_id) = ObjectId::from_row(&row, owner.id_columns()) else {
                warn!("Skipping {} row without identity", owner.id());
                continue;
            };
            let cause = CreationCause::Backward {
                from: id,
                reference: reference.name().to_string(),
            };

            let referrer = match self.graph.find(owner.idx(), referrer_id.clone()) {
                Some(existing) => existing,
                None => match self.controller.is_excluded(owner, &referrer_id).await? {
                    Exclusion::Drop => {
                        debug!("{} {} is excluded, not copied", owner.id(), referrer_id);
                        continue;
                    }
                    Exclusion::Placeholder => self.placeholder(owner, referrer_id, depth, cause)?,
                    Exclusion::NotExcluded => {
                        self.materialize(owner, referrer_id, &row, depth, cause)?
                    }
                },
            };
            self.graph.node_mut(id).add_back_ref(reference.name(), referrer);
        }
        Ok(())
    }

    /// Materialize a forward target that is not in the identity map yet.
    ///
    /// The inner `Err` explains why there is no target.
    async fn fetch(
        &mut self,
        table_idx: TableIdx,
        id: ObjectId,
        depth: usize,
        cause: CreationCause,
    ) -> Result<std::result::Result<NodeId, LinkFailure>> {
        let table = self.tables.get(table_idx);
        let controller = self.controller;
        match controller.is_excluded(table, &id).await? {
            Exclusion::Drop => {
                debug!("{} {} is excluded, not copied", table.id(), id);
                Ok(Err(LinkFailure::TargetExcluded))
            }
            Exclusion::Placeholder => Ok(Ok(self.placeholder(table, id, depth, cause)?)),
            Exclusion::NotExcluded => {
                match self
                    .controller
                    .get_object_by_id(table, &id, ReadScope::References)
                    .await?
                {
                    Some(row) => Ok(Ok(self.materialize(table, id, &row, depth, cause)?)),
                    None => Ok(Err(LinkFailure::TargetMissing)),
                }
            }
        }
    }

    fn check_depth(&self, table: &TableDescriptor, id: &ObjectId, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(CopyError::RecursionLimit {
                limit: self.max_depth,
                table: table.id().to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Add a node for a fetched row and queue it for traversal.
    fn materialize(
        &mut self,
        table: &TableDescriptor,
        id: ObjectId,
        row: &Row,
        depth: usize,
        cause: CreationCause,
    ) -> Result<NodeId> {
        self.check_depth(table, &id, depth)?;
        let (node_id, created) = self
            .graph
            .get_or_insert_with(NodeKey::new(table.idx(), id), |key| {
                ObjectNode::new(key, depth, Some(cause))
            });
        if !created {
            return Ok(node_id);
        }

        let node = self.graph.node_mut(node_id);
        for column in table.reference_columns() {
            let Some(value) = row.get(column) else {
                continue;
            };
            let needed = table.id_columns().contains(column)
                || table
                    .references()
                    .iter()
                    .filter(|r| r.needed_columns().contains(column))
                    .all(|r| r.is_reference_value_needed(row, column));
            if needed {
                node.set_value(column.as_str(), value.clone());
            }
        }
        debug!("Discovered {} {} at depth {}", table.id(), node.original_id(), depth);

        self.queue.push_back(node_id);
        Ok(node_id)
    }

    /// Add a tombstone for an excluded row.
    fn placeholder(
        &mut self,
        table: &TableDescriptor,
        id: ObjectId,
        depth: usize,
        cause: CreationCause,
    ) -> Result<NodeId> {
        self.check_depth(table, &id, depth)?;
        debug!("{} {} is excluded, keeping a placeholder", table.id(), id);
        let (node_id, _) = self
            .graph
            .get_or_insert_with(NodeKey::new(table.idx(), id), |key| {
                ObjectNode::placeholder(key, depth, Some(cause))
            });
        Ok(node_id)
    }

    /// Report a link that should be linked but could not be resolved and
    /// apply the controller's decision.
    async fn unsatisfied(
        &mut self,
        id: NodeId,
        reference: &dyn ReferenceDescriptor,
        target: Option<TableIdx>,
        reason: LinkFailure,
    ) -> Result<()> {
        let column = reference.link_column();
        let node = self.graph.node(id);
        let link = UnsatisfiedLink {
            table: self.tables.get(node.table()).id().to_string(),
            id: node.original_id().clone(),
            reference: reference.name().to_string(),
            column: column.to_string(),
            target: target.map(|t| self.tables.get(t).id().to_string()),
            value: node.value(column).cloned().unwrap_or_default(),
            reason,
        };

        let action = self.controller.handle_unsatisfied_link(&link).await?;
        let abort = (action == UnsatisfiedLinkAction::Abort).then(|| link.to_error());

        let node = self.graph.node_mut(id);
        node.set_forward_ref(column, None);
        if action == UnsatisfiedLinkAction::Nullify {
            node.nullify(column);
        }
        self.graph.record_unsatisfied(link);

        match abort {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
