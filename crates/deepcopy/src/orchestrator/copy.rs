//! Copy and relink passes.
//!
//! Pass 1 copies every normal object, pass 2 every cross-table object, and
//! the relink pass rewrites the link columns of the normal copies. Each pass
//! starts only after the previous one finished for every node.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::{CopyAction, CopyContext, CopyOutcome};
use crate::core::{Row, Value};
use crate::error::{CopyError, Result};
use crate::extension::ModifyContext;
use crate::graph::{NodeId, ObjectGraph};

use super::CopyOrchestrator;

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CopyError::Cancelled);
    }
    Ok(())
}

impl CopyOrchestrator {
    /// Nodes to copy in one pass, in discovery order.
    fn copy_candidates(&self, graph: &ObjectGraph, cross: bool) -> Vec<NodeId> {
        graph
            .iter()
            .filter(|(_, node)| {
                !node.is_excluded() && self.tables.get(node.table()).is_cross() == cross
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub(super) async fn copy_normal_objects(
        &self,
        graph: &mut ObjectGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for id in self.copy_candidates(graph, false) {
            check_cancelled(cancel)?;
            self.copy_one(graph, id).await?;
        }
        Ok(())
    }

    pub(super) async fn copy_cross_objects(
        &self,
        graph: &mut ObjectGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ids = self.copy_candidates(graph, true);

        // Every normal object a cross row points at must be settled first.
        for id in &ids {
            let node = graph.node(*id);
            for target in node.forward_refs().values().flatten() {
                let target_node = graph.node(*target);
                if target_node.is_excluded() || self.tables.get(target_node.table()).is_cross() {
                    continue;
                }
                if target_node.copy_action().is_none() {
                    return Err(CopyError::invariant(format!(
                        "{} {} would be copied before its target {} {}",
                        self.tables.get(node.table()).id(),
                        node.original_id(),
                        self.tables.get(target_node.table()).id(),
                        target_node.original_id()
                    )));
                }
            }
        }

        for id in ids {
            check_cancelled(cancel)?;
            self.copy_one(graph, id).await?;
        }
        Ok(())
    }

    /// Copy one object, record its new identity and run the table's modifiers.
    async fn copy_one(&self, graph: &mut ObjectGraph, id: NodeId) -> Result<()> {
        let outcome = self
            .controller
            .copy_object(&CopyContext::new(&self.tables, graph), id)
            .await?;
        let CopyOutcome { action, new_id } = outcome;

        let table = self.tables.get(graph.node(id).table());
        let node = graph.node_mut(id);
        node.set_copy_action(action);
        if action.has_new_row() {
            let new_id = new_id.ok_or_else(|| {
                CopyError::invariant(format!(
                    "{} {} was {:?} without a new identity",
                    table.id(),
                    node.original_id(),
                    action
                ))
            })?;
            debug!("{} {} -> {} ({:?})", table.id(), node.original_id(), new_id, action);
            node.set_new_id(new_id.clone());

            if action == CopyAction::Created {
                self.controller
                    .copy_object_structure(&CopyContext::new(&self.tables, graph), id, &new_id)
                    .await?;
            }
        } else {
            debug!("{} {} {:?}", table.id(), node.original_id(), action);
        }

        if !table.modifiers().is_empty() {
            let ctx = ModifyContext {
                copy: CopyContext::new(&self.tables, graph),
                controller: self.controller.as_ref(),
            };
            for modifier in table.modifiers() {
                modifier.modify_object(&ctx, id, action).await?;
            }
        }
        Ok(())
    }

    /// Write the new identities of link targets into the copied normal rows.
    pub(super) async fn relink(
        &self,
        graph: &mut ObjectGraph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut relinked = 0;
        for id in self.copy_candidates(graph, false) {
            check_cancelled(cancel)?;

            let table = self.tables.get(graph.node(id).table());
            let action = graph.node(id).copy_action().ok_or_else(|| {
                CopyError::invariant(format!(
                    "{} {} reached relink without being copied",
                    table.id(),
                    graph.node(id).original_id()
                ))
            })?;
            if !action.has_new_row() {
                continue;
            }

            let mut values = Row::new();
            for reference in table.references() {
                let column = reference.link_column();
                if graph.node(id).is_nullified(column) {
                    values.insert(column.to_string(), Value::Null);
                    continue;
                }
                let Some(target) = graph.node(id).forward_ref(column) else {
                    continue;
                };

                let target_node = graph.node(target);
                if target_node.is_excluded() {
                    // Placeholders are never copied; the original value stays.
                    continue;
                }
                let target_table = self.tables.get(target_node.table());
                let new_target_id = target_node.new_id().cloned().ok_or_else(|| {
                    CopyError::invariant(format!(
                        "{} of {} {} points at {} {} which has no new identity",
                        reference.name(),
                        table.id(),
                        graph.node(id).original_id(),
                        target_table.id(),
                        target_node.original_id()
                    ))
                })?;

                let node = graph.node_mut(id);
                reference.rewrite(node, target_table, &new_target_id)?;
                values.insert(
                    column.to_string(),
                    node.value(column).cloned().unwrap_or_default(),
                );
            }

            if !values.is_empty() {
                self.controller
                    .update_object_links(&CopyContext::new(&self.tables, graph), id, &values)
                    .await?;
                relinked += 1;
            }
        }
        debug!("Relinked {} object(s)", relinked);
        Ok(())
    }
}
