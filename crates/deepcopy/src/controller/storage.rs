//! Generic copy controller over a [`Storage`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::CopySettings;
use crate::core::{Filter, ObjectId, Row, Storage, Value};
use crate::error::{CopyError, Result};
use crate::extension::{ExclusionPolicy, StaticExclusions};
use crate::graph::NodeId;
use crate::schema::TableDescriptor;

use super::{
    CopyContext, CopyController, CopyOutcome, CrossExclusionPolicy, Exclusion,
    ReadScope, UnsatisfiedLink, UnsatisfiedLinkAction,
};

/// Copies rows within one [`Storage`], inside a single transaction.
///
/// The controller owns the transaction: `start_copy` opens it, `commit`
/// commits it and `handle_errors` rolls it back.
pub struct StorageController<S: Storage> {
    storage: Arc<S>,
    unsatisfied_links: UnsatisfiedLinkAction,
    cross_exclusion: CrossExclusionPolicy,
    exclusions: Arc<dyn ExclusionPolicy>,
}

impl<S: Storage> StorageController<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            unsatisfied_links: UnsatisfiedLinkAction::default(),
            cross_exclusion: CrossExclusionPolicy::default(),
            exclusions: Arc::new(StaticExclusions::default()),
        }
    }

    /// Controller configured from the `copy` section.
    pub fn from_config(storage: Arc<S>, settings: &CopySettings) -> Self {
        Self::new(storage)
            .with_unsatisfied_links(settings.unsatisfied_links)
            .with_cross_exclusion(settings.cross_exclusion)
            .with_exclusions(Arc::new(StaticExclusions::from_config(&settings.exclusions)))
    }

    #[must_use]
    pub fn with_unsatisfied_links(mut self, action: UnsatisfiedLinkAction) -> Self {
        self.unsatisfied_links = action;
        self
    }

    #[must_use]
    pub fn with_cross_exclusion(mut self, policy: CrossExclusionPolicy) -> Self {
        self.cross_exclusion = policy;
        self
    }

    #[must_use]
    pub fn with_exclusions(mut self, exclusions: Arc<dyn ExclusionPolicy>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    async fn read_source(&self, table: &TableDescriptor, id: &ObjectId) -> Result<Row> {
        self.get_object_by_id(table, id, ReadScope::Full)
            .await?
            .ok_or_else(|| {
                CopyError::backend(
                    "copy_object",
                    format!("source row {} {} no longer exists", table.id(), id),
                )
            })
    }

    async fn copy_normal(&self, table: &TableDescriptor, id: &ObjectId) -> Result<CopyOutcome> {
        let id_column = table.id_column().ok_or_else(|| {
            CopyError::invariant(format!("table '{}' has no single id column", table.id()))
        })?;

        let mut row = self.read_source(table, id).await?;
        row.remove(id_column);
        for (column, value) in table.default_values() {
            row.insert(column.clone(), value.clone());
        }

        let new_id = self
            .storage
            .insert(table.name(), row, Some(id_column))
            .await?
            .ok_or_else(|| {
                CopyError::backend(
                    "copy_object",
                    format!("storage returned no identity for {}", table.id()),
                )
            })?;
        Ok(CopyOutcome::created(ObjectId::Single(new_id)))
    }

    async fn copy_cross(&self, ctx: &CopyContext<'_>, node: NodeId) -> Result<CopyOutcome> {
        let object = ctx.graph.node(node);
        let table = ctx.table_of(node);
        let mut row = self.read_source(table, object.original_id()).await?;

        for reference in table.references() {
            let column = reference.link_column();
            if object.is_nullified(column) {
                if table.id_columns().iter().any(|c| c == column) {
                    // A NULL key column would leave the join row without an identity.
                    warn!(
                        "Skipping {} {}: identity column {} was nullified",
                        table.id(),
                        object.original_id(),
                        column
                    );
                    return Ok(CopyOutcome::ignored());
                }
                row.insert(column.to_string(), Value::Null);
                continue;
            }

            let excluded_target = match object.forward_ref(column) {
                Some(target) => {
                    let target_node = ctx.graph.node(target);
                    if target_node.is_excluded() {
                        Some(ctx.tables.get(target_node.table()).id().to_string())
                    } else {
                        match target_node.new_id() {
                            Some(new_id) => {
                                let new_id = new_id.as_single().ok_or_else(|| {
                                    CopyError::invariant(format!(
                                        "{} points at composite identity {}",
                                        reference.name(),
                                        new_id
                                    ))
                                })?;
                                row.insert(column.to_string(), Value::Int(new_id));
                                None
                            }
                            None => {
                                // Target copied with Removed/Ignored: the join row has no partner.
                                debug!(
                                    "{} {}: {} target was not copied, skipping",
                                    table.id(),
                                    object.original_id(),
                                    column
                                );
                                return Ok(CopyOutcome::ignored());
                            }
                        }
                    }
                }
                None => {
                    // Unresolved: keep the foreign value unless its target is excluded.
                    match (reference.resolve_target(object), reference.link_id(object)) {
                        (Some(target), Some(id)) => {
                            let target = ctx.tables.get(target);
                            match self.exclusions.exclusion(target.id(), &id) {
                                Exclusion::NotExcluded => None,
                                _ => Some(target.id().to_string()),
                            }
                        }
                        _ => None,
                    }
                }
            };

            if let Some(target) = excluded_target {
                match self.cross_exclusion {
                    CrossExclusionPolicy::Drop => {
                        warn!(
                            "Dropping {} {}: {} references excluded {}",
                            table.id(),
                            object.original_id(),
                            column,
                            target
                        );
                        return Ok(CopyOutcome::ignored());
                    }
                    CrossExclusionPolicy::Keep => {}
                    CrossExclusionPolicy::Report => {
                        return Err(CopyError::backend(
                            "copy_object",
                            format!(
                                "{} {} references excluded {} through {}",
                                table.id(),
                                object.original_id(),
                                target,
                                column
                            ),
                        ));
                    }
                }
            }
        }

        let new_id = ObjectId::from_row(&row, table.id_columns()).ok_or_else(|| {
            CopyError::invariant(format!(
                "cross row of '{}' has an incomplete identity",
                table.id()
            ))
        })?;
        self.storage.insert(table.name(), row, None).await?;
        Ok(CopyOutcome::created(new_id))
    }
}

fn id_filter(table: &TableDescriptor, id: &ObjectId) -> Result<Filter> {
    let parts = id.parts();
    if parts.len() != table.id_columns().len() {
        return Err(CopyError::invariant(format!(
            "identity {} does not fit the id columns of '{}'",
            id,
            table.id()
        )));
    }
    Ok(table
        .id_columns()
        .iter()
        .zip(parts)
        .fold(Filter::new(), |filter, (column, value)| filter.eq(column.as_str(), value)))
}

#[async_trait]
impl<S: Storage> CopyController for StorageController<S> {
    async fn start_copy(&self) -> Result<()> {
        self.storage.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.storage.commit().await
    }

    async fn handle_errors(&self, error: &CopyError) -> Result<()> {
        warn!("Rolling back copy: {}", error);
        self.storage.rollback().await
    }

    async fn get_object_structure(&self, table: &str) -> Result<Option<Vec<String>>> {
        self.storage.columns(table).await
    }

    async fn get_objects(&self, table: &TableDescriptor, filter: &Filter) -> Result<Vec<Row>> {
        self.storage
            .select(table.name(), Some(table.reference_columns()), filter)
            .await
    }

    async fn get_object_by_id(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        scope: ReadScope,
    ) -> Result<Option<Row>> {
        let columns = match scope {
            ReadScope::References => table.reference_columns(),
            ReadScope::Full => table.copyable_columns(),
        };
        let rows = self
            .storage
            .select(table.name(), Some(columns), &id_filter(table, id)?)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn copy_object(&self, ctx: &CopyContext<'_>, node: NodeId) -> Result<CopyOutcome> {
        let table = ctx.table_of(node);
        if table.is_cross() {
            self.copy_cross(ctx, node).await
        } else {
            self.copy_normal(table, ctx.graph.node(node).original_id())
                .await
        }
    }

    async fn update_object(
        &self,
        table: &TableDescriptor,
        id: &ObjectId,
        values: &Row,
    ) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let touched = self
            .storage
            .update(table.name(), &id_filter(table, id)?, values)
            .await?;
        if touched == 0 {
            return Err(CopyError::backend(
                "update_object",
                format!("no row {} {} to update", table.id(), id),
            ));
        }
        Ok(())
    }

    async fn handle_unsatisfied_link(&self, link: &UnsatisfiedLink) -> Result<UnsatisfiedLinkAction> {
        warn!(
            "Unsatisfied link {} of {} {} (value {}, {:?}): {:?}",
            link.reference, link.table, link.id, link.value, link.reason, self.unsatisfied_links
        );
        Ok(self.unsatisfied_links)
    }

    async fn is_excluded(&self, table: &TableDescriptor, id: &ObjectId) -> Result<Exclusion> {
        Ok(self.exclusions.exclusion(table.id(), id))
    }

    fn controller_type(&self) -> &str {
        "storage"
    }
}
