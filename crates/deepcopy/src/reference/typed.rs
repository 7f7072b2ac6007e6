//! Reference whose target table is chosen per row by a type discriminator.
//!
//! Typical for generic link tables where `(obj_type, obj_id)` identifies an
//! object of one of several tables:
//!
//! ```yaml
//! - resolver: typed
//!   column: obj_id
//!   properties:
//!     type_column: obj_type
//!     types: { "10002": folder, "10007": page }
//! ```

use std::sync::Arc;

use crate::core::{Filter, ObjectId, ReferenceBuild, Row, Value};
use crate::graph::ObjectNode;
use crate::schema::{CopyPolicy, TableDescriptor, TableIdx};

use super::ReferenceDescriptor;

#[derive(Debug, Clone)]
pub struct TypedReference {
    name: String,
    owner: TableIdx,
    link_column: String,
    type_column: String,
    /// Type code → target table.
    types: Vec<(Value, TableIdx)>,
    forward: CopyPolicy,
    backward: CopyPolicy,
}

impl TypedReference {
    /// Factory registered as `"typed"`.
    pub fn build(ctx: &ReferenceBuild<'_>) -> Result<Arc<dyn ReferenceDescriptor>, String> {
        let link_column = ctx.link_column()?;
        let type_column = ctx
            .property_str("type_column")
            .ok_or_else(|| "typed reference needs a type_column property".to_string())?
            .to_string();

        let mapping = match ctx.config.properties.get("types") {
            Some(serde_yaml::Value::Mapping(m)) => m,
            _ => return Err("typed reference needs a types mapping".to_string()),
        };

        let mut types = Vec::with_capacity(mapping.len());
        for (code, table) in mapping {
            let code = Value::from_yaml(code)
                .filter(|v| !v.is_null())
                .ok_or_else(|| format!("invalid type code {:?}", code))?;
            let table = table
                .as_str()
                .ok_or_else(|| format!("type {} must map to a table id", code))?;
            types.push((code, ctx.table(table)?));
        }
        if types.is_empty() {
            return Err("typed reference needs at least one type".to_string());
        }

        Ok(Arc::new(Self {
            name: format!("{}.{}", ctx.owner_id, link_column),
            owner: ctx.owner,
            link_column,
            type_column,
            types,
            forward: ctx.forward_policy(),
            backward: ctx.backward_policy(),
        }))
    }

    fn target_for(&self, code: &Value) -> Option<TableIdx> {
        self.types
            .iter()
            .find(|(c, _)| c.matches(code))
            .map(|(_, table)| *table)
    }

    fn code_for(&self, table: TableIdx) -> Option<&Value> {
        self.types
            .iter()
            .find(|(_, t)| *t == table)
            .map(|(code, _)| code)
    }
}

impl ReferenceDescriptor for TypedReference {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> TableIdx {
        self.owner
    }

    fn link_column(&self) -> &str {
        &self.link_column
    }

    fn forward_policy(&self) -> CopyPolicy {
        self.forward
    }

    fn backward_policy(&self) -> CopyPolicy {
        self.backward
    }

    fn possible_targets(&self) -> Vec<TableIdx> {
        let mut targets: Vec<TableIdx> = self.types.iter().map(|(_, t)| *t).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    fn resolve_target(&self, node: &ObjectNode) -> Option<TableIdx> {
        node.value(&self.type_column)
            .and_then(|code| self.target_for(code))
    }

    fn needed_columns(&self) -> Vec<String> {
        vec![self.link_column.clone(), self.type_column.clone()]
    }

    /// The link value is only captured when the row's type is one we know;
    /// links to other object types are none of the copy's business.
    fn is_reference_value_needed(&self, row: &Row, column: &str) -> bool {
        if column != self.link_column {
            return true;
        }
        row.get(&self.type_column)
            .and_then(|code| self.target_for(code))
            .is_some()
    }

    fn backward_filter(&self, target: &TableDescriptor, id: &ObjectId) -> Option<Filter> {
        let code = self.code_for(target.idx())?;
        let id = id.as_single()?;
        Some(
            Filter::new()
                .eq(self.link_column.as_str(), id)
                .eq(self.type_column.as_str(), code.clone()),
        )
    }
}
