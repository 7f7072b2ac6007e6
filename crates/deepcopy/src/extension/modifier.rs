//! Post-copy object modifiers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ModifierConfig;
use crate::controller::{CopyAction, CopyContext, CopyController, ReadScope};
use crate::core::{Row, Value};
use crate::error::Result;
use crate::graph::NodeId;

/// What a modifier gets to work with.
pub struct ModifyContext<'a> {
    pub copy: CopyContext<'a>,
    pub controller: &'a dyn CopyController,
}

/// Adjusts a freshly copied row.
///
/// Invoked once per copied row of a table declaring the modifier, after the
/// row has its new identity and before relinking.
#[async_trait]
pub trait ObjectModificator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn modify_object(
        &self,
        ctx: &ModifyContext<'_>,
        node: NodeId,
        action: CopyAction,
    ) -> Result<()>;
}

fn required_str(config: &ModifierConfig, key: &str) -> std::result::Result<String, String> {
    config
        .properties
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| format!("modifier '{}' needs a '{}' property", config.kind, key))
}

/// Writes a fixed value into a column of the new row (`type: set`).
#[derive(Debug, Clone)]
pub struct SetValueModifier {
    column: String,
    value: Value,
}

impl SetValueModifier {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }

    pub fn build(config: &ModifierConfig) -> std::result::Result<Arc<dyn ObjectModificator>, String> {
        let column = required_str(config, "column")?;
        let value = config
            .properties
            .get("value")
            .and_then(Value::from_yaml)
            .ok_or_else(|| "modifier 'set' needs a scalar 'value' property".to_string())?;
        Ok(Arc::new(Self::new(column, value)))
    }
}

#[async_trait]
impl ObjectModificator for SetValueModifier {
    fn name(&self) -> &str {
        "set"
    }

    async fn modify_object(
        &self,
        ctx: &ModifyContext<'_>,
        node: NodeId,
        action: CopyAction,
    ) -> Result<()> {
        if !action.has_new_row() {
            return Ok(());
        }
        let Some(new_id) = ctx.copy.graph.node(node).new_id() else {
            return Ok(());
        };
        let table = ctx.copy.table_of(node);
        let mut values = Row::new();
        values.insert(self.column.clone(), self.value.clone());
        debug!("set {}.{} on {}", table.id(), self.column, new_id);
        ctx.controller.update_object(table, new_id, &values).await
    }
}

/// Prepends a string to a text column of the new row (`type: prefix`).
#[derive(Debug, Clone)]
pub struct PrefixModifier {
    column: String,
    prefix: String,
}

impl PrefixModifier {
    pub fn new(column: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            prefix: prefix.into(),
        }
    }

    pub fn build(config: &ModifierConfig) -> std::result::Result<Arc<dyn ObjectModificator>, String> {
        Ok(Arc::new(Self::new(
            required_str(config, "column")?,
            required_str(config, "prefix")?,
        )))
    }
}

#[async_trait]
impl ObjectModificator for PrefixModifier {
    fn name(&self) -> &str {
        "prefix"
    }

    async fn modify_object(
        &self,
        ctx: &ModifyContext<'_>,
        node: NodeId,
        action: CopyAction,
    ) -> Result<()> {
        if action != CopyAction::Created {
            return Ok(());
        }
        let Some(new_id) = ctx.copy.graph.node(node).new_id() else {
            return Ok(());
        };
        let table = ctx.copy.table_of(node);
        let row = ctx
            .controller
            .get_object_by_id(table, new_id, ReadScope::Full)
            .await?;
        let current = match row.as_ref().and_then(|r| r.get(&self.column)) {
            Some(Value::Text(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let mut values = Row::new();
        values.insert(
            self.column.clone(),
            Value::Text(format!("{}{}", self.prefix, current)),
        );
        ctx.controller.update_object(table, new_id, &values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> ModifierConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_build_set() {
        let m = SetValueModifier::build(&config(
            "type: set\nproperties: { column: status, value: 0 }",
        ))
        .unwrap();
        assert_eq!(m.name(), "set");

        let err = SetValueModifier::build(&config("type: set\nproperties: { column: status }"))
            .unwrap_err();
        assert!(err.contains("'value'"));
    }

    #[test]
    fn test_build_prefix_requires_properties() {
        let err = PrefixModifier::build(&config("type: prefix\nproperties: { column: name }"))
            .unwrap_err();
        assert_eq!(err, "modifier 'prefix' needs a 'prefix' property");
    }
}
