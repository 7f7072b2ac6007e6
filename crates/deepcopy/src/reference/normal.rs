//! Default reference: one static link column, one static target.

use std::sync::Arc;

use crate::core::ReferenceBuild;
use crate::graph::ObjectNode;
use crate::schema::{CopyPolicy, TableIdx};

use super::ReferenceDescriptor;

#[derive(Debug, Clone)]
pub struct NormalReference {
    name: String,
    owner: TableIdx,
    link_column: String,
    target: TableIdx,
    forward: CopyPolicy,
    backward: CopyPolicy,
}

impl NormalReference {
    pub fn new(
        owner: (TableIdx, &str),
        link_column: impl Into<String>,
        target: TableIdx,
        forward: CopyPolicy,
        backward: CopyPolicy,
    ) -> Self {
        let link_column = link_column.into();
        Self {
            name: format!("{}.{}", owner.1, link_column),
            owner: owner.0,
            link_column,
            target,
            forward,
            backward,
        }
    }

    /// Factory registered as `"normal"`.
    pub fn build(ctx: &ReferenceBuild<'_>) -> Result<Arc<dyn ReferenceDescriptor>, String> {
        let target_id = ctx
            .config
            .target
            .as_deref()
            .ok_or_else(|| "a normal reference needs a target table".to_string())?;
        let target = ctx.table(target_id)?;
        Ok(Arc::new(Self::new(
            (ctx.owner, ctx.owner_id),
            ctx.link_column()?,
            target,
            ctx.forward_policy(),
            ctx.backward_policy(),
        )))
    }
}

impl ReferenceDescriptor for NormalReference {
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
        vec![self.target]
    }

    fn resolve_target(&self, _node: &ObjectNode) -> Option<TableIdx> {
        Some(self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectId, Value};
    use crate::graph::NodeKey;

    fn reference() -> NormalReference {
        NormalReference::new(
            (TableIdx::new(0), "page"),
            "template_id",
            TableIdx::new(1),
            CopyPolicy::Always,
            CopyPolicy::Never,
        )
    }

    fn node(template_id: Value) -> ObjectNode {
        let mut node = ObjectNode::new(NodeKey::new(TableIdx::new(0), 4), 0, None);
        node.set_value("template_id", template_id);
        node
    }

    #[test]
    fn test_name_and_targets() {
        let r = reference();
        assert_eq!(r.name(), "page.template_id");
        assert_eq!(r.possible_targets(), vec![TableIdx::new(1)]);
        assert_eq!(r.resolve_target(&node(Value::Int(3))), Some(TableIdx::new(1)));
    }

    #[test]
    fn test_is_linked() {
        let r = reference();
        assert!(r.is_linked(&node(Value::Int(3))));
        assert!(!r.is_linked(&node(Value::Int(0))));
        assert!(!r.is_linked(&node(Value::from("0"))));
        assert!(!r.is_linked(&node(Value::Null)));
        assert_eq!(r.link_id(&node(Value::from("3"))), Some(ObjectId::Single(3)));
    }
}
