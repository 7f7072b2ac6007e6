//! Traversal restrictors.

use crate::config::{Direction, RestrictionRule};
use crate::graph::ObjectNode;
use crate::reference::ReferenceDescriptor;
use crate::schema::Tables;

/// Vetoes individual traversal edges.
///
/// Consulted before every edge, before the edge is even checked for being
/// linked. For a backward edge `node` is the object being pointed at.
pub trait ReferenceRestrictor: Send + Sync {
    fn is_restricted(
        &self,
        tables: &Tables,
        reference: &dyn ReferenceDescriptor,
        node: &ObjectNode,
        backward: bool,
    ) -> bool;
}

/// Restrictor built from `copy.restrictions`.
#[derive(Debug, Clone, Default)]
pub struct RuleRestrictor {
    rules: Vec<RestrictionRule>,
}

impl RuleRestrictor {
    pub fn from_config(rules: &[RestrictionRule]) -> Self {
        Self {
            rules: rules.to_vec(),
        }
    }

    /// Add a rule.
    #[must_use]
    pub fn deny(mut self, table: &str, column: &str, direction: Direction) -> Self {
        self.rules.push(RestrictionRule {
            table: table.to_string(),
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ReferenceRestrictor for RuleRestrictor {
    fn is_restricted(
        &self,
        tables: &Tables,
        reference: &dyn ReferenceDescriptor,
        _node: &ObjectNode,
        backward: bool,
    ) -> bool {
        let owner = tables.get(reference.owner()).id();
        self.rules.iter().any(|rule| {
            rule.table == owner
                && rule.column == reference.link_column()
                && rule.direction.covers(backward)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopyConfig;
    use crate::core::{ExtensionCatalog, LiveSchema};
    use crate::graph::NodeKey;

    #[test]
    fn test_rule_direction() {
        let config = CopyConfig::from_yaml(
            r#"
tables:
  - id: page
    properties: { root: true }
    references:
      - { target: template }
  - id: template
"#,
        )
        .unwrap();
        let live = LiveSchema::new()
            .with_table("page", ["id", "template_id"])
            .with_table("template", ["id"]);
        let tables =
            Tables::load_and_validate(&config, &live, &ExtensionCatalog::with_builtins()).unwrap();
        let page = tables.by_id("page").unwrap();
        let reference = page.references()[0].as_ref();
        let node = ObjectNode::new(NodeKey::new(page.idx(), 1), 0, None);

        let forward_only = RuleRestrictor::default().deny("page", "template_id", Direction::Forward);
        assert!(forward_only.is_restricted(&tables, reference, &node, false));
        assert!(!forward_only.is_restricted(&tables, reference, &node, true));

        let both = RuleRestrictor::default().deny("page", "template_id", Direction::Both);
        assert!(both.is_restricted(&tables, reference, &node, true));

        let other = RuleRestrictor::default().deny("template", "template_id", Direction::Both);
        assert!(!other.is_restricted(&tables, reference, &node, false));
    }
}
