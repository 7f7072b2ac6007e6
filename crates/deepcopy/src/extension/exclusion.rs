//! Exclusion policies.

use std::collections::HashMap;
use std::fmt;

use crate::config::ExclusionRule;
use crate::controller::Exclusion;
use crate::core::ObjectId;

/// Decides whether a row takes part in the copy.
pub trait ExclusionPolicy: Send + Sync + fmt::Debug {
    fn exclusion(&self, table: &str, id: &ObjectId) -> Exclusion;
}

/// Fixed per-table id lists, built from `copy.exclusions`.
#[derive(Debug, Clone, Default)]
pub struct StaticExclusions {
    rules: HashMap<String, HashMap<i64, Exclusion>>,
}

impl StaticExclusions {
    pub fn from_config(rules: &[ExclusionRule]) -> Self {
        let mut exclusions = Self::default();
        for rule in rules {
            for id in &rule.ids {
                exclusions.add(&rule.table, *id, rule.mode.into());
            }
        }
        exclusions
    }

    pub fn add(&mut self, table: &str, id: i64, exclusion: Exclusion) {
        self.rules
            .entry(table.to_string())
            .or_default()
            .insert(id, exclusion);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ExclusionPolicy for StaticExclusions {
    fn exclusion(&self, table: &str, id: &ObjectId) -> Exclusion {
        id.as_single()
            .and_then(|id| self.rules.get(table)?.get(&id).copied())
            .unwrap_or(Exclusion::NotExcluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExclusionMode;

    #[test]
    fn test_from_config() {
        let exclusions = StaticExclusions::from_config(&[
            ExclusionRule {
                table: "page".into(),
                ids: vec![7, 8],
                mode: ExclusionMode::Placeholder,
            },
            ExclusionRule {
                table: "folder".into(),
                ids: vec![3],
                mode: ExclusionMode::Drop,
            },
        ]);
        assert_eq!(exclusions.exclusion("page", &ObjectId::Single(7)), Exclusion::Placeholder);
        assert_eq!(exclusions.exclusion("folder", &ObjectId::Single(3)), Exclusion::Drop);
        assert_eq!(exclusions.exclusion("folder", &ObjectId::Single(7)), Exclusion::NotExcluded);
        assert_eq!(
            exclusions.exclusion("page", &ObjectId::Composite(vec![7, 1])),
            Exclusion::NotExcluded
        );
    }
}
