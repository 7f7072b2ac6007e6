//! Structural configuration validation.

use std::collections::HashSet;

use super::CopyConfig;
use crate::error::{CopyError, Result};

/// Validate the configuration structure.
pub fn validate(config: &CopyConfig) -> Result<()> {
    if config.tables.is_empty() {
        return Err(CopyError::Config("at least one table is required".into()));
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if table.id.trim().is_empty() {
            return Err(CopyError::Config("table id must not be empty".into()));
        }
        if !seen.insert(table.id.as_str()) {
            return Err(CopyError::Config(format!(
                "table id '{}' is declared more than once",
                table.id
            )));
        }

        if table.cross && table.id_columns.is_empty() {
            return Err(CopyError::Config(format!(
                "cross table '{}' requires id_columns",
                table.id
            )));
        }
        if !table.cross && !table.id_columns.is_empty() {
            return Err(CopyError::Config(format!(
                "table '{}' declares id_columns but is not a cross table",
                table.id
            )));
        }

        for (i, reference) in table.references.iter().enumerate() {
            if reference.target.is_none() && reference.resolver.is_none() {
                return Err(CopyError::Config(format!(
                    "reference #{} of table '{}' has neither a target nor a resolver",
                    i + 1,
                    table.id
                )));
            }
            if reference.link_column().is_none() {
                return Err(CopyError::Config(format!(
                    "reference #{} of table '{}' needs a column",
                    i + 1,
                    table.id
                )));
            }
        }

        for modifier in &table.modifiers {
            if modifier.kind.trim().is_empty() {
                return Err(CopyError::Config(format!(
                    "modifier of table '{}' has no type",
                    table.id
                )));
            }
        }
    }

    if config.copy.max_depth == 0 {
        return Err(CopyError::Config("copy.max_depth must be at least 1".into()));
    }

    for rule in &config.copy.exclusions {
        if !seen.contains(rule.table.as_str()) {
            return Err(CopyError::Config(format!(
                "exclusion refers to unknown table '{}'",
                rule.table
            )));
        }
    }
    for rule in &config.copy.restrictions {
        if !seen.contains(rule.table.as_str()) {
            return Err(CopyError::Config(format!(
                "restriction refers to unknown table '{}'",
                rule.table
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CopySettings, ReferenceConfig, RestrictionRule, TableConfig};

    fn table(id: &str) -> TableConfig {
        TableConfig {
            id: id.to_string(),
            name: None,
            id_column: None,
            id_columns: Vec::new(),
            cross: false,
            references: Vec::new(),
            modifiers: Vec::new(),
            properties: Default::default(),
        }
    }

    fn valid_config() -> CopyConfig {
        let mut page = table("page");
        page.references.push(ReferenceConfig {
            target: Some("folder".into()),
            ..Default::default()
        });
        CopyConfig {
            tables: vec![table("folder"), page],
            copy: CopySettings::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_tables() {
        let config = CopyConfig {
            tables: Vec::new(),
            copy: CopySettings::default(),
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_table_id() {
        let mut config = valid_config();
        config.tables.push(table("page"));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_cross_table_needs_id_columns() {
        let mut config = valid_config();
        let mut perm = table("folder_perm");
        perm.cross = true;
        config.tables.push(perm);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_reference_without_target_or_resolver() {
        let mut config = valid_config();
        config.tables[0].references.push(ReferenceConfig {
            column: Some("x_id".into()),
            ..Default::default()
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_resolver_reference_needs_column() {
        let mut config = valid_config();
        config.tables[0].references.push(ReferenceConfig {
            resolver: Some("typed".into()),
            ..Default::default()
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_max_depth() {
        let mut config = valid_config();
        config.copy.max_depth = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_restriction_on_unknown_table() {
        let mut config = valid_config();
        config.copy.restrictions.push(RestrictionRule {
            table: "template".into(),
            column: "x".into(),
            direction: Default::default(),
        });
        assert!(validate(&config).is_err());
    }
}
