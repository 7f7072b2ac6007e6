//! Live schema snapshot used to validate the copy configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Physical columns of every table the configuration mentions, as reported
/// by the copy controller at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSchema {
    tables: BTreeMap<String, Vec<String>>,
}

impl LiveSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the columns of a physical table.
    pub fn add_table<I, S>(&mut self, name: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .insert(name.into(), columns.into_iter().map(Into::into).collect());
    }

    /// Builder-style variant of [`add_table`](Self::add_table).
    #[must_use]
    pub fn with_table<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_table(name, columns);
        self
    }

    /// Columns of a table, or `None` if the table does not exist.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .map(|cols| cols.iter().any(|c| c == column))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let live = LiveSchema::new().with_table("folder", ["id", "mother_id", "name"]);
        assert!(live.has_table("folder"));
        assert!(live.has_column("folder", "mother_id"));
        assert!(!live.has_column("folder", "template_id"));
        assert!(!live.has_column("page", "id"));
        assert_eq!(live.columns("folder").map(|c| c.len()), Some(3));
    }
}
