//! Storage capability consumed by the copy engine.
//!
//! The engine itself never talks to a database. A [`Storage`] implementation
//! provides the three primitive operations the copy needs (read by filter,
//! insert returning a new identity, update by filter) plus the transaction
//! bracket owned by the driving process. Controllers such as
//! [`StorageController`](crate::controller::StorageController) build the
//! richer [`CopyController`](crate::controller::CopyController) contract on
//! top of it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::value::{Row, Value};

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values)`
    In { column: String, values: Vec<Value> },
}

impl Condition {
    /// Column the condition applies to.
    pub fn column(&self) -> &str {
        match self {
            Condition::Eq { column, .. } | Condition::In { column, .. } => column,
        }
    }

    /// Evaluate the condition against a row. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        match self {
            Condition::Eq { value, .. } => actual.matches(value),
            Condition::In { values, .. } => values.iter().any(|v| actual.matches(v)),
        }
    }
}

/// Conjunction of conditions used to select rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// Create an empty filter (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column = value` condition.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Add a `column IN (values)` condition.
    #[must_use]
    pub fn is_in<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a row.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Tabular read/insert/update capability within an ambient transaction.
///
/// Every call is a blocking round trip from the caller's point of view; the
/// engine awaits each one before issuing the next.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Physical columns of a table, or `None` if the table does not exist.
    async fn columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    /// Read rows matching `filter`.
    ///
    /// When `columns` is given only those columns are returned; otherwise the
    /// full row is returned.
    async fn select(
        &self,
        table: &str,
        columns: Option<&[String]>,
        filter: &Filter,
    ) -> Result<Vec<Row>>;

    /// Insert a row.
    ///
    /// If `id_column` is given the storage assigns a fresh identity to that
    /// column and returns it.
    async fn insert(&self, table: &str, row: Row, id_column: Option<&str>) -> Result<Option<i64>>;

    /// Update all rows matching `filter`, returning the number of rows touched.
    async fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<u64>;

    /// Open the ambient transaction.
    async fn begin(&self) -> Result<()>;

    /// Commit the ambient transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the ambient transaction.
    async fn rollback(&self) -> Result<()>;

    /// Get the storage type identifier (e.g., "memory").
    fn storage_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::row;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&row([("id", 1)])));
    }

    #[test]
    fn test_filter_conjunction() {
        let filter = Filter::new().eq("folder_id", 2).is_in("group_id", [8, 9]);
        assert!(filter.matches(&row([("folder_id", 2), ("group_id", 9)])));
        assert!(!filter.matches(&row([("folder_id", 2), ("group_id", 7)])));
        assert!(!filter.matches(&row([("group_id", 9)])));
    }

    #[test]
    fn test_filter_matches_textual_ids() {
        let filter = Filter::new().eq("obj_id", 12);
        assert!(filter.matches(&row([("obj_id", "12")])));
    }
}
