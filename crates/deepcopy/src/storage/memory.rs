//! In-memory tabular storage.
//!
//! Backs the CLI (loaded from and saved to a JSON snapshot) and the tests.
//! Transactions are whole-dataset snapshots: `begin` clones the data,
//! `rollback` restores the clone.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Filter, Row, Storage, Value};
use crate::error::{CopyError, Result};

/// One table: its columns, rows and identity sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTable {
    pub columns: Vec<String>,

    #[serde(default)]
    pub rows: Vec<Row>,

    /// Next generated identity (default: highest existing id + 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<i64>,
}

impl MemoryTable {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn check_columns<'a>(&self, table: &str, columns: impl Iterator<Item = &'a String>) -> Result<()> {
        for column in columns {
            if !self.has_column(column) {
                return Err(CopyError::storage(format!(
                    "column '{}' does not exist in '{}'",
                    column, table
                )));
            }
        }
        Ok(())
    }

    fn generate_id(&mut self, id_column: &str) -> i64 {
        let id = self.next_id.unwrap_or_else(|| {
            self.rows
                .iter()
                .filter_map(|r| r.get(id_column).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1
        });
        self.next_id = Some(id + 1);
        id
    }
}

/// The whole stored dataset, as serialized to JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub tables: BTreeMap<String, MemoryTable>,
}

#[derive(Debug, Default)]
struct State {
    data: Dataset,
    snapshot: Option<Dataset>,
}

/// Thread-safe in-memory [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(data: Dataset) -> Self {
        Self {
            state: Mutex::new(State {
                data,
                snapshot: None,
            }),
        }
    }

    /// Load a dataset from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let data: Dataset = serde_json::from_str(&content)?;
        Ok(Self::from_dataset(data))
    }

    /// Save the committed dataset to a JSON file (atomic write).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.dataset()?)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Add a table with no rows, replacing any existing one.
    #[must_use]
    pub fn with_table<I, S>(self, name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut state) = self.state.lock() {
            state.data.tables.insert(
                name.to_string(),
                MemoryTable {
                    columns: columns.into_iter().map(Into::into).collect(),
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Append rows to a table as-is, without generating identities.
    #[must_use]
    pub fn with_rows(self, name: &str, rows: impl IntoIterator<Item = Row>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            if let Some(table) = state.data.tables.get_mut(name) {
                table.rows.extend(rows);
            }
        }
        self
    }

    /// Set the next generated identity of a table.
    #[must_use]
    pub fn with_next_id(self, name: &str, next_id: i64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            if let Some(table) = state.data.tables.get_mut(name) {
                table.next_id = Some(next_id);
            }
        }
        self
    }

    /// A copy of the current data.
    pub fn dataset(&self) -> Result<Dataset> {
        Ok(self.lock()?.data.clone())
    }

    /// All rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self
            .lock()?
            .data
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default())
    }

    pub fn in_transaction(&self) -> Result<bool> {
        Ok(self.lock()?.snapshot.is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| CopyError::storage("memory storage lock poisoned"))
    }
}

fn missing_table(table: &str) -> CopyError {
    CopyError::storage(format!("table '{}' does not exist", table))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        Ok(self.lock()?.data.tables.get(table).map(|t| t.columns.clone()))
    }

    async fn select(
        &self,
        table: &str,
        columns: Option<&[String]>,
        filter: &Filter,
    ) -> Result<Vec<Row>> {
        let state = self.lock()?;
        let data = state.data.tables.get(table).ok_or_else(|| missing_table(table))?;
        if let Some(columns) = columns {
            data.check_columns(table, columns.iter())?;
        }

        let rows = data
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .map(|row| match columns {
                Some(columns) => columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or_default()))
                    .collect(),
                None => row.clone(),
            })
            .collect();
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row, id_column: Option<&str>) -> Result<Option<i64>> {
        let mut state = self.lock()?;
        let data = state
            .data
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        data.check_columns(table, row.keys())?;

        let new_id = match id_column {
            Some(id_column) => {
                let id = data.generate_id(id_column);
                row.insert(id_column.to_string(), Value::Int(id));
                Some(id)
            }
            None => None,
        };
        for column in &data.columns {
            row.entry(column.clone()).or_default();
        }
        data.rows.push(row);

        debug!("insert into {} -> {:?}", table, new_id);
        Ok(new_id)
    }

    async fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<u64> {
        let mut state = self.lock()?;
        let data = state
            .data
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        data.check_columns(table, values.keys())?;

        let mut touched = 0;
        for row in data.rows.iter_mut().filter(|row| filter.matches(row)) {
            for (column, value) in values {
                row.insert(column.clone(), value.clone());
            }
            touched += 1;
        }
        Ok(touched)
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.snapshot.is_some() {
            return Err(CopyError::storage("a transaction is already open"));
        }
        state.snapshot = Some(state.data.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.snapshot.take().is_none() {
            return Err(CopyError::storage("no transaction to commit"));
        }
        Ok(())
    }

    /// Restore the snapshot taken by `begin`. A no-op outside a transaction.
    async fn rollback(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(snapshot) = state.snapshot.take() {
            state.data = snapshot;
        }
        Ok(())
    }

    fn storage_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row;

    fn storage() -> MemoryStorage {
        MemoryStorage::new()
            .with_table("folder", ["id", "mother_id", "name"])
            .with_rows(
                "folder",
                [
                    row([("id", Value::Int(1)), ("mother_id", Value::Int(0)), ("name", "root".into())]),
                    row([("id", Value::Int(2)), ("mother_id", Value::Int(1)), ("name", "sub".into())]),
                ],
            )
    }

    #[tokio::test]
    async fn test_select_projects_and_filters() {
        let storage = storage();
        let columns = vec!["id".to_string(), "mother_id".to_string()];
        let rows = storage
            .select("folder", Some(columns.as_slice()), &Filter::new().eq("mother_id", 1))
            .await
            .unwrap();
        assert_eq!(rows, vec![row([("id", 2), ("mother_id", 1)])]);

        let err = storage
            .select("folder", Some(&["cdate".to_string()][..]), &Filter::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'cdate'"));
    }

    #[tokio::test]
    async fn test_insert_generates_ids() {
        let storage = storage();
        let id = storage
            .insert("folder", row([("name", "new")]), Some("id"))
            .await
            .unwrap();
        assert_eq!(id, Some(3));

        let storage = storage.with_next_id("folder", 101);
        let id = storage.insert("folder", Row::new(), Some("id")).await.unwrap();
        assert_eq!(id, Some(101));
        let rows = storage.rows("folder").unwrap();
        assert_eq!(rows.last().unwrap().get("mother_id"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let storage = storage();
        storage.begin().await.unwrap();
        storage.insert("folder", row([("name", "tmp")]), Some("id")).await.unwrap();
        storage
            .update("folder", &Filter::new().eq("id", 1), &row([("name", "renamed")]))
            .await
            .unwrap();
        assert_eq!(storage.rows("folder").unwrap().len(), 3);

        storage.rollback().await.unwrap();
        let rows = storage.rows("folder").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::from("root")));
        assert!(!storage.in_transaction().unwrap());
    }

    #[tokio::test]
    async fn test_commit_requires_transaction() {
        let storage = storage();
        assert!(storage.commit().await.is_err());
        storage.begin().await.unwrap();
        assert!(storage.begin().await.is_err());
        storage.commit().await.unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        storage().save(&path).unwrap();

        let loaded = MemoryStorage::load(&path).unwrap();
        assert_eq!(loaded.dataset().unwrap(), storage().dataset().unwrap());
        assert!(!dir.path().join("data.tmp").exists());
    }
}
