//! In-memory storage backend
//!
//! Holds whole tables in memory. Used for offline runs from a JSON
//! snapshot (`{ "table": [ {row}, ... ] }`) and as a test double.

use super::{async_trait, StorageClient};
use crate::error::{ForecastError, Result};
use crate::models::Row;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(table, rows);
        self
    }

    /// Replace the contents of a table
    pub fn insert_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(table.into(), rows);
        }
    }

    /// Drop the rows of `table` matching `predicate`
    pub fn delete_where<F>(&self, table: &str, predicate: F) -> usize
    where
        F: Fn(&Row) -> bool,
    {
        let Ok(mut tables) = self.tables.write() else {
            return 0;
        };
        match tables.get_mut(table) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|row| !predicate(row));
                before - rows.len()
            }
            None => 0,
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Parse a snapshot document mapping table names to arrays of rows
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: HashMap<String, Vec<Value>> = serde_json::from_str(json)
            .map_err(|e| ForecastError::storage("<snapshot>", format!("invalid snapshot: {}", e)))?;

        let storage = Self::new();
        for (table, values) in document {
            let mut rows = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Object(row) => rows.push(row),
                    other => {
                        return Err(ForecastError::storage(
                            &table,
                            format!("snapshot row is not an object: {}", other),
                        ))
                    }
                }
            }
            storage.insert_table(table, rows);
        }
        Ok(storage)
    }

    /// Load a snapshot file from disk
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::storage("<snapshot>", format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn select(
        &self,
        table: &str,
        columns: &[String],
        order_by: Option<&str>,
    ) -> Result<Vec<Row>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| ForecastError::storage(table, format!("lock poisoned: {}", e)))?;
        let rows = tables
            .get(table)
            .ok_or_else(|| ForecastError::data_unavailable(table, "table does not exist"))?;

        let mut selected: Vec<Row> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|(key, _)| columns.iter().any(|c| c == *key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect();

        if let Some(key) = order_by {
            selected.sort_by(|a, b| {
                let a = a.get(key).and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
                let b = b.get(key).and_then(Value::as_f64).unwrap_or(f64::NEG_INFINITY);
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        Ok(selected)
    }
}
