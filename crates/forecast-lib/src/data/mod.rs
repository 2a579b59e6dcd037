//! Data access against the external storage collaborator
//!
//! This module provides:
//! - The `StorageClient` seam for tabular reads
//! - A PostgREST-style REST client and an in-memory store
//! - `DataAccess::fetch` with shape validation and a bounded timeout
//! - The missing-value cleaning policy applied once at this boundary

mod dataset;
mod memory;
mod rest;

pub use dataset::Dataset;
pub use memory::InMemoryStorage;
pub use rest::{RestStorageClient, RestStorageConfig};

use crate::error::{ForecastError, Result};
use crate::models::Row;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Default deadline for one storage read
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Tabular read operation offered by the storage backend
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Return the requested columns of every row in `table`, ordered
    /// ascending by `order_by` when given
    async fn select(&self, table: &str, columns: &[String], order_by: Option<&str>)
        -> Result<Vec<Row>>;
}

/// Fetches validated datasets through an explicitly passed storage handle
#[derive(Clone)]
pub struct DataAccess {
    client: Arc<dyn StorageClient>,
    timeout: Duration,
}

impl DataAccess {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch `table` and validate that every feature and target key exists
    ///
    /// The first feature key is the period. Rows come back sorted ascending
    /// by period with missing and infinite numbers normalized to zero.
    pub async fn fetch(
        &self,
        table: &str,
        feature_keys: &[&str],
        target_keys: &[&str],
    ) -> Result<Dataset> {
        if feature_keys.is_empty() || target_keys.is_empty() {
            return Err(ForecastError::schema_mismatch(
                table,
                "feature and target key sets must be non-empty",
            ));
        }

        let mut columns: Vec<String> = Vec::with_capacity(feature_keys.len() + target_keys.len());
        for key in feature_keys.iter().chain(target_keys.iter()) {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_string());
            }
        }

        let start = Instant::now();
        let rows = match tokio::time::timeout(
            self.timeout,
            self.client.select(table, &columns, Some(feature_keys[0])),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(table = %table, timeout_ms = self.timeout.as_millis() as u64, "Storage read timed out");
                return Err(ForecastError::StorageTimeout {
                    table: table.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let rows = prepare_rows(table, rows, &columns)?;

        debug!(
            table = %table,
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched dataset"
        );

        Dataset::from_rows(
            table,
            feature_keys[0],
            target_keys.iter().map(|k| k.to_string()).collect(),
            rows,
        )
    }
}

/// Validate that every column in `columns` occurs in `rows`, then clean them
///
/// Zero rows is `DataUnavailable`; a column absent from every row is
/// `SchemaMismatch`.
pub fn prepare_rows(table: &str, rows: Vec<Row>, columns: &[String]) -> Result<Vec<Row>> {
    if rows.is_empty() {
        return Err(ForecastError::data_unavailable(table, "zero rows returned"));
    }

    let present: HashSet<&str> = rows
        .iter()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    let missing: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !present.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(ForecastError::schema_mismatch(
            table,
            format!("missing columns {:?}", missing),
        ));
    }

    Ok(rows
        .into_iter()
        .map(|row| normalize_missing(row, columns))
        .collect())
}

/// Missing-value cleaning policy
///
/// Every key in `required` is present in the result. Absent and null values
/// become `0`, as do numeric strings that parse to an infinite or NaN value.
/// Finite numeric strings become numbers; other strings (category labels)
/// are kept untouched.
pub fn normalize_missing(mut row: Row, required: &[String]) -> Row {
    for key in required {
        row.entry(key.clone()).or_insert(Value::Null);
    }

    for value in row.values_mut() {
        let cleaned = match &*value {
            Value::Null => Some(zero()),
            Value::Number(n) => match n.as_f64() {
                Some(v) if !v.is_finite() => Some(zero()),
                _ => None,
            },
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Number::from_f64(v).map(Value::Number),
                Ok(_) => Some(zero()),
                Err(_) => None,
            },
            _ => None,
        };
        if let Some(cleaned) = cleaned {
            *value = cleaned;
        }
    }
    row
}

fn zero() -> Value {
    Value::Number(Number::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn table_rows() -> Vec<Row> {
        vec![
            row(json!({"id_tahun": 2022, "jumlah_penduduk": 1100, "laki_laki": 550})),
            row(json!({"id_tahun": 2020, "jumlah_penduduk": 1000, "laki_laki": null})),
            row(json!({"id_tahun": 2021, "jumlah_penduduk": "1050", "laki_laki": "inf"})),
        ]
    }

    #[test]
    fn test_normalize_missing_zero_fills() {
        let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let cleaned = normalize_missing(row(json!({"a": null, "c": "-Infinity", "d": "60+"})), &required);

        assert_eq!(cleaned["a"].as_f64(), Some(0.0));
        assert_eq!(cleaned["b"].as_f64(), Some(0.0));
        assert_eq!(cleaned["c"].as_f64(), Some(0.0));
        assert_eq!(cleaned["d"], json!("60+"));
    }

    #[test]
    fn test_normalize_missing_parses_numeric_strings() {
        let cleaned = normalize_missing(row(json!({"v": " 12.5 ", "nan": "NaN"})), &[]);
        assert_eq!(cleaned["v"].as_f64(), Some(12.5));
        assert_eq!(cleaned["nan"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn test_fetch_sorts_and_cleans() {
        let storage = InMemoryStorage::new().with_table("penduduk_tahunan", table_rows());
        let access = DataAccess::new(Arc::new(storage));

        let dataset = access
            .fetch("penduduk_tahunan", &["id_tahun"], &["jumlah_penduduk", "laki_laki"])
            .await
            .unwrap();

        assert_eq!(dataset.periods(), vec![2020, 2021, 2022]);
        let males = dataset.series("laki_laki").unwrap();
        assert_eq!(males.values(), vec![0.0, 0.0, 550.0]);
        let total = dataset.series("jumlah_penduduk").unwrap();
        assert_eq!(total.values(), vec![1000.0, 1050.0, 1100.0]);
    }

    #[tokio::test]
    async fn test_fetch_missing_table_is_unavailable() {
        let access = DataAccess::new(Arc::new(InMemoryStorage::new()));
        let err = access.fetch("migrasi", &["id_tahun"], &["migrasi_masuk"]).await.unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_empty_table_is_unavailable() {
        let storage = InMemoryStorage::new().with_table("migrasi", Vec::new());
        let access = DataAccess::new(Arc::new(storage));
        let err = access.fetch("migrasi", &["id_tahun"], &["migrasi_masuk"]).await.unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_missing_column_is_schema_mismatch() {
        let storage = InMemoryStorage::new().with_table("penduduk_tahunan", table_rows());
        let access = DataAccess::new(Arc::new(storage));
        let err = access
            .fetch("penduduk_tahunan", &["id_tahun"], &["perempuan"])
            .await
            .unwrap_err();
        match err {
            ForecastError::SchemaMismatch { reason, .. } => assert!(reason.contains("perempuan")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_key_sets() {
        let storage = InMemoryStorage::new().with_table("penduduk_tahunan", table_rows());
        let access = DataAccess::new(Arc::new(storage));
        let err = access.fetch("penduduk_tahunan", &["id_tahun"], &[]).await.unwrap_err();
        assert!(matches!(err, ForecastError::SchemaMismatch { .. }));
    }

    struct StalledStorage;

    #[async_trait]
    impl StorageClient for StalledStorage {
        async fn select(&self, _: &str, _: &[String], _: Option<&str>) -> Result<Vec<Row>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let access = DataAccess::new(Arc::new(StalledStorage)).with_timeout(Duration::from_millis(20));
        let err = access.fetch("keluarga", &["id_tahun"], &["pria"]).await.unwrap_err();
        assert!(matches!(err, ForecastError::StorageTimeout { .. }));
    }
}
