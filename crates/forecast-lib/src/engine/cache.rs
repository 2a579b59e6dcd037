//! Cache of fitted models across forecasting sessions
//!
//! Entries are keyed by the shape of the data they were trained on. New rows
//! change the row count or the latest period, so stale models are simply
//! never looked up again. A cache must only be shared by sessions using the
//! same engine configuration.

use super::FittedModel;
use crate::error::Result;
use crate::models::{Cohort, EvaluationMetrics};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identity of the data a model was trained on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub table: String,
    pub target: String,
    pub cohort: Option<Cohort>,
    pub max_period: i32,
    pub rows: usize,
}

/// A cached model together with the metrics computed when it was trained
pub type CachedModel = Arc<(FittedModel, EvaluationMetrics)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct ModelCache {
    entries: DashMap<CacheKey, CachedModel>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedModel> {
        let entry = self.entries.get(key).map(|e| Arc::clone(e.value()));
        match entry {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        entry
    }

    pub fn insert(&self, key: CacheKey, model: FittedModel, metrics: EvaluationMetrics) -> CachedModel {
        let cached = Arc::new((model, metrics));
        self.entries.insert(key, Arc::clone(&cached));
        cached
    }

    /// Return the cached model for `key`, training and storing it on a miss
    ///
    /// Training runs outside any map lock; concurrent misses on one key may
    /// both train, and the last insert wins.
    pub fn get_or_train<F>(&self, key: CacheKey, train: F) -> Result<CachedModel>
    where
        F: FnOnce() -> Result<(FittedModel, EvaluationMetrics)>,
    {
        if let Some(cached) = self.get(&key) {
            debug!(table = %key.table, target = %key.target, "Model cache hit");
            return Ok(cached);
        }
        let (model, metrics) = train()?;
        Ok(self.insert(key, model, metrics))
    }

    /// Drop every entry trained on `table`; returns the number removed
    pub fn invalidate_table(&self, table: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.table != table);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ForecastEngine;
    use crate::error::ForecastError;
    use crate::models::Series;

    fn key(table: &str, max_period: i32, rows: usize) -> CacheKey {
        CacheKey {
            table: table.to_string(),
            target: "jumlah_penduduk".to_string(),
            cohort: None,
            max_period,
            rows,
        }
    }

    fn train() -> Result<(FittedModel, EvaluationMetrics)> {
        let series = Series::from_pairs("jumlah_penduduk", &[(2020, 1.0), (2021, 2.0)]);
        ForecastEngine::default().train(&series)
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = ModelCache::new();
        let first = cache.get_or_train(key("penduduk_tahunan", 2021, 2), train).unwrap();
        let second = cache
            .get_or_train(key("penduduk_tahunan", 2021, 2), || panic!("should not retrain"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_new_data_misses() {
        let cache = ModelCache::new();
        cache.get_or_train(key("penduduk_tahunan", 2021, 2), train).unwrap();
        cache.get_or_train(key("penduduk_tahunan", 2022, 3), train).unwrap();
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_training_failure_is_not_cached() {
        let cache = ModelCache::new();
        let err = cache
            .get_or_train(key("migrasi", 2021, 1), || {
                Err(ForecastError::InsufficientData {
                    distinct_periods: 1,
                    required: 2,
                })
            })
            .unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_table() {
        let cache = ModelCache::new();
        cache.get_or_train(key("penduduk_tahunan", 2021, 2), train).unwrap();
        cache.get_or_train(key("migrasi", 2021, 2), train).unwrap();

        assert_eq!(cache.invalidate_table("migrasi"), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("penduduk_tahunan", 2021, 2)).is_some());
    }
}
