//! One forecasting session: fetch, train, predict, report
//!
//! Every (target column, cohort) series of an indicator gets its own model,
//! trained on the blocking thread pool. Series share no state, so they are
//! spawned together and joined in catalog order. The first failure ends
//! the session.

use crate::data::{DataAccess, Dataset};
use crate::engine::{CacheKey, CachedModel, ForecastEngine, ModelCache};
use crate::error::{ForecastError, Result};
use crate::indicators::{self, Indicator};
use crate::models::{Cohort, Series};
use crate::observability::{ForecastMetrics, StructuredLogger};
use crate::report::{ForecastReport, SeriesForecast};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

/// Label of the derived all-cohort sum of a target
pub const ALL_COHORTS: &str = "all";

pub struct ForecastSession {
    access: DataAccess,
    engine: Arc<ForecastEngine>,
    cache: Option<Arc<ModelCache>>,
    metrics: ForecastMetrics,
    logger: StructuredLogger,
    sum_cohorts: bool,
}

struct TrainedSeries {
    series: Series,
    model: CachedModel,
    cached: bool,
}

impl ForecastSession {
    pub fn new(access: DataAccess, engine: ForecastEngine) -> Self {
        Self {
            access,
            engine: Arc::new(engine),
            cache: None,
            metrics: ForecastMetrics::new(),
            logger: StructuredLogger::new("storage"),
            sum_cohorts: false,
        }
    }

    /// Reuse models across sessions built with the same engine configuration
    pub fn with_cache(mut self, cache: Arc<ModelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Append a derived per-target sum over cohorts to cohort reports
    pub fn with_cohort_sums(mut self, enabled: bool) -> Self {
        self.sum_cohorts = enabled;
        self
    }

    pub fn engine(&self) -> &ForecastEngine {
        &self.engine
    }

    /// Run a session for an indicator looked up by name or table
    pub async fn run_named(&self, name: &str, horizon: usize) -> Result<ForecastReport> {
        let indicator = indicators::find(name)
            .ok_or_else(|| ForecastError::data_unavailable(name, "unknown indicator"))?;
        self.run(indicator, horizon).await
    }

    pub async fn run(&self, indicator: &Indicator, horizon: usize) -> Result<ForecastReport> {
        let start = Instant::now();
        let params = self.engine.params();
        self.logger
            .log_session_start(indicator.name, indicator.table, horizon, params.kernel.name());

        let dataset = self.fetch(indicator).await?;
        let series = collect_series(indicator, &dataset)?;
        debug!(indicator = indicator.name, series = series.len(), "Extracted series");

        let handles: Vec<(String, JoinHandle<Result<TrainedSeries>>)> = series
            .into_iter()
            .map(|s| {
                let label = s.label();
                let key = CacheKey {
                    table: indicator.table.to_string(),
                    target: s.indicator.clone(),
                    cohort: s.cohort,
                    max_period: s.last().map(|o| o.period).unwrap_or_default(),
                    rows: s.len(),
                };
                let engine = Arc::clone(&self.engine);
                let cache = self.cache.clone();
                let metrics = self.metrics.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    train_series(&engine, cache.as_deref(), &metrics, key, s)
                });
                (label, handle)
            })
            .collect();

        let mut report = ForecastReport::new(
            indicator.name,
            indicator.table,
            horizon,
            params.kernel.name(),
            self.engine.config().evaluation,
        );

        for (label, handle) in handles {
            let trained = join(label, handle).await?;
            let (model, metrics) = &*trained.model;

            self.logger.log_model_trained(
                &trained.series.label(),
                model.n_observations(),
                metrics.mae,
                metrics.r2,
                &metrics.mode.to_string(),
                trained.cached,
            );

            let periods = ForecastEngine::future_periods(model, horizon);
            let predictions = if indicator.monotonic {
                self.engine.predict(model, &periods)
            } else {
                self.engine.predict_raw(model, &periods)
            };
            self.metrics.add_repairs(predictions.repairs);
            self.logger.log_forecast(
                &trained.series.label(),
                periods.first().copied(),
                predictions.len(),
                predictions.repairs,
            );

            report.push(SeriesForecast::new(
                trained.series.indicator.clone(),
                trained.series.cohort,
                *metrics,
                &trained.series.observations,
                &predictions,
            ));
        }

        if self.sum_cohorts && indicator.cohort_key.is_some() {
            add_cohort_sums(&mut report, indicator);
        }

        self.logger.log_session_finished(
            indicator.name,
            report.series.len(),
            start.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    async fn fetch(&self, indicator: &Indicator) -> Result<Dataset> {
        let start = Instant::now();
        let result = self
            .access
            .fetch(indicator.table, &indicator.feature_keys(), indicator.targets)
            .await;
        self.metrics.observe_fetch_latency(start.elapsed().as_secs_f64());

        result.map_err(|e| {
            self.metrics.inc_fetch_errors(e.kind());
            self.logger
                .log_fetch_failed(indicator.table, e.kind(), &e.to_string());
            e
        })
    }
}

/// Split a dataset into one series per target, and per cohort when partitioned
fn collect_series(indicator: &Indicator, dataset: &Dataset) -> Result<Vec<Series>> {
    let mut series = Vec::new();
    match indicator.cohort_key {
        Some(cohort_key) => {
            for cohort in dataset.cohorts(cohort_key)? {
                for target in indicator.targets {
                    series.push(dataset.cohort_series(cohort_key, cohort, target)?);
                }
            }
        }
        None => {
            for target in indicator.targets {
                series.push(dataset.series(target)?);
            }
        }
    }
    Ok(series)
}

fn train_series(
    engine: &ForecastEngine,
    cache: Option<&ModelCache>,
    metrics: &ForecastMetrics,
    key: CacheKey,
    series: Series,
) -> Result<TrainedSeries> {
    let start = Instant::now();
    let mut trained = false;
    let model = match cache {
        Some(cache) => cache.get_or_train(key, || {
            trained = true;
            engine.train(&series)
        })?,
        None => {
            trained = true;
            let (model, scores) = engine.train(&series)?;
            Arc::new((model, scores))
        }
    };

    if trained {
        metrics.observe_training_latency(start.elapsed().as_secs_f64());
        metrics.inc_models_trained();
    } else {
        metrics.inc_cache_hits();
    }

    Ok(TrainedSeries {
        series,
        model,
        cached: !trained,
    })
}

async fn join(label: String, handle: JoinHandle<Result<TrainedSeries>>) -> Result<TrainedSeries> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(ForecastError::TrainingAborted {
            series: label,
            reason: e.to_string(),
        }),
    }
}

/// Per target, sum the cohort forecasts into a derived `target [all]` series
fn add_cohort_sums(report: &mut ForecastReport, indicator: &Indicator) {
    let cohorts: Vec<Cohort> = {
        let mut seen = Vec::new();
        for s in &report.series {
            if let Some(c) = s.cohort {
                if !seen.contains(&c) {
                    seen.push(c);
                }
            }
        }
        seen
    };

    for target in indicator.targets {
        let labels: Vec<String> = cohorts.iter().map(|c| format!("{} [{}]", target, c)).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        let label = format!("{} [{}]", target, ALL_COHORTS);
        if !report.sum_series(&refs, label.clone()) {
            debug!(series = %label, "Cohort periods disagree, skipping derived sum");
        }
    }
}
