//! Forecast engine
//!
//! Trains one support vector regressor per series against the period
//! feature, scores it, and projects future periods under the monotonic
//! repair policy.

mod cache;
mod repair;
mod scaler;
mod svr;
mod validation;

pub use cache::{CacheKey, CacheStats, CachedModel, ModelCache};
pub use repair::{MonotonicRepair, DEFAULT_UPLIFT};
pub use scaler::StandardScaler;
pub use svr::{
    Kernel, SupportVectorRegressor, SvrParams, DEFAULT_EPSILON, DEFAULT_MAX_SWEEPS, DEFAULT_TOL,
    LINEAR_C, RBF_C, RBF_GAMMA,
};
pub use validation::{FoldScores, KFold, DEFAULT_FOLDS, DEFAULT_SEED};

use crate::config::ForecastConfig;
use crate::data::{prepare_rows, DataAccess, Dataset};
use crate::error::{ForecastError, Result};
use crate::models::{
    Cohort, EvaluationMetrics, EvaluationMode, Observation, PredictedPoint, PredictionSet, Row,
    Series,
};
use crate::report;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Minimum number of distinct periods a series needs to be trained
pub const MIN_DISTINCT_PERIODS: usize = 2;

/// A trained model for one (indicator, cohort) series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    indicator: String,
    cohort: Option<Cohort>,
    scaler: StandardScaler,
    regressor: SupportVectorRegressor,
    last_period: i32,
    last_value: f64,
    n_observations: usize,
}

impl FittedModel {
    /// Fit on observations sorted ascending by period
    fn fit(indicator: &str, cohort: Option<Cohort>, observations: &[Observation], params: &SvrParams) -> Result<Self> {
        let last = observations.last().ok_or(ForecastError::InsufficientData {
            distinct_periods: 0,
            required: MIN_DISTINCT_PERIODS,
        })?;

        let periods: Vec<f64> = observations.iter().map(|o| o.period as f64).collect();
        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();

        let scaler = StandardScaler::fit(&periods);
        let x = scaler.transform_all(&periods);
        let regressor = SupportVectorRegressor::fit(&x, &values, params);

        Ok(Self {
            indicator: indicator.to_string(),
            cohort,
            scaler,
            regressor,
            last_period: last.period,
            last_value: last.value,
            n_observations: observations.len(),
        })
    }

    /// Raw model output for one period, before any repair
    pub fn evaluate(&self, period: i32) -> f64 {
        self.regressor.predict(self.scaler.transform(period as f64))
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn cohort(&self) -> Option<Cohort> {
        self.cohort
    }

    pub fn label(&self) -> String {
        match self.cohort {
            Some(cohort) => format!("{} [{}]", self.indicator, cohort),
            None => self.indicator.clone(),
        }
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn regressor(&self) -> &SupportVectorRegressor {
        &self.regressor
    }

    pub fn last_period(&self) -> i32 {
        self.last_period
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }
}

/// Trains, scores and predicts with a fixed configuration
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    config: ForecastConfig,
    params: SvrParams,
    repair: MonotonicRepair,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        let params = config.svr_params();
        let repair = MonotonicRepair::new(config.repair_uplift);
        Self {
            config,
            params,
            repair,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn params(&self) -> &SvrParams {
        &self.params
    }

    pub fn repair_policy(&self) -> MonotonicRepair {
        self.repair
    }

    /// Train and score a model for one series
    ///
    /// Needs at least two distinct periods. The series is not modified.
    pub fn train(&self, series: &Series) -> Result<(FittedModel, EvaluationMetrics)> {
        let distinct_periods = series.distinct_periods();
        if distinct_periods < MIN_DISTINCT_PERIODS {
            return Err(ForecastError::InsufficientData {
                distinct_periods,
                required: MIN_DISTINCT_PERIODS,
            });
        }

        let start = Instant::now();
        let mut observations = series.observations.clone();
        observations.sort_by_key(|o| o.period);

        let model = FittedModel::fit(&series.indicator, series.cohort, &observations, &self.params)?;
        let metrics = match self.config.evaluation {
            EvaluationMode::InSample => self.in_sample_metrics(&model, &observations),
            EvaluationMode::CrossValidated => self.cross_validated_metrics(&model, series, &observations)?,
        };

        debug!(
            series = %series.label(),
            observations = observations.len(),
            kernel = self.params.kernel.name(),
            support_vectors = model.regressor.n_support(),
            mae = metrics.mae,
            r2 = metrics.r2,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Trained model"
        );

        Ok((model, metrics))
    }

    /// Train on one column of a fetched dataset
    ///
    /// `feature_key` must be the dataset's period column.
    pub fn train_dataset(
        &self,
        dataset: &Dataset,
        feature_key: &str,
        target_key: &str,
    ) -> Result<(FittedModel, EvaluationMetrics)> {
        if feature_key != dataset.period_key() {
            return Err(ForecastError::schema_mismatch(
                dataset.table(),
                format!(
                    "feature '{}' is not the period column '{}'",
                    feature_key,
                    dataset.period_key()
                ),
            ));
        }
        self.train(&dataset.series(target_key)?)
    }

    /// Train from raw rows already in hand
    ///
    /// The rows pass through the same validation and cleaning as a fetch.
    pub fn train_from_rows(
        &self,
        rows: Vec<Row>,
        feature_key: &str,
        target_key: &str,
    ) -> Result<(FittedModel, EvaluationMetrics)> {
        const SOURCE: &str = "<rows>";
        let columns = vec![feature_key.to_string(), target_key.to_string()];
        let rows = prepare_rows(SOURCE, rows, &columns)?;
        let dataset = Dataset::from_rows(SOURCE, feature_key, vec![target_key.to_string()], rows)?;
        self.train_dataset(&dataset, feature_key, target_key)
    }

    /// Fetch `table` through `source` and train on one column
    pub async fn train_from_source(
        &self,
        source: &DataAccess,
        table: &str,
        feature_key: &str,
        target_key: &str,
    ) -> Result<(FittedModel, EvaluationMetrics)> {
        let dataset = source.fetch(table, &[feature_key], &[target_key]).await?;
        self.train_dataset(&dataset, feature_key, target_key)
    }

    /// Predict the given periods and apply monotonic repair
    ///
    /// Periods are evaluated in ascending order. An empty request yields an
    /// empty set.
    pub fn predict(&self, model: &FittedModel, periods: &[i32]) -> PredictionSet {
        let mut set = self.predict_raw(model, periods);
        let mut values = set.values();
        set.repairs = self.repair.apply(&mut values);
        for (point, value) in set.points.iter_mut().zip(values) {
            point.value = value;
        }
        set
    }

    /// Predict the given periods without repair
    pub fn predict_raw(&self, model: &FittedModel, periods: &[i32]) -> PredictionSet {
        let mut periods = periods.to_vec();
        periods.sort_unstable();

        let points = periods
            .into_iter()
            .map(|period| PredictedPoint {
                period,
                value: model.evaluate(period),
            })
            .collect();

        PredictionSet { points, repairs: 0 }
    }

    /// The `horizon` periods following the last training period
    pub fn future_periods(model: &FittedModel, horizon: usize) -> Vec<i32> {
        (1..=horizon as i32).map(|step| model.last_period + step).collect()
    }

    fn in_sample_metrics(&self, model: &FittedModel, observations: &[Observation]) -> EvaluationMetrics {
        let actual: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let predicted = self.score_predictions(model, observations);
        report::evaluate(&actual, &predicted, EvaluationMode::InSample)
    }

    /// Mean per-fold MAE and R², MAPE from the full-data model
    fn cross_validated_metrics(
        &self,
        full_model: &FittedModel,
        series: &Series,
        observations: &[Observation],
    ) -> Result<EvaluationMetrics> {
        let kfold = KFold::new(self.config.cv_folds).with_seed(self.config.cv_seed);
        let mut scores = FoldScores::default();

        for (fold, (train_idx, mut test_idx)) in kfold.split(observations.len()).into_iter().enumerate() {
            let train: Vec<Observation> = train_idx.iter().map(|&i| observations[i]).collect();
            let train_series = Series::new(series.indicator.clone(), series.cohort, train);
            if train_series.distinct_periods() < MIN_DISTINCT_PERIODS {
                debug!(series = %series.label(), fold, "Skipping fold with too few training periods");
                continue;
            }

            let mut train = train_series.observations;
            train.sort_by_key(|o| o.period);
            test_idx.sort_unstable();
            let test: Vec<Observation> = test_idx.iter().map(|&i| observations[i]).collect();

            let model = FittedModel::fit(&series.indicator, series.cohort, &train, &self.params)?;
            let actual: Vec<f64> = test.iter().map(|o| o.value).collect();
            let predicted = self.score_predictions(&model, &test);
            scores.push(report::mae(&actual, &predicted), report::r_squared(&actual, &predicted));
        }

        if scores.is_empty() {
            warn!(
                series = %series.label(),
                observations = observations.len(),
                "No usable cross-validation fold, reporting in-sample metrics"
            );
            return Ok(self.in_sample_metrics(full_model, observations));
        }

        let actual: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let refit = self.score_predictions(full_model, observations);

        Ok(EvaluationMetrics {
            mae: scores.mean_mae(),
            mape: report::mape(&actual, &refit),
            r2: scores.mean_r2(),
            mode: EvaluationMode::CrossValidated,
        })
    }

    /// Predictions used for scoring, repaired when configured
    fn score_predictions(&self, model: &FittedModel, observations: &[Observation]) -> Vec<f64> {
        let mut predicted: Vec<f64> = observations.iter().map(|o| model.evaluate(o.period)).collect();
        if self.config.repair_in_sample {
            self.repair.apply(&mut predicted);
        }
        predicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelKind;
    use crate::data::InMemoryStorage;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn round_trip_series() -> Series {
        Series::from_pairs("jumlah_penduduk", &[(2020, 1000.0), (2021, 1050.0), (2022, 1100.0)])
    }

    fn noisy_series() -> Series {
        Series::from_pairs(
            "jumlah_penduduk",
            &[
                (2014, 812.0),
                (2015, 840.0),
                (2016, 829.0),
                (2017, 871.0),
                (2018, 902.0),
                (2019, 897.0),
                (2020, 940.0),
                (2021, 951.0),
                (2022, 989.0),
            ],
        )
    }

    #[test]
    fn test_round_trip_linear_extrapolation() {
        let engine = ForecastEngine::default();
        let (model, metrics) = engine.train(&round_trip_series()).unwrap();

        let periods = ForecastEngine::future_periods(&model, 3);
        assert_eq!(periods, vec![2023, 2024, 2025]);

        let predictions = engine.predict(&model, &periods);
        assert_eq!(predictions.repairs, 0);
        assert!(predictions.is_non_decreasing());
        assert!((predictions.points[0].value - 1150.0).abs() < 1.0);
        assert!(metrics.r2 > 0.99);
        assert_eq!(metrics.mode, EvaluationMode::InSample);
    }

    #[test]
    fn test_decreasing_data_is_repaired() {
        let series = Series::from_pairs(
            "migrasi_keluar",
            &[(2018, 500.0), (2019, 450.0), (2020, 400.0), (2021, 350.0), (2022, 300.0)],
        );
        let engine = ForecastEngine::default();
        let (model, _) = engine.train(&series).unwrap();

        let periods: Vec<i32> = (2023..2033).collect();
        let raw = engine.predict_raw(&model, &periods);
        assert!(!raw.is_non_decreasing());

        let repaired = engine.predict(&model, &periods);
        assert!(repaired.is_non_decreasing());
        assert_eq!(repaired.repairs, 9);
        assert_eq!(repaired.points[0].value, raw.points[0].value);
        assert!((repaired.points[1].value - raw.points[0].value * 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_predict_sorts_requested_periods() {
        let engine = ForecastEngine::default();
        let (model, _) = engine.train(&round_trip_series()).unwrap();
        let predictions = engine.predict(&model, &[2025, 2023, 2024]);
        assert_eq!(predictions.periods(), vec![2023, 2024, 2025]);
    }

    #[test]
    fn test_empty_period_request() {
        let engine = ForecastEngine::default();
        let (model, _) = engine.train(&round_trip_series()).unwrap();
        assert!(engine.predict(&model, &[]).is_empty());
        assert!(ForecastEngine::future_periods(&model, 0).is_empty());
    }

    #[test]
    fn test_training_is_deterministic() {
        for kernel in [KernelKind::Linear, KernelKind::Rbf] {
            let engine = ForecastEngine::new(ForecastConfig {
                kernel,
                evaluation: EvaluationMode::CrossValidated,
                ..Default::default()
            });
            let (a, metrics_a) = engine.train(&noisy_series()).unwrap();
            let (b, metrics_b) = engine.train(&noisy_series()).unwrap();

            assert_eq!(a, b);
            assert_eq!(metrics_a, metrics_b);
            assert_eq!(engine.predict(&a, &[2023, 2024]), engine.predict(&b, &[2023, 2024]));
        }
    }

    #[test]
    fn test_in_sample_metric_bounds() {
        for kernel in [KernelKind::Linear, KernelKind::Rbf] {
            let engine = ForecastEngine::new(ForecastConfig {
                kernel,
                ..Default::default()
            });
            let (_, metrics) = engine.train(&noisy_series()).unwrap();
            assert!(metrics.r2 <= 1.0);
            assert!(metrics.mape.unwrap() >= 0.0);
            assert!(metrics.mae >= 0.0);
        }
    }

    #[test]
    fn test_single_period_is_insufficient() {
        let series = Series::from_pairs("total", &[(2022, 10.0)]);
        let err = ForecastEngine::default().train(&series).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                distinct_periods: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn test_training_leaves_series_untouched() {
        let series = Series::from_pairs("total", &[(2022, 12.0), (2020, 10.0), (2021, 11.0)]);
        let before = series.clone();
        let (model, _) = ForecastEngine::default().train(&series).unwrap();
        assert_eq!(series, before);
        assert_eq!(model.last_period(), 2022);
        assert_eq!(model.last_value(), 12.0);
    }

    #[test]
    fn test_cross_validation_reports_mode() {
        let engine = ForecastEngine::new(ForecastConfig {
            evaluation: EvaluationMode::CrossValidated,
            ..Default::default()
        });
        let (_, metrics) = engine.train(&noisy_series()).unwrap();
        assert_eq!(metrics.mode, EvaluationMode::CrossValidated);
        assert!(metrics.mae.is_finite());
        assert!(metrics.mape.is_some());
    }

    #[test]
    fn test_cross_validation_falls_back_without_usable_folds() {
        let engine = ForecastEngine::new(ForecastConfig {
            evaluation: EvaluationMode::CrossValidated,
            ..Default::default()
        });
        let series = Series::from_pairs("total", &[(2021, 10.0), (2022, 12.0)]);
        let (_, metrics) = engine.train(&series).unwrap();
        assert_eq!(metrics.mode, EvaluationMode::InSample);
    }

    #[test]
    fn test_repair_in_sample_changes_scoring_only() {
        let series = Series::from_pairs(
            "cerai_hidup",
            &[(2018, 50.0), (2019, 40.0), (2020, 30.0), (2021, 20.0)],
        );
        let plain = ForecastEngine::default();
        let repaired = ForecastEngine::new(ForecastConfig {
            repair_in_sample: true,
            ..Default::default()
        });

        let (model_a, metrics_a) = plain.train(&series).unwrap();
        let (model_b, metrics_b) = repaired.train(&series).unwrap();
        assert_eq!(model_a, model_b);
        assert!(metrics_b.mae > metrics_a.mae);
    }

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_train_from_rows_validates_and_cleans() {
        let engine = ForecastEngine::default();
        let (model, _) = engine
            .train_from_rows(
                rows(json!([
                    {"id_tahun": "2022", "jumlah_putus_sekolah": 30},
                    {"id_tahun": 2020, "jumlah_putus_sekolah": null},
                    {"id_tahun": 2021, "jumlah_putus_sekolah": 20},
                ])),
                "id_tahun",
                "jumlah_putus_sekolah",
            )
            .unwrap();
        assert_eq!(model.last_period(), 2022);
        assert_eq!(model.n_observations(), 3);

        let err = engine
            .train_from_rows(rows(json!([{"id_tahun": 2020}])), "id_tahun", "missing")
            .unwrap_err();
        assert!(matches!(err, ForecastError::SchemaMismatch { .. }));

        let err = engine.train_from_rows(Vec::new(), "id_tahun", "x").unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    fn age_rows() -> Vec<Row> {
        let mut out = Vec::new();
        for (i, year) in (2016..=2022).enumerate() {
            let i = i as f64;
            out.push(json!({"id_tahun": year, "kategori_usia": "0-14", "total": 900.0 - 7.0 * i}));
            out.push(json!({"id_tahun": year, "kategori_usia": "60+", "total": 300.0 + 12.0 * i + (i % 2.0)}));
        }
        rows(Value::Array(out))
    }

    async fn elderly_model(storage: Arc<InMemoryStorage>) -> FittedModel {
        let access = DataAccess::new(storage);
        let dataset = access
            .fetch("penduduk_usia", &["id_tahun", "kategori_usia"], &["total"])
            .await
            .unwrap();
        let series = dataset
            .cohort_series("kategori_usia", Cohort::Elderly, "total")
            .unwrap();
        ForecastEngine::default().train(&series).unwrap().0
    }

    #[tokio::test]
    async fn test_cohort_models_are_independent() {
        let storage = Arc::new(InMemoryStorage::new().with_table("penduduk_usia", age_rows()));
        let before = elderly_model(storage.clone()).await;

        let removed = storage.delete_where("penduduk_usia", |row| {
            row.get("kategori_usia").and_then(Value::as_str) == Some("0-14")
                && row.get("id_tahun").and_then(Value::as_i64) != Some(2016)
        });
        assert_eq!(removed, 6);

        let after = elderly_model(storage).await;
        assert_eq!(before, after);
        assert_eq!(after.cohort(), Some(Cohort::Elderly));
    }

    #[tokio::test]
    async fn test_train_from_source() {
        let storage = InMemoryStorage::new().with_table(
            "penduduk_tahunan",
            rows(json!([
                {"id_tahun": 2020, "jumlah_penduduk": 1000},
                {"id_tahun": 2021, "jumlah_penduduk": 1050},
                {"id_tahun": 2022, "jumlah_penduduk": 1100},
            ])),
        );
        let access = DataAccess::new(Arc::new(storage));
        let engine = ForecastEngine::default();

        let (model, _) = engine
            .train_from_source(&access, "penduduk_tahunan", "id_tahun", "jumlah_penduduk")
            .await
            .unwrap();
        assert_eq!(model.indicator(), "jumlah_penduduk");

        let err = engine
            .train_from_source(&access, "keluarga", "id_tahun", "pria")
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }
}
