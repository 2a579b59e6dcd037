//! Accuracy metrics and presentation-ready forecast reports
//!
//! This module provides:
//! - MAE, MAPE and R² over paired actual/predicted values
//! - Percentage deltas between consecutive values
//! - Two-decimal display rounding, applied only here
//! - `ForecastReport`, the serializable hand-off to a presentation layer

use crate::error::{ForecastError, Result};
use crate::models::{
    Cohort, EvaluationMetrics, EvaluationMode, Observation, PredictedPoint, PredictionSet,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Residual sums below this count as an exact fit
const EXACT_FIT: f64 = 1e-12;

/// Mean absolute error; NaN for empty or mismatched input
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();

    sum / actual.len() as f64
}

/// Mean absolute percentage error, in percent
///
/// Returns `None` when any actual value is zero, where the ratio is
/// undefined, or when the input is empty or mismatched.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return None;
    }
    if actual.iter().any(|a| *a == 0.0) {
        return None;
    }

    let sum: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| ((a - p) / a).abs())
        .sum();

    Some(sum / actual.len() as f64 * 100.0)
}

/// Coefficient of determination
///
/// With zero variance in `actual` the ratio is undefined; an exact fit
/// scores 1.0 and anything else 0.0.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }

    let mean = actual.iter().sum::<f64>() / actual.len() as f64;

    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot <= EXACT_FIT {
        return if ss_res <= EXACT_FIT { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

/// Package all three metrics for one evaluation
pub fn evaluate(actual: &[f64], predicted: &[f64], mode: EvaluationMode) -> EvaluationMetrics {
    EvaluationMetrics {
        mae: mae(actual, predicted),
        mape: mape(actual, predicted),
        r2: r_squared(actual, predicted),
        mode,
    }
}

/// `(value - reference) / reference * 100`
///
/// A zero reference is a `DegenerateMetric` failure.
pub fn percent_change(reference: f64, value: f64) -> Result<f64> {
    if reference == 0.0 {
        return Err(ForecastError::DegenerateMetric {
            metric: "percent_change".to_string(),
        });
    }
    Ok((value - reference) / reference * 100.0)
}

/// Change of each value against its predecessor, the first against `reference`
///
/// Entries with a zero reference are `None` (not applicable).
pub fn percent_changes(reference: f64, values: &[f64]) -> Vec<Option<f64>> {
    let mut previous = reference;
    values
        .iter()
        .map(|&value| {
            let change = percent_change(previous, value).ok();
            previous = value;
            change
        })
        .collect()
}

/// Round to two decimal places for display
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Signed percentage with one decimal, or `n/a`
pub fn format_delta(change: Option<f64>) -> String {
    match change {
        Some(c) if c.is_finite() => format!("{:+.1}%", c),
        _ => "n/a".to_string(),
    }
}

/// One historical value with its change against the previous period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub period: i32,
    pub value: f64,
    pub change_pct: Option<f64>,
}

/// One forecast value, rounded for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub period: i32,
    pub value: f64,
    pub change_pct: Option<f64>,
}

/// Everything a presentation layer shows for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesForecast {
    pub indicator: String,
    pub cohort: Option<Cohort>,
    pub label: String,
    pub metrics: EvaluationMetrics,
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<ForecastRow>,
    pub repairs: usize,
    /// True for series computed by summing other forecasts
    #[serde(default)]
    pub derived: bool,
}

impl SeriesForecast {
    /// Build rows from the training history and a prediction set
    ///
    /// The first forecast change is measured against the last observed
    /// value, later ones against the previous forecast.
    pub fn new(
        indicator: impl Into<String>,
        cohort: Option<Cohort>,
        metrics: EvaluationMetrics,
        history: &[Observation],
        predictions: &PredictionSet,
    ) -> Self {
        let indicator = indicator.into();
        let label = match cohort {
            Some(c) => format!("{} [{}]", indicator, c),
            None => indicator.clone(),
        };

        let history_values: Vec<f64> = history.iter().map(|o| o.value).collect();
        let mut history_changes = vec![None];
        if let Some((first, rest)) = history_values.split_first() {
            history_changes.extend(percent_changes(*first, rest));
        }
        let history = history
            .iter()
            .zip(history_changes)
            .map(|(o, change)| HistoryPoint {
                period: o.period,
                value: round2(o.value),
                change_pct: change.map(round2),
            })
            .collect();

        let reference = history_values.last().copied().unwrap_or(0.0);
        let forecast = predictions
            .points
            .iter()
            .zip(percent_changes(reference, &predictions.values()))
            .map(|(p, change)| ForecastRow {
                period: p.period,
                value: round2(p.value),
                change_pct: change.map(round2),
            })
            .collect();

        Self {
            indicator,
            cohort,
            label,
            metrics,
            history,
            forecast,
            repairs: predictions.repairs,
            derived: false,
        }
    }

    /// Rounded metrics for display: `(mae, mape, r2)`
    pub fn display_metrics(&self) -> (f64, Option<f64>, f64) {
        (
            round2(self.metrics.mae),
            self.metrics.mape.map(round2),
            round2(self.metrics.r2),
        )
    }
}

/// Forecasts for every series of one indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub indicator: String,
    pub table: String,
    pub generated_at: DateTime<Utc>,
    pub horizon: usize,
    pub kernel: String,
    pub evaluation: EvaluationMode,
    pub series: Vec<SeriesForecast>,
}

impl ForecastReport {
    pub fn new(
        indicator: impl Into<String>,
        table: impl Into<String>,
        horizon: usize,
        kernel: impl Into<String>,
        evaluation: EvaluationMode,
    ) -> Self {
        Self {
            indicator: indicator.into(),
            table: table.into(),
            generated_at: Utc::now(),
            horizon,
            kernel: kernel.into(),
            evaluation,
            series: Vec::new(),
        }
    }

    pub fn push(&mut self, series: SeriesForecast) {
        self.series.push(series);
    }

    pub fn find(&self, label: &str) -> Option<&SeriesForecast> {
        self.series.iter().find(|s| s.label == label)
    }

    /// Append a derived series summing the named ones period by period
    ///
    /// The summed forecast is not reconciled against a model trained on the
    /// summed history; it is marked `derived` and carries no metrics of its
    /// own. Returns false when a label is unknown or periods disagree.
    pub fn sum_series(&mut self, labels: &[&str], label: impl Into<String>) -> bool {
        let parts: Vec<&SeriesForecast> = labels.iter().filter_map(|l| self.find(l)).collect();
        if parts.is_empty() || parts.len() != labels.len() {
            return false;
        }

        let periods: Vec<i32> = parts[0].forecast.iter().map(|r| r.period).collect();
        let history_periods: Vec<i32> = parts[0].history.iter().map(|h| h.period).collect();
        let aligned = parts.iter().all(|p| {
            p.forecast.iter().map(|r| r.period).eq(periods.iter().copied())
                && p.history.iter().map(|h| h.period).eq(history_periods.iter().copied())
        });
        if !aligned {
            return false;
        }

        let history: Vec<Observation> = history_periods
            .iter()
            .enumerate()
            .map(|(i, &period)| Observation {
                period,
                value: parts.iter().map(|p| p.history[i].value).sum(),
            })
            .collect();
        let predictions = PredictionSet {
            points: periods
                .iter()
                .enumerate()
                .map(|(i, &period)| PredictedPoint {
                    period,
                    value: parts.iter().map(|p| p.forecast[i].value).sum(),
                })
                .collect(),
            repairs: 0,
        };
        let metrics = EvaluationMetrics {
            mae: f64::NAN,
            mape: None,
            r2: f64::NAN,
            mode: self.evaluation,
        };

        let indicator = self.indicator.clone();
        let mut summed = SeriesForecast::new(indicator, None, metrics, &history, &predictions);
        summed.label = label.into();
        summed.derived = true;
        self.series.push(summed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit_metrics() {
        let actual = vec![1.0, 2.0, 3.0];
        let metrics = evaluate(&actual, &actual, EvaluationMode::InSample);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.mape, Some(0.0));
        assert_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn test_metric_values() {
        let actual = vec![100.0, 200.0];
        let predicted = vec![110.0, 190.0];
        assert_eq!(mae(&actual, &predicted), 10.0);
        assert!((mape(&actual, &predicted).unwrap() - 7.5).abs() < 1e-12);
        // ss_res = 200, ss_tot = 5000
        assert!((r_squared(&actual, &predicted) - 0.96).abs() < 1e-12);
    }

    #[test]
    fn test_mape_undefined_with_zero_actual() {
        assert_eq!(mape(&[0.0, 5.0], &[1.0, 5.0]), None);
        assert_eq!(mape(&[], &[]), None);
    }

    #[test]
    fn test_r_squared_zero_variance() {
        assert_eq!(r_squared(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
        assert!(r_squared(&[1.0], &[1.0, 2.0]).is_nan());
    }

    #[test]
    fn test_r_squared_can_be_negative() {
        assert!(r_squared(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_percent_change_zero_reference() {
        assert_eq!(percent_change(100.0, 110.0).unwrap(), 10.0);
        assert!(matches!(
            percent_change(0.0, 10.0),
            Err(ForecastError::DegenerateMetric { .. })
        ));
    }

    #[test]
    fn test_percent_changes_chain_from_reference() {
        let changes = percent_changes(100.0, &[110.0, 0.0, 5.0]);
        assert!((changes[0].unwrap() - 10.0).abs() < 1e-12);
        assert!((changes[1].unwrap() + 100.0).abs() < 1e-12);
        assert_eq!(changes[2], None);
    }

    #[test]
    fn test_round_and_format() {
        assert_eq!(round2(102.014999), 102.01);
        assert_eq!(round2(-7.456), -7.46);
        assert_eq!(format_delta(Some(4.545)), "+4.5%");
        assert_eq!(format_delta(Some(-2.0)), "-2.0%");
        assert_eq!(format_delta(None), "n/a");
    }

    fn metrics() -> EvaluationMetrics {
        EvaluationMetrics {
            mae: 1.234,
            mape: Some(0.456),
            r2: 0.98765,
            mode: EvaluationMode::InSample,
        }
    }

    fn predictions(values: &[(i32, f64)]) -> PredictionSet {
        PredictionSet {
            points: values
                .iter()
                .map(|&(period, value)| PredictedPoint { period, value })
                .collect(),
            repairs: 0,
        }
    }

    #[test]
    fn test_series_forecast_rows() {
        let history = vec![
            Observation { period: 2021, value: 1000.0 },
            Observation { period: 2022, value: 1100.0 },
        ];
        let forecast = SeriesForecast::new(
            "laki_laki",
            None,
            metrics(),
            &history,
            &predictions(&[(2023, 1210.004), (2024, 1331.0)]),
        );

        assert_eq!(forecast.history[0].change_pct, None);
        assert_eq!(forecast.history[1].change_pct, Some(10.0));
        assert_eq!(forecast.forecast[0].value, 1210.0);
        assert_eq!(forecast.forecast[0].change_pct, Some(10.0));
        assert_eq!(forecast.forecast[1].change_pct, Some(10.0));
        assert_eq!(forecast.display_metrics(), (1.23, Some(0.46), 0.99));
    }

    #[test]
    fn test_series_forecast_zero_reference_is_not_applicable() {
        let history = vec![Observation { period: 2022, value: 0.0 }];
        let forecast = SeriesForecast::new(
            "migrasi_masuk",
            None,
            metrics(),
            &history,
            &predictions(&[(2023, 5.0)]),
        );
        assert_eq!(forecast.forecast[0].change_pct, None);
    }

    #[test]
    fn test_sum_series_adds_forecasts() {
        let history = vec![Observation { period: 2022, value: 10.0 }];
        let mut report = ForecastReport::new("households", "keluarga", 1, "linear", EvaluationMode::InSample);
        report.push(SeriesForecast::new("pria", None, metrics(), &history, &predictions(&[(2023, 11.0)])));
        report.push(SeriesForecast::new("wanita", None, metrics(), &history, &predictions(&[(2023, 12.0)])));

        assert!(report.sum_series(&["pria", "wanita"], "total"));
        let total = report.find("total").unwrap();
        assert!(total.derived);
        assert_eq!(total.forecast[0].value, 23.0);
        assert_eq!(total.history[0].value, 20.0);

        assert!(!report.sum_series(&["pria", "missing"], "broken"));
    }

    #[test]
    fn test_report_serializes() {
        let report = ForecastReport::new("population", "penduduk_tahunan", 3, "linear", EvaluationMode::InSample);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["evaluation"], "in_sample");
        assert!(json["generated_at"].is_string());
    }
}
