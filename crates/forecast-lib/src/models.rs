//! Core data models for the forecasting engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One row as returned by the storage collaborator: column name to value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Age bracket partition used by the age-cohort table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cohort {
    #[serde(rename = "0-14")]
    Children,
    #[serde(rename = "15-60")]
    WorkingAge,
    #[serde(rename = "60+")]
    Elderly,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Children, Cohort::WorkingAge, Cohort::Elderly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Children => "0-14",
            Cohort::WorkingAge => "15-60",
            Cohort::Elderly => "60+",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cohort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0-14" => Ok(Cohort::Children),
            "15-60" => Ok(Cohort::WorkingAge),
            "60+" => Ok(Cohort::Elderly),
            other => Err(format!("unknown cohort '{}'", other)),
        }
    }
}

/// One historical record for a single indicator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub period: i32,
    pub value: f64,
}

/// Observations for one (indicator column, cohort) pair, ascending by period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub indicator: String,
    pub cohort: Option<Cohort>,
    pub observations: Vec<Observation>,
}

impl Series {
    pub fn new(indicator: impl Into<String>, cohort: Option<Cohort>, observations: Vec<Observation>) -> Self {
        Self {
            indicator: indicator.into(),
            cohort,
            observations,
        }
    }

    /// Build a series from `(period, value)` pairs
    pub fn from_pairs(indicator: impl Into<String>, pairs: &[(i32, f64)]) -> Self {
        let observations = pairs
            .iter()
            .map(|&(period, value)| Observation { period, value })
            .collect();
        Self::new(indicator, None, observations)
    }

    /// Human-readable label, e.g. `total [60+]`
    pub fn label(&self) -> String {
        match self.cohort {
            Some(cohort) => format!("{} [{}]", self.indicator, cohort),
            None => self.indicator.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn periods(&self) -> Vec<i32> {
        self.observations.iter().map(|o| o.period).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn distinct_periods(&self) -> usize {
        let mut periods = self.periods();
        periods.sort_unstable();
        periods.dedup();
        periods.len()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.iter().max_by_key(|o| o.period)
    }

    /// Keep only the observations at the given positions
    pub fn subset(&self, indices: &[usize]) -> Series {
        let observations = indices
            .iter()
            .filter_map(|&i| self.observations.get(i).copied())
            .collect();
        Series::new(self.indicator.clone(), self.cohort, observations)
    }
}

/// How the reported errors were measured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Fit on all data and score against the same data
    #[default]
    InSample,
    /// Mean of per-fold scores from shuffled k-fold cross validation
    CrossValidated,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::InSample => f.write_str("in-sample"),
            EvaluationMode::CrossValidated => f.write_str("cross-validated"),
        }
    }
}

/// Accuracy of one fitted model, computed once at training time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    /// Percentage; `None` when a target value is zero
    pub mape: Option<f64>,
    pub r2: f64,
    pub mode: EvaluationMode,
}

/// A single forecast value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictedPoint {
    pub period: i32,
    pub value: f64,
}

/// Forecast values for requested periods, in ascending period order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub points: Vec<PredictedPoint>,
    /// Number of values lifted by the monotonic repair pass
    pub repairs: usize,
}

impl PredictionSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn periods(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.period).collect()
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.points.windows(2).all(|w| w[1].value >= w[0].value)
    }
}
