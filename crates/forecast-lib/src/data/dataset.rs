//! Rectangular table of `(period, indicator values...)` rows

use crate::error::{ForecastError, Result};
use crate::models::{Cohort, Observation, Row, Series};
use serde_json::Value;
use std::collections::HashSet;

/// Rows of one table, sorted ascending by period
#[derive(Debug, Clone)]
pub struct Dataset {
    table: String,
    period_key: String,
    target_keys: Vec<String>,
    records: Vec<(i32, Row)>,
}

impl Dataset {
    /// Build a dataset from already-normalized rows
    pub fn from_rows(
        table: impl Into<String>,
        period_key: impl Into<String>,
        target_keys: Vec<String>,
        rows: Vec<Row>,
    ) -> Result<Self> {
        let table = table.into();
        let period_key = period_key.into();

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let period = parse_period(&table, &period_key, row.get(&period_key))?;
            records.push((period, row));
        }
        // Stable, so rows sharing a period keep storage order
        records.sort_by_key(|(period, _)| *period);

        Ok(Self {
            table,
            period_key,
            target_keys,
            records,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn period_key(&self) -> &str {
        &self.period_key
    }

    pub fn target_keys(&self) -> &[String] {
        &self.target_keys
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.records.iter().map(|(_, row)| row)
    }

    pub fn periods(&self) -> Vec<i32> {
        self.records.iter().map(|(period, _)| *period).collect()
    }

    pub fn max_period(&self) -> Option<i32> {
        self.records.last().map(|(period, _)| *period)
    }

    /// Distinct cohorts in first-seen order
    pub fn cohorts(&self, cohort_key: &str) -> Result<Vec<Cohort>> {
        let mut seen = Vec::new();
        for (_, row) in &self.records {
            let cohort = self.parse_cohort(cohort_key, row)?;
            if !seen.contains(&cohort) {
                seen.push(cohort);
            }
        }
        Ok(seen)
    }

    /// Extract one target column across all rows
    pub fn series(&self, target: &str) -> Result<Series> {
        self.collect_series(target, None, |_| Ok(true))
    }

    /// Extract one target column restricted to the rows of `cohort`
    pub fn cohort_series(&self, cohort_key: &str, cohort: Cohort, target: &str) -> Result<Series> {
        self.collect_series(target, Some(cohort), |row| {
            Ok(self.parse_cohort(cohort_key, row)? == cohort)
        })
    }

    fn collect_series<F>(&self, target: &str, cohort: Option<Cohort>, mut keep: F) -> Result<Series>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let mut observations = Vec::new();
        let mut seen = HashSet::new();

        for (period, row) in &self.records {
            if !keep(row)? {
                continue;
            }
            let value = match row.get(target) {
                Some(value) => value.as_f64().ok_or_else(|| {
                    ForecastError::schema_mismatch(
                        &self.table,
                        format!("column '{}' holds non-numeric value {}", target, value),
                    )
                })?,
                None => {
                    return Err(ForecastError::schema_mismatch(
                        &self.table,
                        format!("missing column '{}'", target),
                    ))
                }
            };
            if !seen.insert(*period) {
                return Err(ForecastError::schema_mismatch(
                    &self.table,
                    format!("duplicate period {} for '{}'", period, target),
                ));
            }
            observations.push(Observation {
                period: *period,
                value,
            });
        }

        Ok(Series::new(target, cohort, observations))
    }

    fn parse_cohort(&self, cohort_key: &str, row: &Row) -> Result<Cohort> {
        match row.get(cohort_key) {
            Some(Value::String(label)) => label
                .parse()
                .map_err(|e: String| ForecastError::schema_mismatch(&self.table, e)),
            Some(other) => Err(ForecastError::schema_mismatch(
                &self.table,
                format!("cohort column '{}' holds {}", cohort_key, other),
            )),
            None => Err(ForecastError::schema_mismatch(
                &self.table,
                format!("missing cohort column '{}'", cohort_key),
            )),
        }
    }
}

fn parse_period(table: &str, key: &str, value: Option<&Value>) -> Result<i32> {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|p| i32::try_from(p).ok())
        .ok_or_else(|| {
            ForecastError::schema_mismatch(
                table,
                format!("period column '{}' holds a non-integer value {:?}", key, value),
            )
        })
}
