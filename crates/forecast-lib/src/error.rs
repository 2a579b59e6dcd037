//! Error taxonomy for the forecasting engine
//!
//! Every failure is surfaced to the caller as a distinct variant. Nothing in
//! the engine retries or recovers silently; a failed fetch or fit ends the
//! forecasting session.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// The named table does not exist or returned zero rows
    #[error("no data available in table '{table}': {reason}")]
    DataUnavailable { table: String, reason: String },

    /// Required columns are absent from the returned rows
    #[error("schema mismatch in table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    /// Fewer than two distinct periods to train on
    #[error("insufficient data: {distinct_periods} distinct period(s), need at least {required}")]
    InsufficientData {
        distinct_periods: usize,
        required: usize,
    },

    /// A percentage computation hit a zero denominator
    #[error("degenerate metric '{metric}': reference value is zero")]
    DegenerateMetric { metric: String },

    /// Transport or decoding failure talking to the storage collaborator
    #[error("storage request for '{table}' failed: {reason}")]
    Storage { table: String, reason: String },

    /// The storage collaborator did not answer within the fetch deadline
    #[error("storage request for '{table}' timed out after {timeout:?}")]
    StorageTimeout { table: String, timeout: Duration },

    /// A training task was cancelled before producing a model
    #[error("training of '{series}' was aborted: {reason}")]
    TrainingAborted { series: String, reason: String },
}

impl ForecastError {
    pub fn data_unavailable(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable name, used for metric labels and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::DegenerateMetric { .. } => "degenerate_metric",
            Self::Storage { .. } => "storage",
            Self::StorageTimeout { .. } => "storage_timeout",
            Self::TrainingAborted { .. } => "training_aborted",
        }
    }
}
