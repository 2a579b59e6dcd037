//! Population forecasting library
//!
//! This crate provides the core functionality for:
//! - Reading demographic indicator tables from a storage backend
//! - Training one support vector regressor per (indicator, cohort) series
//! - Monotonic forecasts over future years
//! - Accuracy metrics and presentation-ready reports
//! - Observability

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod models;
pub mod observability;
pub mod report;
pub mod session;

pub use config::{ForecastConfig, KernelKind};
pub use data::{DataAccess, Dataset, InMemoryStorage, RestStorageClient, RestStorageConfig, StorageClient};
pub use engine::{FittedModel, ForecastEngine, ModelCache, MonotonicRepair};
pub use error::{ForecastError, Result};
pub use indicators::Indicator;
pub use models::*;
pub use observability::{ForecastMetrics, StructuredLogger};
pub use report::{ForecastReport, SeriesForecast};
pub use session::ForecastSession;
