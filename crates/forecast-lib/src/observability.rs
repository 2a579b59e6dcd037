//! Observability for forecasting sessions
//!
//! Provides:
//! - Prometheus metrics (fetch and training latency, models trained, repairs, fetch errors, cache hits)
//! - Structured logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

struct ForecastMetricsInner {
    fetch_latency_seconds: Histogram,
    training_latency_seconds: Histogram,
    models_trained: IntCounter,
    repairs_applied: IntCounter,
    fetch_errors: IntCounterVec,
    cache_hits: IntCounter,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            fetch_latency_seconds: register_histogram!(
                "popcast_fetch_latency_seconds",
                "Time spent reading an indicator table from storage",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            training_latency_seconds: register_histogram!(
                "popcast_training_latency_seconds",
                "Time spent fitting and scoring one series model",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register training_latency_seconds"),

            models_trained: register_int_counter!(
                "popcast_models_trained_total",
                "Total number of series models trained"
            )
            .expect("Failed to register models_trained"),

            repairs_applied: register_int_counter!(
                "popcast_repairs_applied_total",
                "Total number of forecast values lifted by monotonic repair"
            )
            .expect("Failed to register repairs_applied"),

            fetch_errors: register_int_counter_vec!(
                "popcast_fetch_errors_total",
                "Total number of failed storage reads by error kind",
                &["kind"]
            )
            .expect("Failed to register fetch_errors"),

            cache_hits: register_int_counter!(
                "popcast_model_cache_hits_total",
                "Total number of models served from the model cache"
            )
            .expect("Failed to register cache_hits"),
        }
    }
}

/// Handle to the process-wide forecast metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ForecastMetrics {
    _private: (),
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForecastMetricsInner {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new)
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_latency(&self, duration_secs: f64) {
        self.inner().training_latency_seconds.observe(duration_secs);
    }

    pub fn inc_models_trained(&self) {
        self.inner().models_trained.inc();
    }

    pub fn add_repairs(&self, count: usize) {
        self.inner().repairs_applied.inc_by(count as u64);
    }

    /// Count a failed read under its error kind
    pub fn inc_fetch_errors(&self, kind: &str) {
        self.inner().fetch_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn models_trained(&self) -> u64 {
        self.inner().models_trained.get()
    }

    /// Render the default registry in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for forecasting events
#[derive(Clone)]
pub struct StructuredLogger {
    source: String,
}

impl StructuredLogger {
    /// `source` names the storage backend, e.g. a URL or snapshot path
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn log_session_start(&self, indicator: &str, table: &str, horizon: usize, kernel: &str) {
        info!(
            event = "session_started",
            source = %self.source,
            indicator = %indicator,
            table = %table,
            horizon = horizon,
            kernel = %kernel,
            "Forecasting session started"
        );
    }

    pub fn log_model_trained(
        &self,
        series: &str,
        observations: usize,
        mae: f64,
        r2: f64,
        evaluation: &str,
        cached: bool,
    ) {
        info!(
            event = "model_trained",
            source = %self.source,
            series = %series,
            observations = observations,
            mae = mae,
            r2 = r2,
            evaluation = %evaluation,
            cached = cached,
            "Series model ready"
        );
    }

    pub fn log_forecast(&self, series: &str, first_period: Option<i32>, periods: usize, repairs: usize) {
        if repairs > 0 {
            warn!(
                event = "forecast_repaired",
                source = %self.source,
                series = %series,
                first_period = ?first_period,
                periods = periods,
                repairs = repairs,
                "Forecast decreased and was lifted by monotonic repair"
            );
        } else {
            info!(
                event = "forecast_generated",
                source = %self.source,
                series = %series,
                first_period = ?first_period,
                periods = periods,
                "Forecast generated"
            );
        }
    }

    pub fn log_fetch_failed(&self, table: &str, kind: &str, reason: &str) {
        warn!(
            event = "fetch_failed",
            source = %self.source,
            table = %table,
            kind = %kind,
            reason = %reason,
            "Storage read failed"
        );
    }

    pub fn log_session_finished(&self, indicator: &str, series: usize, elapsed_ms: u64) {
        info!(
            event = "session_finished",
            source = %self.source,
            indicator = %indicator,
            series = series,
            elapsed_ms = elapsed_ms,
            "Forecasting session finished"
        );
    }
}
