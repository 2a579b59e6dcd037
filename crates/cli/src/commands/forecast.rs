//! Forecast command

use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use forecast_lib::report::format_delta;
use forecast_lib::{
    indicators, DataAccess, EvaluationMode, ForecastConfig, ForecastEngine, ForecastMetrics,
    ForecastReport, ForecastSession, InMemoryStorage, KernelKind, RestStorageClient,
    RestStorageConfig, SeriesForecast, StorageClient, StructuredLogger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;
use tracing::debug;

use crate::config::Config;
use crate::output::{
    color_delta, color_r2, format_mape, format_value, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Historical rows shown above each forecast table
const HISTORY_ROWS: usize = 3;

/// Options of `popcast forecast`
#[derive(Debug, Clone, Default)]
pub struct ForecastOptions {
    pub indicator: String,
    pub horizon: Option<usize>,
    pub kernel: Option<KernelKind>,
    pub evaluation: Option<EvaluationMode>,
    pub snapshot: Option<PathBuf>,
    pub sum_cohorts: bool,
    pub print_metrics: bool,
}

#[derive(Tabled)]
struct ForecastTableRow {
    #[tabled(rename = "Year")]
    period: i32,
    #[tabled(rename = "")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Change")]
    change: String,
}

/// Train and forecast every series of one indicator
pub async fn run_forecast(
    options: ForecastOptions,
    config: Config,
    storage_url: Option<String>,
    api_key: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let indicator = indicators::find(&options.indicator).ok_or_else(|| {
        anyhow!(
            "unknown indicator '{}', run `popcast indicators` for the list",
            options.indicator
        )
    })?;

    let forecast_config = apply_overrides(config.forecast, &options);
    forecast_config
        .validate()
        .map_err(|e| anyhow!("invalid forecast configuration: {}", e))?;
    let horizon = forecast_config.horizon;
    let timeout = forecast_config.fetch_timeout();

    let storage_url = storage_url.or(config.storage_url);
    let api_key = api_key.or(config.api_key);
    let (client, source) = open_storage(options.snapshot.as_ref(), storage_url, api_key)?;
    debug!(source = %source, indicator = indicator.name, "Opened storage");

    let access = DataAccess::new(client).with_timeout(timeout);
    let session = ForecastSession::new(access, ForecastEngine::new(forecast_config))
        .with_logger(StructuredLogger::new(source))
        .with_cohort_sums(options.sum_cohorts);

    let report = session
        .run(indicator, horizon)
        .await
        .with_context(|| format!("Forecast for '{}' failed", indicator.name))?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    if options.print_metrics {
        eprintln!("{}", ForecastMetrics::new().render());
    }
    Ok(())
}

/// Command-line flags take precedence over configured values
fn apply_overrides(mut config: ForecastConfig, options: &ForecastOptions) -> ForecastConfig {
    if let Some(horizon) = options.horizon {
        config.horizon = horizon;
    }
    if let Some(kernel) = options.kernel {
        config.kernel = kernel;
    }
    if let Some(evaluation) = options.evaluation {
        config.evaluation = evaluation;
    }
    config
}

/// A snapshot file wins over the REST endpoint
fn open_storage(
    snapshot: Option<&PathBuf>,
    storage_url: Option<String>,
    api_key: Option<String>,
) -> Result<(Arc<dyn StorageClient>, String)> {
    if let Some(path) = snapshot {
        let storage = InMemoryStorage::from_json_file(path)
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        let client: Arc<dyn StorageClient> = Arc::new(storage);
        return Ok((client, path.display().to_string()));
    }

    let Some(url) = storage_url else {
        bail!("no storage configured: pass --snapshot <file> or --storage-url <url>");
    };
    let Some(api_key) = api_key else {
        bail!("--api-key (or POPCAST_API_KEY) is required with --storage-url");
    };
    let client: Arc<dyn StorageClient> = Arc::new(
        RestStorageClient::new(RestStorageConfig::new(url.clone(), api_key))
            .context("Failed to create storage client")?,
    );
    Ok((client, url))
}

fn print_report(report: &ForecastReport) {
    println!(
        "{} {} ({})",
        "Forecast:".bold(),
        report.indicator.cyan(),
        report.table
    );
    println!(
        "Kernel: {}  Evaluation: {}  Horizon: {}  Generated: {}",
        report.kernel,
        report.evaluation,
        report.horizon,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    for series in &report.series {
        println!();
        print_series(series);
    }
}

fn print_series(series: &SeriesForecast) {
    if series.derived {
        println!("{} {}", series.label.bold(), "(sum of cohort forecasts)".dimmed());
    } else {
        let (mae, mape, r2) = series.display_metrics();
        println!(
            "{}  MAE {}  MAPE {}  R² {}",
            series.label.bold(),
            format_value(mae),
            format_mape(mape),
            color_r2(r2)
        );
    }

    let skip = series.history.len().saturating_sub(HISTORY_ROWS);
    let mut rows: Vec<ForecastTableRow> = series
        .history
        .iter()
        .skip(skip)
        .map(|h| ForecastTableRow {
            period: h.period,
            kind: "observed".dimmed().to_string(),
            value: format_value(h.value),
            change: color_delta(&format_delta(h.change_pct)),
        })
        .collect();
    rows.extend(series.forecast.iter().map(|f| ForecastTableRow {
        period: f.period,
        kind: "forecast".cyan().to_string(),
        value: format_value(f.value),
        change: color_delta(&format_delta(f.change_pct)),
    }));
    print_table(&rows);

    if series.repairs > 0 {
        print_warning(&format!(
            "{} forecast value(s) lifted to keep the series non-decreasing",
            series.repairs
        ));
    }
    if series.forecast.is_empty() {
        print_info("Horizon is 0, nothing to forecast");
    }
}
