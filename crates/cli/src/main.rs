//! Population forecasting CLI
//!
//! Trains per-indicator models against a REST table store or a JSON
//! snapshot and prints monotonic multi-year forecasts.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::forecast::ForecastOptions;
use commands::{forecast, indicators};
use forecast_lib::{EvaluationMode, KernelKind};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Population forecasting CLI
#[derive(Parser)]
#[command(name = "popcast")]
#[command(author, version, about = "Forecast demographic indicators with support vector regression", long_about = None)]
pub struct Cli {
    /// Base URL of the REST table store
    #[arg(long, env = "POPCAST_STORAGE_URL", global = true)]
    pub storage_url: Option<String>,

    /// API key for the REST table store
    #[arg(long, env = "POPCAST_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and forecast every series of an indicator
    Forecast {
        /// Indicator name or table, see `popcast indicators`
        indicator: String,

        /// Number of future years to forecast
        #[arg(long)]
        horizon: Option<usize>,

        /// Regression kernel
        #[arg(long, value_enum)]
        kernel: Option<KernelArg>,

        /// How reported errors are measured
        #[arg(long, value_enum)]
        evaluation: Option<EvaluationArg>,

        /// Read tables from a JSON snapshot instead of the REST store
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Add a derived all-cohort sum per column
        #[arg(long)]
        sum_cohorts: bool,

        /// Print Prometheus metrics to stderr when done
        #[arg(long)]
        print_metrics: bool,
    },

    /// List the indicators that can be forecast
    Indicators,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KernelArg {
    /// Near-linear trends (C=250, epsilon=0.01)
    Linear,
    /// Curved trends (C=1000, epsilon=0.01, gamma=0.1)
    Rbf,
}

impl From<KernelArg> for KernelKind {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::Linear => KernelKind::Linear,
            KernelArg::Rbf => KernelKind::Rbf,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EvaluationArg {
    /// Score the model on its own training data
    InSample,
    /// Mean of seeded 3-fold cross validation scores
    CrossValidated,
}

impl From<EvaluationArg> for EvaluationMode {
    fn from(arg: EvaluationArg) -> Self {
        match arg {
            EvaluationArg::InSample => EvaluationMode::InSample,
            EvaluationArg::CrossValidated => EvaluationMode::CrossValidated,
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Forecast {
            indicator,
            horizon,
            kernel,
            evaluation,
            snapshot,
            sum_cohorts,
            print_metrics,
        } => {
            let config = config::Config::load(cli.config.as_deref())?;
            let options = ForecastOptions {
                indicator,
                horizon,
                kernel: kernel.map(Into::into),
                evaluation: evaluation.map(Into::into),
                snapshot,
                sum_cohorts,
                print_metrics,
            };
            forecast::run_forecast(options, config, cli.storage_url, cli.api_key, cli.format).await?;
        }
        Commands::Indicators => {
            indicators::list_indicators(cli.format)?;
        }
    }

    Ok(())
}
