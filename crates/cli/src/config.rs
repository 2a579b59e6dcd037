//! Configuration management for the CLI
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file
//! (`--config` or `<config dir>/popcast/config.toml`), then `POPCAST_*`
//! environment variables. Nested keys use a double underscore, e.g.
//! `POPCAST_FORECAST__KERNEL=rbf`. Command-line flags override all of them.

use anyhow::{Context, Result};
use forecast_lib::ForecastConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST storage endpoint
    pub storage_url: Option<String>,
    /// API key for the storage endpoint
    pub api_key: Option<String>,
    /// Engine settings
    pub forecast: ForecastConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path(),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = &path {
            // A file named on the command line must exist
            builder = builder.add_source(config::File::from(path.clone()).required(explicit.is_some()));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("POPCAST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Default configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("popcast").join("config.toml"))
    }
}
