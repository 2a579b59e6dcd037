//! Engine configuration
//!
//! All fields carry defaults so a partial TOML file or a handful of
//! environment overrides deserialize into a complete configuration.

use crate::data::DEFAULT_FETCH_TIMEOUT;
use crate::engine::{
    Kernel, SvrParams, DEFAULT_FOLDS, DEFAULT_MAX_SWEEPS, DEFAULT_SEED, DEFAULT_TOL,
    DEFAULT_UPLIFT,
};
use crate::models::EvaluationMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default forecast horizon in periods
pub const DEFAULT_HORIZON: usize = 3;

/// Kernel preset selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    #[default]
    Linear,
    Rbf,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelKind::Linear => f.write_str("linear"),
            KernelKind::Rbf => f.write_str("rbf"),
        }
    }
}

impl FromStr for KernelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(KernelKind::Linear),
            "rbf" => Ok(KernelKind::Rbf),
            other => Err(format!("unknown kernel '{}', expected linear or rbf", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub kernel: KernelKind,
    /// Overrides the kernel preset's regularization strength
    pub c: Option<f64>,
    /// Overrides the insensitive tube width
    pub epsilon: Option<f64>,
    /// Overrides the radial-basis coefficient (rbf only)
    pub gamma: Option<f64>,
    pub evaluation: EvaluationMode,
    pub cv_folds: usize,
    pub cv_seed: u64,
    /// Multiplier applied to the previous value when a forecast decreases
    pub repair_uplift: f64,
    /// Repair in-sample predictions before scoring them
    pub repair_in_sample: bool,
    pub horizon: usize,
    pub fetch_timeout_secs: u64,
    pub tol: f64,
    pub max_sweeps: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            kernel: KernelKind::Linear,
            c: None,
            epsilon: None,
            gamma: None,
            evaluation: EvaluationMode::InSample,
            cv_folds: DEFAULT_FOLDS,
            cv_seed: DEFAULT_SEED,
            repair_uplift: DEFAULT_UPLIFT,
            repair_in_sample: false,
            horizon: DEFAULT_HORIZON,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            tol: DEFAULT_TOL,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl ForecastConfig {
    /// Effective solver parameters: kernel preset plus any overrides
    pub fn svr_params(&self) -> SvrParams {
        let mut params = match self.kernel {
            KernelKind::Linear => SvrParams::linear(),
            KernelKind::Rbf => SvrParams::rbf(),
        };
        if let Some(c) = self.c {
            params.c = c;
        }
        if let Some(epsilon) = self.epsilon {
            params.epsilon = epsilon;
        }
        if let (Some(gamma), Kernel::Rbf { .. }) = (self.gamma, params.kernel) {
            params.kernel = Kernel::Rbf { gamma };
        }
        params.tol = self.tol;
        params.max_sweeps = self.max_sweeps;
        params
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), String> {
        let params = self.svr_params();
        if params.c.is_nan() || params.c <= 0.0 {
            return Err(format!("c must be positive, got {}", params.c));
        }
        if params.epsilon.is_nan() || params.epsilon < 0.0 {
            return Err(format!("epsilon must be non-negative, got {}", params.epsilon));
        }
        if let Kernel::Rbf { gamma } = params.kernel {
            if gamma.is_nan() || gamma <= 0.0 {
                return Err(format!("gamma must be positive, got {}", gamma));
            }
        }
        if self.cv_folds < 2 {
            return Err(format!("cv_folds must be at least 2, got {}", self.cv_folds));
        }
        if self.repair_uplift.is_nan() || self.repair_uplift < 1.0 {
            return Err(format!("repair_uplift must be at least 1.0, got {}", self.repair_uplift));
        }
        if self.max_sweeps == 0 {
            return Err("max_sweeps must be positive".to_string());
        }
        Ok(())
    }
}
