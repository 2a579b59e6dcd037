//! Epsilon-insensitive support vector regression on a single feature
//!
//! Solves the dual problem in the difference variables
//! `beta_i = alpha_i - alpha_i*`:
//!
//! ```text
//! minimise   1/2 beta' K beta + epsilon * sum |beta_i| - y' beta
//! subject to sum beta_i = 0,  -C <= beta_i <= C
//! ```
//!
//! Each step moves one pair `(beta_i, beta_j)` along the equality
//! constraint and minimises the piecewise-quadratic objective along that
//! line exactly. Pairs are swept in a fixed order, so a fit is fully
//! deterministic for a given input.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Regularization strength for the linear kernel
pub const LINEAR_C: f64 = 250.0;
/// Regularization strength for the radial-basis kernel
pub const RBF_C: f64 = 1000.0;
/// Width of the insensitive tube for both kernels
pub const DEFAULT_EPSILON: f64 = 0.01;
/// Radial-basis kernel coefficient
pub const RBF_GAMMA: f64 = 0.1;

/// Largest pair step, below which a sweep counts as converged
pub const DEFAULT_TOL: f64 = 1e-6;
/// Upper bound on full sweeps over all pairs
pub const DEFAULT_MAX_SWEEPS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

impl Kernel {
    #[inline]
    pub fn eval(&self, a: f64, b: f64) -> f64 {
        match self {
            Kernel::Linear => a * b,
            Kernel::Rbf { gamma } => (-gamma * (a - b).powi(2)).exp(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Linear => "linear",
            Kernel::Rbf { .. } => "rbf",
        }
    }
}

/// Hyperparameters of one regression fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    pub kernel: Kernel,
    pub c: f64,
    pub epsilon: f64,
    pub tol: f64,
    pub max_sweeps: usize,
}

impl SvrParams {
    /// Linear kernel preset, for near-linear trends
    pub fn linear() -> Self {
        Self {
            kernel: Kernel::Linear,
            c: LINEAR_C,
            epsilon: DEFAULT_EPSILON,
            tol: DEFAULT_TOL,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }

    /// Radial-basis kernel preset, for curved trends
    pub fn rbf() -> Self {
        Self {
            kernel: Kernel::Rbf { gamma: RBF_GAMMA },
            c: RBF_C,
            epsilon: DEFAULT_EPSILON,
            tol: DEFAULT_TOL,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl Default for SvrParams {
    fn default() -> Self {
        Self::linear()
    }
}

/// A fitted regression function `f(x) = sum coef_i K(sv_i, x) + bias`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorRegressor {
    kernel: Kernel,
    support: Vec<f64>,
    coef: Vec<f64>,
    bias: f64,
    sweeps: usize,
    converged: bool,
}

impl SupportVectorRegressor {
    /// Fit on already-scaled feature values `x` against targets `y`
    pub fn fit(x: &[f64], y: &[f64], params: &SvrParams) -> Self {
        let n = x.len().min(y.len());
        let c = params.c;
        let epsilon = params.epsilon;

        let gram: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| params.kernel.eval(x[i], x[j])).collect())
            .collect();

        let mut beta = vec![0.0; n];
        // grad_i = (K beta)_i - y_i
        let mut grad: Vec<f64> = y[..n].iter().map(|v| -v).collect();

        let mut sweeps = 0;
        let mut converged = n < 2;
        while !converged && sweeps < params.max_sweeps {
            sweeps += 1;
            let mut largest_step = 0.0_f64;

            for i in 0..n {
                for j in (i + 1)..n {
                    let eta = gram[i][i] + gram[j][j] - 2.0 * gram[i][j];
                    let step = pair_step(beta[i], beta[j], grad[i] - grad[j], eta, c, epsilon);
                    if step == 0.0 {
                        continue;
                    }
                    beta[i] += step;
                    beta[j] -= step;
                    for (k, g) in grad.iter_mut().enumerate() {
                        *g += step * (gram[k][i] - gram[k][j]);
                    }
                    largest_step = largest_step.max(step.abs());
                }
            }

            if largest_step < params.tol {
                converged = true;
            }
        }

        if converged {
            debug!(samples = n, sweeps, kernel = params.kernel.name(), "SVR solver converged");
        } else {
            warn!(
                samples = n,
                sweeps,
                kernel = params.kernel.name(),
                "SVR solver hit the sweep limit before converging"
            );
        }

        let bias = intercept(&beta, &grad, c, epsilon);

        let (support, coef): (Vec<f64>, Vec<f64>) = x[..n]
            .iter()
            .zip(beta.iter())
            .filter(|(_, b)| **b != 0.0)
            .map(|(xi, b)| (*xi, *b))
            .unzip();

        Self {
            kernel: params.kernel,
            support,
            coef,
            bias,
            sweeps,
            converged,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.support
            .iter()
            .zip(self.coef.iter())
            .map(|(sv, coef)| coef * self.kernel.eval(*sv, x))
            .sum::<f64>()
            + self.bias
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn n_support(&self) -> usize {
        self.support.len()
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Exact minimiser of the objective along `beta_i += t, beta_j -= t`
///
/// `dg` is `grad_i - grad_j` and `eta` the curvature `K_ii + K_jj - 2 K_ij`.
/// Returns 0.0 when no candidate improves the objective.
fn pair_step(bi: f64, bj: f64, dg: f64, eta: f64, c: f64, epsilon: f64) -> f64 {
    let lo = (-c - bi).max(bj - c);
    let hi = (c - bi).min(bj + c);
    if lo > hi {
        return 0.0;
    }

    let change = |t: f64| {
        t * dg + 0.5 * eta * t * t + epsilon * ((bi + t).abs() - bi.abs() + (bj - t).abs() - bj.abs())
    };

    // Minimum lies on a bound, a kink, or a stationary point of one piece
    let mut candidates = vec![lo, hi, -bi, bj];
    if eta > 1e-12 {
        for si in [-1.0, 1.0] {
            for sj in [-1.0, 1.0] {
                candidates.push(-(dg + epsilon * (si - sj)) / eta);
            }
        }
    }

    let mut best_t = 0.0;
    let mut best_change = 0.0;
    for t in candidates {
        let t = t.clamp(lo, hi);
        let delta = change(t);
        if delta < best_change {
            best_t = t;
            best_change = delta;
        }
    }

    // Ignore improvements at the level of rounding noise
    let noise = 1e-12 * (1.0 + best_t.abs() * (dg.abs() + epsilon + eta * best_t.abs()));
    if best_change < -noise {
        best_t
    } else {
        0.0
    }
}

/// Bias from free support vectors, else the midpoint of the feasible interval
fn intercept(beta: &[f64], grad: &[f64], c: f64, epsilon: f64) -> f64 {
    let margin = 1e-9 * c.max(1.0);
    let mut free_sum = 0.0;
    let mut free_count = 0usize;
    let mut lower = f64::NEG_INFINITY;
    let mut upper = f64::INFINITY;

    for (b, g) in beta.iter().zip(grad.iter()) {
        // y_i - (K beta)_i
        let residual = -g;
        if *b > margin && *b < c - margin {
            free_sum += residual - epsilon;
            free_count += 1;
        } else if *b < -margin && *b > -c + margin {
            free_sum += residual + epsilon;
            free_count += 1;
        } else if *b >= c - margin {
            upper = upper.min(residual - epsilon);
        } else if *b <= -c + margin {
            lower = lower.max(residual + epsilon);
        } else {
            lower = lower.max(residual - epsilon);
            upper = upper.min(residual + epsilon);
        }
    }

    if free_count > 0 {
        return free_sum / free_count as f64;
    }
    match (lower.is_finite(), upper.is_finite()) {
        (true, true) => (lower + upper) / 2.0,
        (true, false) => lower,
        (false, true) => upper,
        (false, false) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standardized(n: usize) -> Vec<f64> {
        let raw: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mean = raw.iter().sum::<f64>() / n as f64;
        let std = (raw.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
        raw.iter().map(|v| (v - mean) / std).collect()
    }

    #[test]
    fn test_linear_fit_recovers_line() {
        let x = standardized(3);
        let y = vec![1000.0, 1050.0, 1100.0];
        let model = SupportVectorRegressor::fit(&x, &y, &SvrParams::linear());

        for (xi, yi) in x.iter().zip(y.iter()) {
            assert!((model.predict(*xi) - yi).abs() <= 0.011, "residual too large at {xi}");
        }
        // One step beyond the last point
        let next = x[2] + (x[2] - x[1]);
        assert!((model.predict(next) - 1150.0).abs() < 0.1);
    }

    #[test]
    fn test_flat_series_predicts_constant() {
        let x = standardized(4);
        let y = vec![500.0; 4];
        let model = SupportVectorRegressor::fit(&x, &y, &SvrParams::linear());
        assert!((model.predict(5.0) - 500.0).abs() < 0.02);
    }

    #[test]
    fn test_rbf_fit_beats_mean_predictor() {
        let x = standardized(6);
        let y: Vec<f64> = (0..6).map(|i| 100.0 + (i * i) as f64 * 5.0).collect();
        let model = SupportVectorRegressor::fit(&x, &y, &SvrParams::rbf());

        let mean = y.iter().sum::<f64>() / 6.0;
        let spread: f64 = y.iter().map(|v| (v - mean).abs()).sum::<f64>() / 6.0;
        let mae: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(xi, yi)| (model.predict(*xi) - yi).abs())
            .sum::<f64>()
            / 6.0;
        assert!(mae < spread / 2.0, "mae {mae} vs spread {spread}");
        assert!(model.predict(x[5]) > model.predict(x[0]));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = standardized(7);
        let y = vec![10.0, 14.0, 13.0, 19.0, 25.0, 24.0, 30.0];
        let a = SupportVectorRegressor::fit(&x, &y, &SvrParams::rbf());
        let b = SupportVectorRegressor::fit(&x, &y, &SvrParams::rbf());
        assert_eq!(a, b);
    }

    #[test]
    fn test_dual_constraints_hold() {
        let x = standardized(8);
        let y = vec![3.0, 9.0, 4.0, 12.0, 8.0, 15.0, 11.0, 20.0];
        let params = SvrParams {
            c: 2.0,
            ..SvrParams::linear()
        };
        let model = SupportVectorRegressor::fit(&x, &y, &params);

        assert!(model.coef.iter().all(|b| b.abs() <= params.c + 1e-9));
        assert!(model.coef.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn test_pair_step_respects_box() {
        let t = pair_step(0.0, 0.0, -1e6, 1.0, 5.0, 0.01);
        assert!((t - 5.0).abs() < 1e-12);
    }
}
