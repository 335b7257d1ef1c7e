//! Candidate fitter: one grid point, one classified outcome.
//!
//! `fit` is a pure function of the series, the order and the trend. It
//! screens structurally invalid candidates before touching the optimizer,
//! runs the maximum-likelihood fit with stationarity and invertibility
//! enforced, and computes Wald statistics for the estimates. Engine errors
//! are sorted into the two recoverable failure kinds; anything else is
//! returned as `Err` for the caller to propagate.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ArimaError, FitFailure, Result};
use crate::inference::{param_estimates, ParamEstimate};
use crate::optimizer::{self, Method};
use crate::params::{ArimaParams, flat_len};
use crate::series::Series;
use crate::start_params::difference;
use crate::types::{ArimaConfig, ArimaOrder, Trend};

/// Outcome of a single candidate fit.
pub type FitOutcome = std::result::Result<FittedModel, FitFailure>;

/// Optimizer settings shared by every candidate in a search.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub method: Method,
    pub maxiter: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            maxiter: 500,
        }
    }
}

/// A successfully fitted candidate.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub order: ArimaOrder,
    pub trend: Trend,
    /// Constrained parameters, layout `[trend | ar | ma]`.
    pub params: Vec<f64>,
    pub loglike: f64,
    /// Concentrated innovation variance sigma2.
    pub scale: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_obs: usize,
    pub n_obs_effective: usize,
    pub n_iter: u64,
    pub converged: bool,
    pub method: String,
    /// Per-parameter estimates, sigma2 last.
    pub estimates: Vec<ParamEstimate>,
}

impl FittedModel {
    pub fn config(&self) -> ArimaConfig {
        ArimaConfig::for_candidate(self.order, self.trend)
    }

    pub fn arima_params(&self) -> Result<ArimaParams> {
        ArimaParams::from_flat(&self.params, &self.config())
    }

    /// p-values keyed by parameter name.
    pub fn p_values(&self) -> BTreeMap<String, f64> {
        self.estimates
            .iter()
            .map(|e| (e.name.clone(), e.p_value))
            .collect()
    }
}

/// Fit one candidate order to the series.
pub fn fit(series: &Series, order: ArimaOrder, trend: Trend, opts: &FitOptions) -> Result<FitOutcome> {
    if let Err(failure) = check_specification(series.values(), order, trend) {
        debug!(%order, %failure, "candidate rejected");
        return Ok(Err(failure));
    }

    let config = ArimaConfig::for_candidate(order, trend);
    let endog = series.values();

    let result = match optimizer::fit(endog, &config, opts.method, opts.maxiter) {
        Ok(r) => r,
        Err(e) => return classify(order, e),
    };
    if !result.aic.is_finite() {
        return Ok(Err(FitFailure::numerical("non-finite AIC")));
    }

    let estimates = match param_estimates(endog, &config, &result) {
        Ok(est) => est,
        Err(e) => return classify(order, e),
    };

    debug!(
        %order,
        aic = result.aic,
        loglike = result.loglike,
        n_iter = result.n_iter,
        converged = result.converged,
        "candidate fitted"
    );

    Ok(Ok(FittedModel {
        order,
        trend,
        params: result.params,
        loglike: result.loglike,
        scale: result.scale,
        aic: result.aic,
        bic: result.bic,
        n_obs: result.n_obs,
        n_obs_effective: result.n_obs_effective,
        n_iter: result.n_iter,
        converged: result.converged,
        method: result.method,
        estimates,
    }))
}

fn classify(order: ArimaOrder, e: ArimaError) -> Result<FitOutcome> {
    match e.classify() {
        Some(kind) => {
            debug!(%order, %kind, error = %e, "candidate failed");
            Ok(Err(FitFailure {
                kind,
                message: e.to_string(),
            }))
        }
        None => Err(e),
    }
}

/// Structural checks that make a candidate inapplicable to the series.
fn check_specification(
    values: &[f64],
    order: ArimaOrder,
    trend: Trend,
) -> std::result::Result<(), FitFailure> {
    if let Some(power) = trend.lowest_power() {
        if power < order.d {
            return Err(FitFailure::invalid(format!(
                "trend '{}' is annihilated by differencing of order {}",
                trend, order.d
            )));
        }
    }

    let config = ArimaConfig::for_candidate(order, trend);
    let needed = order.d + (flat_len(&config) + 1).max(order.k_states() + 1);
    if values.len() <= needed {
        return Err(FitFailure::invalid(format!(
            "{} observations cannot support order {} (need more than {})",
            values.len(),
            order,
            needed
        )));
    }

    let diffed = difference(values, order.d);
    let n = diffed.len() as f64;
    let mean = diffed.iter().sum::<f64>() / n;
    let var = diffed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let magnitude = values.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    if var <= (1e-10 * magnitude).powi(2) {
        return Err(FitFailure::invalid(format!(
            "series has no variance after differencing {} time(s)",
            order.d
        )));
    }

    Ok(())
}
