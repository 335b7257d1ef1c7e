//! Parameter inference at the maximum likelihood estimate.
//!
//! Standard errors come from the inverse of the observed information,
//! `-H^{-1}`, where `H` is a central finite-difference Hessian of the
//! (profile) log-likelihood in constrained space. sigma2 is concentrated
//! out of the likelihood, so its variance uses the asymptotic `2σ⁴/n`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{ArimaError, Result};
use crate::optimizer::evaluate;
use crate::params::param_names;
use crate::types::{ArimaConfig, FitResult};

/// One estimated coefficient with its Wald statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub name: String,
    pub value: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
}

/// Two-sided p-value of a standard normal statistic.
pub fn two_sided_p_value(z: f64) -> Result<f64> {
    if !z.is_finite() {
        return Ok(f64::NAN);
    }
    let normal =
        Normal::new(0.0, 1.0).map_err(|e| ArimaError::DataError(e.to_string()))?;
    Ok(2.0 * (1.0 - normal.cdf(z.abs())))
}

/// Central finite-difference Hessian of the log-likelihood at `theta`.
fn loglike_hessian(endog: &[f64], config: &ArimaConfig, theta: &[f64]) -> Result<DMatrix<f64>> {
    let n = theta.len();
    let steps: Vec<f64> = theta.iter().map(|t| 1e-4 * t.abs().max(1.0)).collect();

    let ll = |point: &[f64]| -> Result<f64> {
        let out = evaluate(endog, config, point)?;
        if out.loglike.is_finite() {
            Ok(out.loglike)
        } else {
            Err(ArimaError::NonFinite("log-likelihood in Hessian"))
        }
    };

    let f0 = ll(theta)?;
    let mut h = DMatrix::<f64>::zeros(n, n);
    let mut work = theta.to_vec();

    for i in 0..n {
        let hi = steps[i];
        work[i] = theta[i] + hi;
        let fp = ll(&work)?;
        work[i] = theta[i] - hi;
        let fm = ll(&work)?;
        work[i] = theta[i];
        h[(i, i)] = (fp - 2.0 * f0 + fm) / (hi * hi);

        for j in 0..i {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| -> Result<f64> {
                work[i] = theta[i] + si * hi;
                work[j] = theta[j] + sj * hj;
                let v = ll(&work);
                work[i] = theta[i];
                work[j] = theta[j];
                v
            };
            let fpp = corner(1.0, 1.0)?;
            let fpm = corner(1.0, -1.0)?;
            let fmp = corner(-1.0, 1.0)?;
            let fmm = corner(-1.0, -1.0)?;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }

    if h.iter().any(|v| !v.is_finite()) {
        return Err(ArimaError::NonFinite("Hessian"));
    }
    Ok(h)
}

/// Wald inference for every parameter of a fitted model, sigma2 last.
///
/// A singular observed information matrix is a numerical failure. A
/// negative diagonal of its inverse (the MLE sits on a saddle or at a
/// constraint boundary) yields NaN statistics for that coefficient only.
pub fn param_estimates(
    endog: &[f64],
    config: &ArimaConfig,
    fit: &FitResult,
) -> Result<Vec<ParamEstimate>> {
    let names = param_names(config);
    let theta = &fit.params;

    let variances: Vec<f64> = if theta.is_empty() {
        vec![]
    } else {
        let h = loglike_hessian(endog, config, theta)?;
        let info = -h;
        let cov = info.try_inverse().ok_or_else(|| {
            ArimaError::SingularMatrix("observed information is not invertible".to_string())
        })?;
        (0..theta.len()).map(|i| cov[(i, i)]).collect()
    };

    let mut estimates = Vec::with_capacity(names.len());
    for ((name, &value), &var) in names.iter().zip(theta.iter()).zip(variances.iter()) {
        estimates.push(wald(name, value, var)?);
    }

    let sigma2 = fit.scale;
    let n_eff = fit.n_obs_effective.max(1) as f64;
    estimates.push(wald("sigma2", sigma2, 2.0 * sigma2 * sigma2 / n_eff)?);

    Ok(estimates)
}

fn wald(name: &str, value: f64, variance: f64) -> Result<ParamEstimate> {
    let std_error = if variance >= 0.0 { variance.sqrt() } else { f64::NAN };
    let z = value / std_error;
    Ok(ParamEstimate {
        name: name.to_string(),
        value,
        std_error,
        z,
        p_value: two_sided_p_value(z)?,
    })
}
