//! Initial parameter estimation for the optimizer.
//!
//! Provides reasonable starting values by:
//! 1. Estimating the trend by least squares (or the mean drift of the
//!    differenced series)
//! 2. Differencing and detrending the series
//! 3. Estimating AR coefficients via Burg, with Yule-Walker as fallback
//! 4. Estimating MA coefficients from AR residuals (innovations algorithm)
//! 5. Falling back to zeros on failure

use nalgebra::{DMatrix, DVector};

use crate::error::{ArimaError, Result};
use crate::params::{flat_len, trend_value};
use crate::types::{ArimaConfig, Trend};

/// Apply regular differencing d times.
pub fn difference(y: &[f64], d: usize) -> Vec<f64> {
    let mut out = y.to_vec();
    for _ in 0..d {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Compute sample autocovariance at lag k.
fn autocovariance(y: &[f64], k: usize) -> f64 {
    let n = y.len();
    if k >= n {
        return 0.0;
    }
    let mean: f64 = y.iter().sum::<f64>() / n as f64;
    let mut sum = 0.0;
    for i in 0..n - k {
        sum += (y[i] - mean) * (y[i + k] - mean);
    }
    sum / n as f64
}

/// Estimate AR coefficients via Burg's maximum entropy method.
///
/// Every stage yields a stable AR polynomial.
fn burg_ar(y: &[f64], p: usize) -> Option<Vec<f64>> {
    if p == 0 {
        return Some(vec![]);
    }
    let n = y.len();
    if n <= p {
        return None;
    }

    let mean: f64 = y.iter().sum::<f64>() / n as f64;

    let mut ef: Vec<f64> = y.iter().map(|&v| v - mean).collect();
    let mut eb: Vec<f64> = ef.clone();

    let mut a = vec![0.0; p];

    for k in 0..p {
        let mut num = 0.0;
        let mut den = 0.0;
        for t in (k + 1)..n {
            num += ef[t] * eb[t - 1];
            den += ef[t] * ef[t] + eb[t - 1] * eb[t - 1];
        }
        if den.abs() < 1e-15 {
            return None;
        }
        let kk = 2.0 * num / den;
        if kk.abs() >= 1.0 {
            return None;
        }

        // Levinson recursion
        let a_prev: Vec<f64> = a[..k].to_vec();
        a[k] = kk;
        for j in 0..k {
            a[j] = a_prev[j] - kk * a_prev[k - 1 - j];
        }

        // Reverse order so eb[t-1] is read before it is overwritten.
        for t in ((k + 1)..n).rev() {
            let ef_t = ef[t];
            ef[t] = ef_t - kk * eb[t - 1];
            eb[t] = eb[t - 1] - kk * ef_t;
        }
    }

    Some(a)
}

/// Estimate AR coefficients via Yule-Walker equations (Levinson-Durbin).
fn yule_walker(y: &[f64], p: usize) -> Option<Vec<f64>> {
    if p == 0 {
        return Some(vec![]);
    }
    if y.len() <= p {
        return None;
    }

    let gammas: Vec<f64> = (0..=p).map(|k| autocovariance(y, k)).collect();
    if gammas[0].abs() < 1e-15 {
        return None;
    }

    let mut phi = vec![0.0; p];
    let mut phi_prev = vec![0.0; p];
    let mut var = gammas[0];

    for k in 0..p {
        let mut num = gammas[k + 1];
        for j in 0..k {
            num -= phi[j] * gammas[k - j];
        }
        if var.abs() < 1e-15 {
            return None;
        }
        let lambda = num / var;

        phi_prev.copy_from_slice(&phi);
        phi[k] = lambda;
        for j in 0..k {
            phi[j] = phi_prev[j] - lambda * phi_prev[k - 1 - j];
        }
        var *= 1.0 - lambda * lambda;
    }

    Some(phi)
}

/// Estimate MA coefficients via the innovations algorithm (Brockwell & Davis, 5.2).
fn estimate_ma_from_residuals(residuals: &[f64], q: usize) -> Vec<f64> {
    if q == 0 || residuals.len() <= q {
        return vec![0.0; q];
    }

    let gamma: Vec<f64> = (0..=q).map(|k| autocovariance(residuals, k)).collect();
    if gamma[0].abs() < 1e-15 {
        return vec![0.0; q];
    }

    let m = q;
    let mut theta = vec![vec![0.0; m]; m + 1];
    let mut v = vec![0.0; m + 1];
    v[0] = gamma[0];

    for i in 1..=m {
        for k in 0..i {
            let mut sum = gamma[i - k];
            for j in 0..k {
                sum -= theta[k][k - 1 - j] * theta[i][i - 1 - j] * v[j];
            }
            theta[i][i - 1 - k] = if v[k].abs() > 1e-15 { sum / v[k] } else { 0.0 };
        }
        v[i] = gamma[0];
        for j in 0..i {
            v[i] -= theta[i][i - 1 - j].powi(2) * v[j];
        }
        v[i] = v[i].max(1e-15);
    }

    (0..q).map(|k| theta[m][k].clamp(-0.99, 0.99)).collect()
}

/// Compute AR residuals given coefficients.
fn ar_residuals(y: &[f64], ar: &[f64]) -> Vec<f64> {
    let p = ar.len();
    if p == 0 {
        return y.to_vec();
    }
    (p..y.len())
        .map(|t| {
            let pred: f64 = ar.iter().enumerate().map(|(j, &a)| a * y[t - 1 - j]).sum();
            y[t] - pred
        })
        .collect()
}

/// Least-squares trend coefficients on the undifferenced series.
///
/// For d >= 1 only terms of power >= d survive differencing; the single
/// admissible case (drift with d = 1) is estimated by the mean of the
/// differenced series.
fn estimate_trend(endog: &[f64], diffed: &[f64], config: &ArimaConfig) -> Vec<f64> {
    let kt = config.trend.k_trend();
    if kt == 0 {
        return vec![];
    }
    if config.order.d > 0 {
        let drift = if config.trend == Trend::Linear && config.order.d == 1 && !diffed.is_empty() {
            diffed.iter().sum::<f64>() / diffed.len() as f64
        } else {
            0.0
        };
        return match config.trend {
            Trend::Linear => vec![drift],
            Trend::Both => vec![0.0, drift],
            _ => vec![0.0; kt],
        };
    }

    let n = endog.len();
    let x = DMatrix::from_fn(n, kt, |t, j| match (config.trend, j) {
        (Trend::Linear, _) | (Trend::Both, 1) => (t + 1) as f64,
        _ => 1.0,
    });
    let y = DVector::from_column_slice(endog);
    let xtx = x.transpose() * &x;
    let xty = x.transpose() * y;
    match xtx.lu().solve(&xty) {
        Some(beta) if beta.iter().all(|b| b.is_finite()) => beta.iter().copied().collect(),
        _ => vec![0.0; kt],
    }
}

/// Compute starting parameters for an ARIMA model.
///
/// Returns a flat parameter vector in the layout expected by `ArimaParams::from_flat`:
/// `[trend | ar(p) | ma(q)]`.
pub fn compute_start_params(endog: &[f64], config: &ArimaConfig) -> Result<Vec<f64>> {
    let order = &config.order;
    let (p, q) = (order.p, order.q);
    let n_params = flat_len(config);

    let diffed = difference(endog, order.d);
    let trend = estimate_trend(endog, &diffed, config);

    if diffed.len() < 3 {
        let mut params = trend;
        params.resize(n_params, 0.0);
        return Ok(params);
    }

    // Remove the estimated trend so the ARMA estimates see zero-mean noise.
    let detrended: Vec<f64> = if order.d == 0 {
        endog
            .iter()
            .enumerate()
            .map(|(t, &y)| y - trend_value(config.trend, &trend, t))
            .collect()
    } else {
        diffed.clone()
    };

    let mut params = trend;

    let ar = burg_ar(&detrended, p)
        .or_else(|| yule_walker(&detrended, p))
        .unwrap_or_else(|| vec![0.0; p]);
    params.extend_from_slice(&ar);

    let residuals = ar_residuals(&detrended, &ar);
    params.extend(estimate_ma_from_residuals(&residuals, q));

    if params.len() != n_params {
        return Err(ArimaError::DataError(format!(
            "failed to build start params: expected length {}, got {}",
            n_params,
            params.len()
        )));
    }
    Ok(params)
}
