use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::error::{ArimaError, ForecastError, Result};
use crate::initialization::KalmanInit;
use crate::kalman::{kalman_filter, KalmanFilterOutput};
use crate::params::ArimaParams;
use crate::registry::{ModelReference, ModelRegistry};
use crate::series::Series;
use crate::state_space::StateSpace;
use crate::types::ArimaConfig;

/// H-step ahead forecast result.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    /// Forecast means E[y_{n+h}] for h = 1..steps.
    pub mean: Vec<f64>,
    /// Forecast variances Var[y_{n+h}].
    pub variance: Vec<f64>,
    /// Lower confidence interval bounds.
    pub ci_lower: Vec<f64>,
    /// Upper confidence interval bounds.
    pub ci_upper: Vec<f64>,
}

/// Residual diagnostics output.
#[derive(Debug, Clone)]
pub struct ResidualOutput {
    /// Raw innovations v_t.
    pub residuals: Vec<f64>,
    /// Standardized residuals v_t / sqrt(F_t * scale).
    pub standardized_residuals: Vec<f64>,
}

fn normal_quantile(p: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| ArimaError::DataError(e.to_string()))?;
    Ok(normal.inverse_cdf(p))
}

/// Compute h-step ahead forecast from the final Kalman filter state.
///
/// Uses state-space forward propagation:
///   y_hat_h = Z' * a_h + d_{n+h}
///   F_h     = Z' * P_h * Z * scale
///   a_{h+1} = T * a_h
///   P_{h+1} = T * P_h * T' + R * Q * R'
///
/// `n_obs` is the length of the filtered sample, so the trend continues
/// from where the data ends.
pub fn forecast(
    ss: &StateSpace,
    filter_output: &KalmanFilterOutput,
    n_obs: usize,
    steps: usize,
    alpha: f64,
) -> Result<ForecastResult> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(ArimaError::DataError(format!(
            "alpha must lie in (0, 1), got {}",
            alpha
        )));
    }

    let z_alpha = normal_quantile(1.0 - alpha / 2.0)?;

    let z = &ss.design;
    let t_mat = &ss.transition;
    let rqr = &ss.selection * &ss.state_cov * ss.selection.transpose();
    let scale = filter_output.scale;

    // Start from a_{n+1|n}, P_{n+1|n}
    let mut a = filter_output.predicted_state.clone();
    let mut p = filter_output.predicted_cov.clone();

    let mut mean = Vec::with_capacity(steps);
    let mut variance = Vec::with_capacity(steps);
    let mut ci_lower = Vec::with_capacity(steps);
    let mut ci_upper = Vec::with_capacity(steps);

    for h in 0..steps {
        let y_hat = z.dot(&a) + ss.obs_intercept(n_obs + h);

        let p_z = &p * z;
        let f_h = (z.dot(&p_z) * scale).max(0.0);
        let se = f_h.sqrt();

        mean.push(y_hat);
        variance.push(f_h);
        ci_lower.push(y_hat - z_alpha * se);
        ci_upper.push(y_hat + z_alpha * se);

        a = t_mat * &a;
        p = t_mat * &p * t_mat.transpose() + &rqr;
    }

    Ok(ForecastResult {
        mean,
        variance,
        ci_lower,
        ci_upper,
    })
}

/// Compute residuals and standardized residuals from Kalman filter output.
pub fn compute_residuals(filter_output: &KalmanFilterOutput) -> ResidualOutput {
    let scale = filter_output.scale;
    let standardized = filter_output
        .innovations
        .iter()
        .zip(filter_output.innovation_vars.iter())
        .map(|(&v, &f)| if f * scale > 0.0 { v / (f * scale).sqrt() } else { 0.0 })
        .collect();

    ResidualOutput {
        residuals: filter_output.innovations.clone(),
        standardized_residuals: standardized,
    }
}

fn run_filter(
    endog: &[f64],
    config: &ArimaConfig,
    params: &ArimaParams,
) -> Result<(StateSpace, KalmanFilterOutput)> {
    let ss = StateSpace::new(config, params)?;
    let init = KalmanInit::from_config(&ss, config);
    let fo = kalman_filter(endog, &ss, &init)?;
    Ok((ss, fo))
}

/// Run forecast pipeline: build state space → filter → forecast.
pub fn forecast_pipeline(
    endog: &[f64],
    config: &ArimaConfig,
    params: &ArimaParams,
    steps: usize,
    alpha: f64,
) -> Result<ForecastResult> {
    let (ss, fo) = run_filter(endog, config, params)?;
    forecast(&ss, &fo, endog.len(), steps, alpha)
}

/// Run residuals pipeline: build state space → filter → residuals.
pub fn residuals_pipeline(
    endog: &[f64],
    config: &ArimaConfig,
    params: &ArimaParams,
) -> Result<ResidualOutput> {
    let (_, fo) = run_filter(endog, config, params)?;
    Ok(compute_residuals(&fo))
}

/// One-step-ahead in-sample predictions for every observation, followed by
/// `horizon` out-of-sample forecast means.
pub fn predict(
    endog: &[f64],
    config: &ArimaConfig,
    params: &ArimaParams,
    horizon: usize,
) -> Result<Vec<f64>> {
    let (ss, fo) = run_filter(endog, config, params)?;
    let ahead = forecast(&ss, &fo, endog.len(), horizon, 0.05)?;
    let mut out = fo.predictions;
    out.extend(ahead.mean);
    Ok(out)
}

/// Reload a published model and forecast with it.
///
/// Returns `len(series) + horizon` values: the model's one-step prediction
/// for each observed point, then `horizon` forecasts past the last one.
pub fn forecast_from_registry(
    registry: &dyn ModelRegistry,
    reference: &ModelReference,
    series: &Series,
    horizon: usize,
) -> std::result::Result<Vec<f64>, ForecastError> {
    if horizon == 0 {
        return Err(ForecastError::InvalidHorizon);
    }

    let artifact = registry.load_model(reference)?;
    let config = artifact.config();
    let params = ArimaParams::from_flat(&artifact.params, &config)?;

    debug!(%reference, order = %artifact.order, horizon, "forecasting with reloaded model");
    Ok(predict(series.values(), &config, &params, horizon)?)
}
