use nalgebra::{DMatrix, DVector};

use crate::error::{ArimaError, Result};
use crate::initialization::KalmanInit;
use crate::state_space::StateSpace;

/// Output of the Kalman filter loglikelihood computation.
#[derive(Debug, Clone)]
pub struct KalmanOutput {
    /// Log-likelihood value.
    pub loglike: f64,
    /// Estimated (concentrated) scale: sigma2_hat.
    pub scale: f64,
    /// Effective number of observations (n - burn).
    pub n_obs_effective: usize,
}

/// Full filter pass, kept for prediction and forecasting.
#[derive(Debug, Clone)]
pub struct KalmanFilterOutput {
    pub loglike: f64,
    pub scale: f64,
    pub n_obs_effective: usize,
    /// Innovation sequence v_t.
    pub innovations: Vec<f64>,
    /// Unscaled innovation variances F_t.
    pub innovation_vars: Vec<f64>,
    /// One-step-ahead predictions E[y_t | y_0..y_{t-1}].
    pub predictions: Vec<f64>,
    /// a_{n|n-1}: state prediction one step past the sample.
    pub predicted_state: DVector<f64>,
    /// P_{n|n-1}: its (unscaled) covariance.
    pub predicted_cov: DMatrix<f64>,
}

/// Compute the concentrated log-likelihood via the Kalman filter.
pub fn kalman_loglike(endog: &[f64], ss: &StateSpace, init: &KalmanInit) -> Result<KalmanOutput> {
    let out = kalman_filter(endog, ss, init)?;
    Ok(KalmanOutput {
        loglike: out.loglike,
        scale: out.scale,
        n_obs_effective: out.n_obs_effective,
    })
}

/// Run the Harvey-form Kalman filter over `endog`.
///
///   - a_{t|t-1}, P_{t|t-1} are the predicted state/cov at time t
///   - Innovation: v_t = y_t - Z' * a_{t|t-1} - d_t
///   - Update: a_{t|t} = a_{t|t-1} + K * v_t (Joseph-form covariance)
///   - Predict: a_{t+1|t} = T * a_{t|t}
///
/// The scale is concentrated out:
///   sigma2_hat = (1/n_eff) * sum(v_t^2 / F_t)
///   loglike = -n_eff/2 * ln(2pi) - n_eff/2 * ln(sigma2_hat) - n_eff/2 - 0.5 * sum(ln F_t)
pub fn kalman_filter(
    endog: &[f64],
    ss: &StateSpace,
    init: &KalmanInit,
) -> Result<KalmanFilterOutput> {
    let n = endog.len();
    let k = ss.k_states;
    let burn = init.loglikelihood_burn;

    if n <= burn {
        return Err(ArimaError::DataError(format!(
            "not enough observations: n={} <= burn={}",
            n, burn
        )));
    }

    let n_eff = n - burn;

    let mut a = init.initial_state.clone();
    let mut p = init.initial_state_cov.clone();

    let t_mat = &ss.transition;
    let z = &ss.design;

    // R*Q*R' is time-invariant.
    let rqr = &ss.selection * &ss.state_cov * ss.selection.transpose();

    let mut sum_log_f = 0.0;
    let mut sum_v2_f = 0.0;
    let mut innovations = Vec::with_capacity(n);
    let mut innovation_vars = Vec::with_capacity(n);
    let mut predictions = Vec::with_capacity(n);

    let eye = DMatrix::<f64>::identity(k, k);

    for (t, &y) in endog.iter().enumerate() {
        let y_hat = z.dot(&a) + ss.obs_intercept(t);
        let v_t = y - y_hat;
        predictions.push(y_hat);
        innovations.push(v_t);

        // F_t = Z' * P_{t|t-1} * Z (scalar, univariate)
        let p_z = &p * z;
        let f_t: f64 = z.dot(&p_z);
        innovation_vars.push(f_t);

        if f_t > 0.0 {
            let k_gain = &p_z / f_t;
            let a_updated = &a + &k_gain * v_t;

            // Joseph form: P_{t|t} = (I - K*Z') * P_{t|t-1} * (I - K*Z')'
            let i_kz = &eye - &k_gain * z.transpose();
            let p_updated = &i_kz * &p * i_kz.transpose();

            a = t_mat * &a_updated;
            p = t_mat * &p_updated * t_mat.transpose() + &rqr;

            if t >= burn {
                sum_log_f += f_t.ln();
                sum_v2_f += v_t * v_t / f_t;
            }
        } else {
            // Degenerate prediction variance: no information in y_t.
            a = t_mat * &a;
            p = t_mat * &p * t_mat.transpose() + &rqr;
        }
    }

    let nf = n_eff as f64;
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();
    let scale = sum_v2_f / nf;
    let loglike =
        -0.5 * nf * ln_2pi - 0.5 * nf * scale.max(1e-300).ln() - 0.5 * nf - 0.5 * sum_log_f;

    Ok(KalmanFilterOutput {
        loglike,
        scale,
        n_obs_effective: n_eff,
        innovations,
        innovation_vars,
        predictions,
        predicted_state: a,
        predicted_cov: p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ArimaParams;
    use crate::types::{ArimaConfig, ArimaOrder, Trend};

    fn lcg_series(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng_state = seed;
        let mut y = vec![0.0; n];
        for t in 0..n {
            rng_state = rng_state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1);
            let e = (rng_state >> 33) as f64 / (1u64 << 31) as f64 - 0.5;
            y[t] = if t > 0 { phi * y[t - 1] + e } else { e };
        }
        y
    }

    fn build(p: usize, d: usize, q: usize, ar: &[f64], ma: &[f64]) -> (StateSpace, ArimaConfig) {
        let config = ArimaConfig::for_candidate(ArimaOrder::new(p, d, q), Trend::None);
        let params = ArimaParams {
            trend_coeffs: vec![],
            ar_coeffs: ar.to_vec(),
            ma_coeffs: ma.to_vec(),
        };
        (StateSpace::new(&config, &params).unwrap(), config)
    }

    #[test]
    fn test_ar1_exact_loglike() {
        // Exact AR(1) likelihood, scale concentrated out:
        // F_0 = 1/(1-phi^2), v_0 = y_0; F_t = 1, v_t = y_t - phi*y_{t-1}
        let phi = 0.6;
        let y = lcg_series(200, phi, 42);
        let (ss, config) = build(1, 0, 0, &[phi], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        let out = kalman_loglike(&y, &ss, &init).unwrap();

        let n = y.len() as f64;
        let f0 = 1.0 / (1.0 - phi * phi);
        let mut ssq = y[0] * y[0] / f0;
        for t in 1..y.len() {
            let v = y[t] - phi * y[t - 1];
            ssq += v * v;
        }
        let sigma2 = ssq / n;
        let expected = -0.5 * n * (2.0 * std::f64::consts::PI).ln()
            - 0.5 * n * sigma2.ln()
            - 0.5 * n
            - 0.5 * f0.ln();

        assert_eq!(out.n_obs_effective, 200);
        assert!((out.scale - sigma2).abs() < 1e-10);
        assert!(
            (out.loglike - expected).abs() < 1e-8,
            "loglike {} vs closed form {}",
            out.loglike,
            expected
        );
    }

    #[test]
    fn test_random_walk_predicts_previous_value() {
        let y: Vec<f64> = lcg_series(50, 1.0, 7).iter().map(|v| v + 100.0).collect();
        let (ss, config) = build(0, 1, 0, &[], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        let out = kalman_filter(&y, &ss, &init).unwrap();

        assert_eq!(out.n_obs_effective, 49);
        assert_eq!(out.predictions.len(), 50);
        for t in 1..y.len() {
            assert!(
                (out.predictions[t] - y[t - 1]).abs() < 1e-3,
                "t={}: prediction {} vs previous {}",
                t,
                out.predictions[t],
                y[t - 1]
            );
        }
        // One step past the sample is the last observation.
        let next = ss.design.dot(&out.predicted_state);
        assert!((next - y[49]).abs() < 1e-3);
    }

    #[test]
    fn test_innovations_length() {
        let y = lcg_series(80, 0.4, 3);
        let (ss, config) = build(1, 0, 1, &[0.4], &[0.2]);
        let init = KalmanInit::from_config(&ss, &config);
        let out = kalman_filter(&y, &ss, &init).unwrap();
        assert_eq!(out.innovations.len(), 80);
        assert_eq!(out.innovation_vars.len(), 80);
        assert!(out.innovation_vars.iter().all(|&f| f > 0.0));
    }

    #[test]
    fn test_too_short_series_errors() {
        let (ss, config) = build(0, 2, 0, &[], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        assert!(kalman_loglike(&[1.0, 2.0], &ss, &init).is_err());
    }
}
