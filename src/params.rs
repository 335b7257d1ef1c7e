use serde::{Deserialize, Serialize};

use crate::error::{ArimaError, Result};
use crate::types::{ArimaConfig, Trend};

/// Unpacked ARIMA parameters.
///
/// Layout (flat vector order): `[trend(k_trend) | ar(p) | ma(q)]`.
///
/// sigma2 is concentrated out of the likelihood, so it never appears in the
/// optimization vector, but it is still counted in AIC's k.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaParams {
    pub trend_coeffs: Vec<f64>,
    pub ar_coeffs: Vec<f64>,
    pub ma_coeffs: Vec<f64>,
}

/// Length of the flat parameter vector seen by the optimizer.
pub fn flat_len(config: &ArimaConfig) -> usize {
    config.trend.k_trend() + config.order.p + config.order.q
}

impl ArimaParams {
    /// Unpack a flat parameter vector into structured fields.
    pub fn from_flat(flat: &[f64], config: &ArimaConfig) -> Result<Self> {
        let expected = flat_len(config);
        if flat.len() != expected {
            return Err(ArimaError::ParamLengthMismatch {
                expected,
                got: flat.len(),
            });
        }

        let kt = config.trend.k_trend();
        let p = config.order.p;
        let q = config.order.q;

        let (trend, rest) = flat.split_at(kt);
        let (ar, rest) = rest.split_at(p);
        let (ma, _) = rest.split_at(q);

        Ok(Self {
            trend_coeffs: trend.to_vec(),
            ar_coeffs: ar.to_vec(),
            ma_coeffs: ma.to_vec(),
        })
    }

    /// Number of estimated parameters for AIC/BIC, sigma2 included.
    pub fn n_estimated_params(config: &ArimaConfig) -> usize {
        flat_len(config) + 1
    }
}

/// Evaluate a trend polynomial with the given coefficients at (zero-based)
/// time index `t`. The linear term uses a one-based time index.
pub fn trend_value(trend: Trend, coeffs: &[f64], t: usize) -> f64 {
    let time = (t + 1) as f64;
    match (trend, coeffs) {
        (Trend::Constant, [c, ..]) => *c,
        (Trend::Linear, [b, ..]) => b * time,
        (Trend::Both, [c, b, ..]) => c + b * time,
        _ => 0.0,
    }
}

/// Names of the flat parameters, followed by `sigma2`.
///
/// Matches the labels used in fit summaries and logged p-value metrics:
/// `const`, `drift`, `ar.L1..`, `ma.L1..`, `sigma2`.
pub fn param_names(config: &ArimaConfig) -> Vec<String> {
    let mut names = Vec::with_capacity(ArimaParams::n_estimated_params(config));
    match config.trend {
        Trend::None => {}
        Trend::Constant => names.push("const".to_string()),
        Trend::Linear => names.push("drift".to_string()),
        Trend::Both => {
            names.push("const".to_string());
            names.push("drift".to_string());
        }
    }
    names.extend((1..=config.order.p).map(|i| format!("ar.L{i}")));
    names.extend((1..=config.order.q).map(|i| format!("ma.L{i}")));
    names.push("sigma2".to_string());
    names
}

// ---------------------------------------------------------------------------
// Monahan (1984) / Jones (1980) parameter transformations
// ---------------------------------------------------------------------------

/// Transform unconstrained parameters to stationary AR coefficients.
///
/// Each x[k] is mapped to a partial autocorrelation `x / sqrt(1 + x^2)` in
/// (-1, 1), then the Levinson-Durbin recursion turns the PACF into AR
/// coefficients.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let n = unconstrained.len();
    if n == 0 {
        return vec![];
    }

    let pacf: Vec<f64> = unconstrained
        .iter()
        .map(|&x| x / (1.0 + x * x).sqrt())
        .collect();

    let mut y = vec![vec![0.0; n]; n];
    for k in 0..n {
        for i in 0..k {
            y[k][i] = y[k - 1][i] + pacf[k] * y[k - 1][k - i - 1];
        }
        y[k][k] = pacf[k];
    }

    y[n - 1].iter().map(|&v| -v).collect()
}

/// Inverse transform: stationary AR coefficients → unconstrained parameters.
pub fn unconstrain_stationary(constrained: &[f64]) -> Vec<f64> {
    let n = constrained.len();
    if n == 0 {
        return vec![];
    }

    let mut y = vec![vec![0.0; n]; n];
    for (i, &c) in constrained.iter().enumerate() {
        y[n - 1][i] = -c;
    }

    for k in (1..n).rev() {
        let rk = y[k][k];
        let denom = (1.0 - rk * rk).max(1e-15);
        for i in 0..k {
            y[k - 1][i] = (y[k][i] - rk * y[k][k - i - 1]) / denom;
        }
    }

    (0..n)
        .map(|k| {
            let r = y[k][k];
            r / (1.0 - r * r).max(1e-15).sqrt()
        })
        .collect()
}

/// Transform unconstrained parameters to invertible MA coefficients.
pub fn constrain_invertible(unconstrained: &[f64]) -> Vec<f64> {
    constrain_stationary(unconstrained)
        .into_iter()
        .map(|x| -x)
        .collect()
}

/// Inverse: invertible MA coefficients → unconstrained parameters.
pub fn unconstrain_invertible(constrained: &[f64]) -> Vec<f64> {
    let negated: Vec<f64> = constrained.iter().map(|&x| -x).collect();
    unconstrain_stationary(&negated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArimaOrder;

    fn make_config(p: usize, q: usize, trend: Trend) -> ArimaConfig {
        ArimaConfig {
            order: ArimaOrder::new(p, 0, q),
            trend,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_flat_layout() {
        let config = make_config(2, 1, Trend::Constant);
        let flat = vec![100.0, 0.5, -0.3, 0.2];
        let params = ArimaParams::from_flat(&flat, &config).unwrap();
        assert_eq!(params.trend_coeffs, vec![100.0]);
        assert_eq!(params.ar_coeffs, vec![0.5, -0.3]);
        assert_eq!(params.ma_coeffs, vec![0.2]);
    }

    #[test]
    fn test_from_flat_length_mismatch() {
        let config = make_config(1, 0, Trend::None);
        let err = ArimaParams::from_flat(&[0.5, 0.3], &config).unwrap_err();
        assert!(matches!(
            err,
            ArimaError::ParamLengthMismatch { expected: 1, got: 2 }
        ));
    }

    #[test]
    fn test_n_estimated_params_counts_sigma2() {
        // ARIMA(2,0,1) with trend='c': 1 + 2 + 1 + 1 = 5
        let config = make_config(2, 1, Trend::Constant);
        assert_eq!(ArimaParams::n_estimated_params(&config), 5);
    }

    #[test]
    fn test_param_names() {
        let config = make_config(2, 1, Trend::Constant);
        assert_eq!(
            param_names(&config),
            vec!["const", "ar.L1", "ar.L2", "ma.L1", "sigma2"]
        );
        let config = make_config(0, 0, Trend::Both);
        assert_eq!(param_names(&config), vec!["const", "drift", "sigma2"]);
    }

    #[test]
    fn test_trend_value() {
        let coeffs = [2.0, 0.5];
        assert!((trend_value(Trend::Both, &coeffs, 0) - 2.5).abs() < 1e-12);
        assert!((trend_value(Trend::Both, &coeffs, 3) - 4.0).abs() < 1e-12);
        assert!((trend_value(Trend::Constant, &coeffs[..1], 7) - 2.0).abs() < 1e-12);
        assert!((trend_value(Trend::Linear, &[0.5], 1) - 1.0).abs() < 1e-12);
        assert_eq!(trend_value(Trend::None, &[], 7), 0.0);
    }

    #[test]
    fn test_monahan_roundtrip() {
        for original in [vec![0.5], vec![0.5, -0.3], vec![1.0, -0.5, 0.2]] {
            let constrained = constrain_stationary(&original);
            let unconstrained = unconstrain_stationary(&constrained);
            for (a, b) in original.iter().zip(unconstrained.iter()) {
                assert!((a - b).abs() < 1e-10, "roundtrip failed: {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_constrained_ar1_inside_unit_circle() {
        for x in [-50.0, -1.0, 0.0, 3.0, 1e3] {
            let phi = constrain_stationary(&[x])[0];
            assert!(phi.abs() < 1.0, "phi={} escaped the unit interval", phi);
        }
    }

    #[test]
    fn test_invertible_roundtrip() {
        let original = vec![0.4, -0.2];
        let constrained = constrain_invertible(&original);
        let unconstrained = unconstrain_invertible(&constrained);
        for (a, b) in original.iter().zip(unconstrained.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }
}
