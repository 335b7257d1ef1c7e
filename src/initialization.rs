use nalgebra::{DMatrix, DVector};

use crate::state_space::StateSpace;
use crate::types::ArimaConfig;

/// Kalman filter initial state and covariance.
#[derive(Debug, Clone)]
pub struct KalmanInit {
    /// Initial state vector a_0 (zeros).
    pub initial_state: DVector<f64>,
    /// Initial state covariance P_0.
    pub initial_state_cov: DMatrix<f64>,
    /// Number of initial observations to skip in loglikelihood (burn-in).
    pub loglikelihood_burn: usize,
}

impl KalmanInit {
    /// Approximate diffuse initialization.
    ///
    /// - a_0 = 0
    /// - P_0 = kappa * I_{k_states}
    /// - burn = k_states (skip all diffuse-affected observations)
    pub fn approximate_diffuse(k_states: usize, kappa: f64) -> Self {
        Self {
            initial_state: DVector::zeros(k_states),
            initial_state_cov: DMatrix::identity(k_states, k_states) * kappa,
            loglikelihood_burn: k_states,
        }
    }

    /// Default kappa value for the approximate diffuse prior.
    pub fn default_kappa() -> f64 {
        1e6
    }

    /// Initialization for a model built from `config`.
    ///
    /// With stationarity enforced, the ARMA block starts from its
    /// unconditional covariance (discrete Lyapunov solution) and only the
    /// `d` integrated states are diffuse, so the burn-in is `d`. This keeps
    /// the likelihood of every (p, q) at the same `d` evaluated over the
    /// same observations.
    ///
    /// Otherwise, or when the Lyapunov system is singular, every state is
    /// diffuse.
    pub fn from_config(ss: &StateSpace, config: &ArimaConfig) -> Self {
        let kappa = Self::default_kappa();
        if !config.enforce_stationarity {
            return Self::approximate_diffuse(ss.k_states, kappa);
        }

        let sd = ss.k_states_diff;
        let ko = ss.k_states - sd;
        let t_arma = ss.transition.view((sd, sd), (ko, ko)).into_owned();
        let r_arma = ss.selection.rows(sd, ko).into_owned();
        let rqr = &r_arma * &ss.state_cov * r_arma.transpose();

        let Some(p_arma) = solve_discrete_lyapunov(&t_arma, &rqr) else {
            return Self::approximate_diffuse(ss.k_states, kappa);
        };

        let mut p0 = DMatrix::<f64>::zeros(ss.k_states, ss.k_states);
        for i in 0..sd {
            p0[(i, i)] = kappa;
        }
        p0.view_mut((sd, sd), (ko, ko)).copy_from(&p_arma);

        Self {
            initial_state: DVector::zeros(ss.k_states),
            initial_state_cov: p0,
            loglikelihood_burn: sd,
        }
    }
}

/// Solve P = T P T' + Q through the vectorized system
/// (I - T ⊗ T) vec(P) = vec(Q).
///
/// Returns `None` if the system is singular or the solution is not a valid
/// covariance (non-finite or negative variance on the diagonal).
pub fn solve_discrete_lyapunov(t: &DMatrix<f64>, q: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = t.nrows();
    let lhs = DMatrix::<f64>::identity(n * n, n * n) - t.kronecker(t);
    let rhs = DVector::from_column_slice(q.as_slice());

    let vec_p = lhs.lu().solve(&rhs)?;
    let p = DMatrix::from_column_slice(n, n, vec_p.as_slice());
    // Symmetrize away round-off.
    let p = (&p + p.transpose()) * 0.5;

    let valid = p.iter().all(|v| v.is_finite()) && (0..n).all(|i| p[(i, i)] >= 0.0);
    valid.then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ArimaParams;
    use crate::types::{ArimaOrder, Trend};

    fn candidate(p: usize, d: usize, q: usize, ar: &[f64], ma: &[f64]) -> (StateSpace, ArimaConfig) {
        let config = ArimaConfig::for_candidate(ArimaOrder::new(p, d, q), Trend::None);
        let params = ArimaParams {
            trend_coeffs: vec![],
            ar_coeffs: ar.to_vec(),
            ma_coeffs: ma.to_vec(),
        };
        (StateSpace::new(&config, &params).unwrap(), config)
    }

    #[test]
    fn test_approximate_diffuse_basic() {
        let init = KalmanInit::approximate_diffuse(2, 1e6);

        assert_eq!(init.initial_state.len(), 2);
        assert!(init.initial_state.iter().all(|v| v.abs() < 1e-15));
        assert!((init.initial_state_cov[(0, 0)] - 1e6).abs() < 1e-4);
        assert!(init.initial_state_cov[(0, 1)].abs() < 1e-15);
        assert!((init.initial_state_cov[(1, 1)] - 1e6).abs() < 1e-4);
        assert_eq!(init.loglikelihood_burn, 2);
    }

    #[test]
    fn test_ar1_stationary_variance() {
        // Var = 1 / (1 - phi^2)
        let (ss, config) = candidate(1, 0, 0, &[0.5], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        assert_eq!(init.loglikelihood_burn, 0);
        assert!((init.initial_state_cov[(0, 0)] - 1.0 / 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_arma11_stationary_covariance() {
        // State [x_t, theta*e_t]: Var(x) = (1 + 2*phi*theta + theta^2) / (1 - phi^2)
        let (phi, theta) = (0.6, 0.3);
        let (ss, config) = candidate(1, 0, 1, &[phi], &[theta]);
        let init = KalmanInit::from_config(&ss, &config);
        let expected = (1.0 + 2.0 * phi * theta + theta * theta) / (1.0 - phi * phi);
        assert!((init.initial_state_cov[(0, 0)] - expected).abs() < 1e-10);
        assert!((init.initial_state_cov[(1, 1)] - theta * theta).abs() < 1e-10);
        assert!((init.initial_state_cov[(0, 1)] - theta * theta).abs() < 1e-10);
    }

    #[test]
    fn test_differenced_model_mixes_diffuse_and_stationary() {
        let (ss, config) = candidate(1, 1, 0, &[0.5], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        assert_eq!(init.loglikelihood_burn, 1);
        assert!((init.initial_state_cov[(0, 0)] - 1e6).abs() < 1e-4);
        assert!(init.initial_state_cov[(0, 1)].abs() < 1e-15);
        assert!((init.initial_state_cov[(1, 1)] - 1.0 / 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_unit_root_falls_back_to_diffuse() {
        // phi = 1 makes I - T ⊗ T singular
        let (ss, config) = candidate(1, 0, 0, &[1.0], &[]);
        let init = KalmanInit::from_config(&ss, &config);
        assert_eq!(init.loglikelihood_burn, 1);
        assert!((init.initial_state_cov[(0, 0)] - 1e6).abs() < 1e-4);
    }

    #[test]
    fn test_unenforced_config_is_diffuse() {
        let (ss, mut config) = candidate(1, 0, 0, &[0.5], &[]);
        config.enforce_stationarity = false;
        let init = KalmanInit::from_config(&ss, &config);
        assert_eq!(init.loglikelihood_burn, ss.k_states);
    }
}
