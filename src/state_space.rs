use nalgebra::{DMatrix, DVector};

use crate::error::{ArimaError, Result};
use crate::params::{trend_value, ArimaParams};
use crate::types::{ArimaConfig, Trend};

/// Harvey-representation state space for ARIMA(p,d,q) with a deterministic
/// trend regression.
///
/// State equation:  alpha_{t+1} = T * alpha_t + R * eta_t
/// Observation:     y_t          = Z' * alpha_t + d_t
///
/// where eta_t ~ N(0, Q) and d_t is the trend at time t. There is no
/// measurement error.
#[derive(Debug, Clone)]
pub struct StateSpace {
    pub k_states: usize,
    pub k_states_diff: usize,
    pub transition: DMatrix<f64>, // T: k_states × k_states
    pub design: DVector<f64>,     // Z: k_states (single observation row)
    pub selection: DMatrix<f64>,  // R: k_states × 1
    pub state_cov: DMatrix<f64>,  // Q: 1 × 1
    trend: Trend,
    trend_coeffs: Vec<f64>,
}

impl StateSpace {
    /// Construct the Harvey representation for an ARIMA model.
    pub fn new(config: &ArimaConfig, params: &ArimaParams) -> Result<Self> {
        let order = &config.order;

        if params.ar_coeffs.len() != order.p || params.ma_coeffs.len() != order.q {
            return Err(ArimaError::StateSpaceError(format!(
                "coefficient count ({} AR, {} MA) does not match order {}",
                params.ar_coeffs.len(),
                params.ma_coeffs.len(),
                order
            )));
        }
        if params.trend_coeffs.len() != config.trend.k_trend() {
            return Err(ArimaError::StateSpaceError(format!(
                "trend '{}' needs {} coefficients, got {}",
                config.trend,
                config.trend.k_trend(),
                params.trend_coeffs.len()
            )));
        }

        let k_states = order.k_states();
        let k_states_diff = order.k_states_diff();

        let transition = Self::build_transition(config, params);
        let design = Self::build_design(config);
        let selection = Self::build_selection(config, params);
        let state_cov = Self::build_state_cov();

        Ok(Self {
            k_states,
            k_states_diff,
            transition,
            design,
            selection,
            state_cov,
            trend: config.trend,
            trend_coeffs: params.trend_coeffs.clone(),
        })
    }

    /// Observation intercept d_t: the trend evaluated at zero-based time `t`.
    ///
    /// Defined for every `t`, so it extends past the sample for forecasting.
    pub fn obs_intercept(&self, t: usize) -> f64 {
        trend_value(self.trend, &self.trend_coeffs, t)
    }

    /// Build the transition matrix T.
    ///
    /// 1. Differencing block [0..d, 0..d]: upper triangular ones
    /// 2. Diff → ARMA: every differencing state picks up the first ARMA state
    /// 3. ARMA companion [d..d+ko, d..d+ko]: AR coefficients in the first
    ///    column, ones on the superdiagonal
    fn build_transition(config: &ArimaConfig, params: &ArimaParams) -> DMatrix<f64> {
        let order = &config.order;
        let k_states = order.k_states();
        let d = order.d;
        let sd = order.k_states_diff();
        let ko = order.k_order();

        let mut t = DMatrix::<f64>::zeros(k_states, k_states);

        for i in 0..d {
            for j in i..d {
                t[(i, j)] = 1.0;
            }
            t[(i, sd)] = 1.0;
        }

        for (i, &phi) in params.ar_coeffs.iter().enumerate() {
            t[(sd + i, sd)] = phi;
        }
        for i in 0..ko.saturating_sub(1) {
            t[(sd + i, sd + i + 1)] = 1.0;
        }

        t
    }

    /// Build the design vector Z.
    ///
    /// Z[i] = 1 for i in 0..d (differencing states), Z[d] = 1 (first ARMA state).
    fn build_design(config: &ArimaConfig) -> DVector<f64> {
        let order = &config.order;
        let mut z = DVector::<f64>::zeros(order.k_states());
        for i in 0..=order.k_states_diff() {
            z[i] = 1.0;
        }
        z
    }

    /// Build the selection matrix R (k_states × 1).
    ///
    /// R[d, 0] = 1, R[d+i, 0] = theta_i for i in 1..=q
    fn build_selection(config: &ArimaConfig, params: &ArimaParams) -> DMatrix<f64> {
        let order = &config.order;
        let sd = order.k_states_diff();
        let mut r = DMatrix::<f64>::zeros(order.k_states(), 1);
        r[(sd, 0)] = 1.0;
        for (i, &theta) in params.ma_coeffs.iter().enumerate() {
            r[(sd + i + 1, 0)] = theta;
        }
        r
    }

    /// State covariance Q = [[1]]; the scale is concentrated out.
    fn build_state_cov() -> DMatrix<f64> {
        DMatrix::from_element(1, 1, 1.0)
    }
}
