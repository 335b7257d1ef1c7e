use std::fmt;

use serde::{Deserialize, Serialize};

/// ARIMA model order: one point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize, // AR order
    pub d: usize, // differencing order
    pub q: usize, // MA order
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// State space ARMA dimension: max(p, q + 1)
    pub fn k_order(&self) -> usize {
        std::cmp::max(self.p, self.q + 1)
    }

    /// Differencing state dimension: d
    pub fn k_states_diff(&self) -> usize {
        self.d
    }

    /// Total state dimension
    pub fn k_states(&self) -> usize {
        self.k_order() + self.k_states_diff()
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Deterministic trend specification, regressed alongside the ARIMA errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    None,     // 'n': k_trend = 0
    Constant, // 'c': k_trend = 1
    Linear,   // 't': k_trend = 1
    Both,     // 'ct': k_trend = 2
}

impl Trend {
    pub fn k_trend(&self) -> usize {
        match self {
            Trend::None => 0,
            Trend::Constant | Trend::Linear => 1,
            Trend::Both => 2,
        }
    }

    /// Lowest polynomial power present in the trend, if any.
    ///
    /// Differencing `d` times annihilates every trend term of power below `d`,
    /// so such a term cannot be estimated.
    pub fn lowest_power(&self) -> Option<usize> {
        match self {
            Trend::None => None,
            Trend::Constant | Trend::Both => Some(0),
            Trend::Linear => Some(1),
        }
    }

    /// Short code used in experiment names and logged params.
    pub fn code(&self) -> &'static str {
        match self {
            Trend::None => "n",
            Trend::Constant => "c",
            Trend::Linear => "t",
            Trend::Both => "ct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "n" => Some(Trend::None),
            "c" => Some(Trend::Constant),
            "t" => Some(Trend::Linear),
            "ct" | "tc" => Some(Trend::Both),
            _ => None,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaConfig {
    pub order: ArimaOrder,
    pub trend: Trend,
    pub enforce_stationarity: bool,
    pub enforce_invertibility: bool,
}

impl ArimaConfig {
    /// Configuration used for every grid candidate: stationarity and
    /// invertibility enforced.
    pub fn for_candidate(order: ArimaOrder, trend: Trend) -> Self {
        Self {
            order,
            trend,
            enforce_stationarity: true,
            enforce_invertibility: true,
        }
    }
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            order: ArimaOrder::new(1, 0, 0),
            trend: Trend::None,
            enforce_stationarity: false,
            enforce_invertibility: false,
        }
    }
}

/// Fit result returned by the optimizer.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub params: Vec<f64>,
    pub loglike: f64,
    pub scale: f64,
    pub n_obs: usize,
    pub n_obs_effective: usize,
    pub n_params: usize,
    pub n_iter: u64,
    pub converged: bool,
    pub method: String,
    pub aic: f64,
    pub bic: f64,
}

impl FitResult {
    /// Fill in AIC and BIC from the log-likelihood.
    ///
    /// The penalty uses the effective sample (observations after the
    /// likelihood burn-in).
    pub fn with_information_criteria(mut self) -> Self {
        let k = self.n_params as f64;
        self.aic = -2.0 * self.loglike + 2.0 * k;
        self.bic = -2.0 * self.loglike + k * (self.n_obs_effective as f64).ln();
        self
    }
}
