//! ARIMA parameter optimization via L-BFGS with Nelder-Mead fallback.
//!
//! This module provides:
//! - Parameter space transformations (constrained ↔ unconstrained)
//! - Negative log-likelihood objective function for argmin
//! - `fit()` function: maximum likelihood estimation of one model

use std::fmt;
use std::str::FromStr;

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use serde::{Deserialize, Serialize};

use crate::error::{ArimaError, Result};
use crate::initialization::KalmanInit;
use crate::kalman::{kalman_loglike, KalmanOutput};
use crate::params::{self, flat_len, ArimaParams};
use crate::start_params::compute_start_params;
use crate::state_space::StateSpace;
use crate::types::{ArimaConfig, FitResult};

/// Penalty returned for parameter points where the likelihood is undefined.
const INVALID_COST: f64 = f64::MAX / 2.0;

// ---------------------------------------------------------------------------
// Parameter transformations (constrained ↔ unconstrained)
// ---------------------------------------------------------------------------

/// Transform constrained parameters to unconstrained space for optimization.
///
/// Layout: `[trend | ar(p) | ma(q)]`
pub fn untransform_params(constrained: &[f64], config: &ArimaConfig) -> Result<Vec<f64>> {
    let p = ArimaParams::from_flat(constrained, config)?;

    let mut out = Vec::with_capacity(constrained.len());
    out.extend_from_slice(&p.trend_coeffs);
    if config.enforce_stationarity {
        out.extend(params::unconstrain_stationary(&p.ar_coeffs));
    } else {
        out.extend_from_slice(&p.ar_coeffs);
    }
    if config.enforce_invertibility {
        out.extend(params::unconstrain_invertible(&p.ma_coeffs));
    } else {
        out.extend_from_slice(&p.ma_coeffs);
    }
    Ok(out)
}

/// Transform unconstrained parameters back to constrained space.
pub fn transform_params(unconstrained: &[f64], config: &ArimaConfig) -> Result<Vec<f64>> {
    let p = ArimaParams::from_flat(unconstrained, config)?;

    let mut out = Vec::with_capacity(unconstrained.len());
    out.extend_from_slice(&p.trend_coeffs);
    if config.enforce_stationarity {
        out.extend(params::constrain_stationary(&p.ar_coeffs));
    } else {
        out.extend_from_slice(&p.ar_coeffs);
    }
    if config.enforce_invertibility {
        out.extend(params::constrain_invertible(&p.ma_coeffs));
    } else {
        out.extend_from_slice(&p.ma_coeffs);
    }
    Ok(out)
}

/// Evaluate the likelihood at constrained parameters.
pub fn evaluate(endog: &[f64], config: &ArimaConfig, constrained: &[f64]) -> Result<KalmanOutput> {
    let params = ArimaParams::from_flat(constrained, config)?;
    let ss = StateSpace::new(config, &params)?;
    let init = KalmanInit::from_config(&ss, config);
    kalman_loglike(endog, &ss, &init)
}

// ---------------------------------------------------------------------------
// Objective function for argmin
// ---------------------------------------------------------------------------

/// Negative log-likelihood objective over unconstrained parameters.
#[derive(Clone)]
struct ArimaObjective {
    endog: Vec<f64>,
    config: ArimaConfig,
}

impl ArimaObjective {
    fn eval_loglike(&self, unconstrained: &[f64]) -> Result<f64> {
        let constrained = transform_params(unconstrained, &self.config)?;
        let output = evaluate(&self.endog, &self.config, &constrained)?;
        if output.loglike.is_finite() {
            Ok(output.loglike)
        } else {
            Err(ArimaError::NonFinite("log-likelihood"))
        }
    }
}

impl CostFunction for ArimaObjective {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        match self.eval_loglike(param) {
            Ok(ll) => Ok(-ll),
            Err(_) => Ok(INVALID_COST),
        }
    }
}

impl Gradient for ArimaObjective {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Central finite differences, with a forward-difference fallback when
    /// one side leaves the valid region.
    fn gradient(&self, param: &Vec<f64>) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        let n = param.len();
        let mut grad = vec![0.0; n];
        let mut p_work = param.clone();
        let f0 = self.cost(param)?;

        for i in 0..n {
            let orig = p_work[i];
            let h = 1e-5 * orig.abs().max(1.0);

            p_work[i] = orig + h;
            let fp = self.cost(&p_work)?;
            p_work[i] = orig - h;
            let fm = self.cost(&p_work)?;
            p_work[i] = orig;

            grad[i] = if fp < INVALID_COST && fm < INVALID_COST {
                (fp - fm) / (2.0 * h)
            } else if fp < INVALID_COST {
                (fp - f0) / h
            } else if fm < INVALID_COST {
                (f0 - fm) / h
            } else {
                0.0
            };
            if !grad[i].is_finite() {
                grad[i] = 0.0;
            }
        }

        Ok(grad)
    }
}

// ---------------------------------------------------------------------------
// Solvers
// ---------------------------------------------------------------------------

struct SolverOutcome {
    param: Vec<f64>,
    cost: f64,
    n_iter: u64,
    converged: bool,
}

fn run_lbfgs(
    objective: ArimaObjective,
    init_params: Vec<f64>,
    maxiter: u64,
) -> std::result::Result<SolverOutcome, String> {
    let linesearch = MoreThuenteLineSearch::new();
    let solver = LBFGS::new(linesearch, 10)
        .with_tolerance_grad(1e-5)
        .map_err(|e| e.to_string())?
        .with_tolerance_cost(1e-9)
        .map_err(|e| e.to_string())?;

    let result = Executor::new(objective, solver)
        .configure(
            |state: argmin::core::IterState<Vec<f64>, Vec<f64>, (), (), (), f64>| {
                state.param(init_params).max_iters(maxiter)
            },
        )
        .run()
        .map_err(|e| format!("L-BFGS failed: {}", e))?;

    let state = result.state();
    let param = state
        .get_best_param()
        .ok_or("L-BFGS: no best parameter found")?
        .clone();
    let term_reason = state.get_termination_reason();
    Ok(SolverOutcome {
        param,
        cost: state.get_best_cost(),
        n_iter: state.get_iter(),
        converged: term_reason == Some(&TerminationReason::SolverConverged),
    })
}

fn run_nelder_mead(
    objective: ArimaObjective,
    init_params: Vec<f64>,
    maxiter: u64,
) -> std::result::Result<SolverOutcome, String> {
    let n = init_params.len();

    // Simplex: n+1 vertices around the start point
    let mut simplex = vec![init_params.clone()];
    for i in 0..n {
        let mut vertex = init_params.clone();
        let delta = if vertex[i].abs() > 1e-8 {
            vertex[i] * 0.05
        } else {
            0.00025
        };
        vertex[i] += delta;
        simplex.push(vertex);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(1e-6)
        .map_err(|e| e.to_string())?;

    let result = Executor::new(objective, solver)
        .configure(|state: argmin::core::IterState<Vec<f64>, (), (), (), (), f64>| {
            state.max_iters(maxiter)
        })
        .run()
        .map_err(|e| format!("Nelder-Mead failed: {}", e))?;

    let state = result.state();
    let param = state
        .get_best_param()
        .ok_or("Nelder-Mead: no best parameter found")?
        .clone();
    let term_reason = state.get_termination_reason();
    Ok(SolverOutcome {
        param,
        cost: state.get_best_cost(),
        n_iter: state.get_iter(),
        converged: term_reason == Some(&TerminationReason::SolverConverged),
    })
}

// ---------------------------------------------------------------------------
// Public fit() entry point
// ---------------------------------------------------------------------------

/// Optimization method for [`fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// L-BFGS, polished by Nelder-Mead when it stops short of convergence.
    #[default]
    Lbfgs,
    NelderMead,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Lbfgs => "lbfgs",
            Method::NelderMead => "nelder-mead",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lbfgs" => Ok(Method::Lbfgs),
            "nelder-mead" | "nm" => Ok(Method::NelderMead),
            other => Err(format!(
                "unknown optimization method '{}'; use 'lbfgs' or 'nelder-mead'",
                other
            )),
        }
    }
}

/// Fit an ARIMA model by maximum likelihood, starting from
/// [`compute_start_params`].
///
/// `maxiter = 0` evaluates the starting point without optimizing.
pub fn fit(endog: &[f64], config: &ArimaConfig, method: Method, maxiter: u64) -> Result<FitResult> {
    fit_from(endog, config, None, method, maxiter)
}

fn fit_from(
    endog: &[f64],
    config: &ArimaConfig,
    start_params: Option<&[f64]>,
    method: Method,
    maxiter: u64,
) -> Result<FitResult> {
    let expected_len = flat_len(config);
    let min_obs = expected_len.max(config.order.k_states()) + config.order.d;
    if endog.len() <= min_obs {
        return Err(ArimaError::DataError(format!(
            "not enough observations: n={} <= minimum required {} for order {}",
            endog.len(),
            min_obs,
            config.order
        )));
    }

    let constrained_start = match start_params {
        Some(sp) => {
            if sp.len() != expected_len {
                return Err(ArimaError::ParamLengthMismatch {
                    expected: expected_len,
                    got: sp.len(),
                });
            }
            sp.to_vec()
        }
        None => compute_start_params(endog, config)?,
    };

    let (final_constrained, n_iter, converged, used_method) = if expected_len == 0 {
        // Nothing to estimate: the concentrated likelihood is already the maximum.
        (constrained_start, 0, true, "none".to_string())
    } else if maxiter == 0 {
        (constrained_start, 0, false, method.to_string())
    } else {
        // A start point outside the admissible region maps to non-finite
        // unconstrained values; restart those coordinates from zero.
        let unconstrained_start: Vec<f64> = untransform_params(&constrained_start, config)?
            .into_iter()
            .map(|u| if u.is_finite() { u } else { 0.0 })
            .collect();

        let objective = ArimaObjective {
            endog: endog.to_vec(),
            config: config.clone(),
        };

        let (outcome, used_method) = match method {
            Method::NelderMead => {
                let o = run_nelder_mead(objective, unconstrained_start, maxiter)
                    .map_err(ArimaError::OptimizationFailed)?;
                (o, "nelder-mead".to_string())
            }
            Method::Lbfgs => match run_lbfgs(objective.clone(), unconstrained_start.clone(), maxiter) {
                Ok(o) if o.converged || o.param.len() < 2 => (o, "lbfgs".to_string()),
                Ok(o) => {
                    // Not converged: try to polish with Nelder-Mead on the
                    // remaining budget and keep whichever is better.
                    let remaining = maxiter.saturating_sub(o.n_iter).max(1);
                    match run_nelder_mead(objective, o.param.clone(), remaining) {
                        Ok(nm) if nm.cost < o.cost => (
                            SolverOutcome {
                                n_iter: o.n_iter + nm.n_iter,
                                ..nm
                            },
                            "lbfgs+nm".to_string(),
                        ),
                        _ => (o, "lbfgs".to_string()),
                    }
                }
                Err(_) => {
                    let o = run_nelder_mead(objective, unconstrained_start, maxiter)
                        .map_err(ArimaError::OptimizationFailed)?;
                    (o, "nelder-mead (fallback)".to_string())
                }
            },
        };

        if outcome.cost >= INVALID_COST {
            return Err(ArimaError::OptimizationFailed(
                "no parameter point with a finite likelihood was found".to_string(),
            ));
        }

        (
            transform_params(&outcome.param, config)?,
            outcome.n_iter,
            outcome.converged,
            used_method,
        )
    };

    let output = evaluate(endog, config, &final_constrained)?;
    if !output.loglike.is_finite() {
        return Err(ArimaError::NonFinite("log-likelihood"));
    }
    if !output.scale.is_finite() {
        return Err(ArimaError::NonFinite("scale"));
    }

    Ok(FitResult {
        params: final_constrained,
        loglike: output.loglike,
        scale: output.scale,
        n_obs: endog.len(),
        n_obs_effective: output.n_obs_effective,
        n_params: ArimaParams::n_estimated_params(config),
        n_iter,
        converged,
        method: used_method,
        aic: 0.0,
        bic: 0.0,
    }
    .with_information_criteria())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
