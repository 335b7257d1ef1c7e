//! Grid search over ARIMA orders.
//!
//! Candidates are enumerated lexicographically on `(p, d, q)` and fitted
//! independently. The running state is a [`Tally`]; tallies merge with an
//! associative, commutative operation, so the rayon reduction returns
//! exactly what the sequential fold returns.

use std::ops::RangeInclusive;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{ArimaError, FailureCounts, SearchError};
use crate::fitter::{self, FitOptions, FitOutcome, FittedModel};
use crate::series::Series;
use crate::types::{ArimaOrder, Trend};

/// Inclusive ranges of each order component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSpec {
    pub p: RangeInclusive<usize>,
    pub d: RangeInclusive<usize>,
    pub q: RangeInclusive<usize>,
}

impl GridSpec {
    pub fn new(p: RangeInclusive<usize>, d: RangeInclusive<usize>, q: RangeInclusive<usize>) -> Self {
        Self { p, d, q }
    }

    /// Every order in the grid, p outermost and q innermost.
    pub fn points(&self) -> impl Iterator<Item = ArimaOrder> + '_ {
        self.p.clone().flat_map(move |p| {
            self.d
                .clone()
                .flat_map(move |d| self.q.clone().map(move |q| ArimaOrder::new(p, d, q)))
        })
    }

    pub fn len(&self) -> usize {
        self.p.clone().count() * self.d.clone().count() * self.q.clone().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Search-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub fit: FitOptions,
    /// Fit candidates on the rayon thread pool.
    pub parallel: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fit: FitOptions::default(),
            parallel: true,
        }
    }
}

/// Winning model of a search plus the failures observed on the way.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub best: FittedModel,
    pub failures: FailureCounts,
    pub n_candidates: usize,
}

/// Partial search state over a subset of the grid.
#[derive(Debug, Clone, Default)]
struct Tally {
    best: Option<(usize, FittedModel)>,
    failures: FailureCounts,
    attempted: usize,
}

impl Tally {
    fn single(index: usize, outcome: FitOutcome) -> Self {
        let mut tally = Tally {
            attempted: 1,
            ..Default::default()
        };
        match outcome {
            Ok(model) if model.aic.is_finite() => tally.best = Some((index, model)),
            Ok(_) => {}
            Err(failure) => tally.failures.record(failure.kind),
        }
        tally
    }

    /// Lower aic wins; equal aic goes to the earlier grid point.
    fn merge(self, other: Tally) -> Tally {
        let best = match (self.best, other.best) {
            (None, b) | (b, None) => b,
            (Some(a), Some(b)) => {
                let b_wins = b.1.aic < a.1.aic || (b.1.aic == a.1.aic && b.0 < a.0);
                Some(if b_wins { b } else { a })
            }
        };
        Tally {
            best,
            failures: self.failures.merge(other.failures),
            attempted: self.attempted + other.attempted,
        }
    }
}

/// First fatal error in grid order.
struct Fatal {
    index: usize,
    order: ArimaOrder,
    source: ArimaError,
}

fn combine(a: Result<Tally, Fatal>, b: Result<Tally, Fatal>) -> Result<Tally, Fatal> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok(a.merge(b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(a), Err(b)) => Err(if b.index < a.index { b } else { a }),
    }
}

fn fit_point(
    series: &Series,
    index: usize,
    order: ArimaOrder,
    trend: Trend,
    opts: &FitOptions,
) -> Result<Tally, Fatal> {
    fitter::fit(series, order, trend, opts)
        .map(|outcome| Tally::single(index, outcome))
        .map_err(|source| Fatal { index, order, source })
}

/// Fit every grid point and select the minimum-AIC model.
pub fn search(
    series: &Series,
    grid: &GridSpec,
    trend: Trend,
    opts: &SearchOptions,
) -> Result<SelectionResult, SearchError> {
    if grid.is_empty() {
        return Err(SearchError::EmptyGrid);
    }

    let tally = if opts.parallel {
        let points: Vec<(usize, ArimaOrder)> = grid.points().enumerate().collect();
        points
            .into_par_iter()
            .map(|(i, order)| fit_point(series, i, order, trend, &opts.fit))
            .reduce(|| Ok(Tally::default()), combine)
    } else {
        grid.points()
            .enumerate()
            .try_fold(Tally::default(), |acc, (i, order)| {
                fit_point(series, i, order, trend, &opts.fit).map(|t| acc.merge(t))
            })
    };

    let tally = tally.map_err(|fatal| SearchError::Fit {
        order: fatal.order,
        source: fatal.source,
    })?;

    match tally.best {
        Some((_, best)) => {
            info!(
                order = %best.order,
                trend = %trend,
                aic = best.aic,
                candidates = tally.attempted,
                failures = %tally.failures,
                "grid search selected model"
            );
            if !best.converged {
                warn!(order = %best.order, "selected model did not report optimizer convergence");
            }
            Ok(SelectionResult {
                best,
                failures: tally.failures,
                n_candidates: tally.attempted,
            })
        }
        None => {
            warn!(
                candidates = tally.attempted,
                failures = %tally.failures,
                "no viable model in the search space"
            );
            Err(SearchError::NoViableModel {
                counts: tally.failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitFailure;

    fn model(order: ArimaOrder, aic: f64) -> FittedModel {
        FittedModel {
            order,
            trend: Trend::None,
            params: vec![],
            loglike: -aic / 2.0,
            scale: 1.0,
            aic,
            bic: aic,
            n_obs: 10,
            n_obs_effective: 10,
            n_iter: 1,
            converged: true,
            method: "lbfgs".into(),
            estimates: vec![],
        }
    }

    #[test]
    fn test_grid_enumeration_order() {
        let grid = GridSpec::new(0..=1, 0..=1, 0..=1);
        let points: Vec<String> = grid.points().map(|o| o.to_string()).collect();
        assert_eq!(
            points,
            vec!["(0,0,0)", "(0,0,1)", "(0,1,0)", "(0,1,1)", "(1,0,0)", "(1,0,1)", "(1,1,0)", "(1,1,1)"]
        );
        assert_eq!(grid.len(), 8);
    }

    #[test]
    fn test_default_grid_size() {
        assert_eq!(GridSpec::new(0..=8, 0..=2, 0..=8).len(), 243);
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn test_empty_grid() {
        let grid = GridSpec::new(2..=1, 0..=1, 0..=1);
        assert!(grid.is_empty());
        let series = Series::from_values(vec![1.0, 2.0, 3.0]).unwrap();
        let err = search(&series, &grid, Trend::None, &SearchOptions::default()).unwrap_err();
        assert!(matches!(err, SearchError::EmptyGrid));
    }

    #[test]
    fn test_tie_goes_to_earlier_point() {
        let a = Tally::single(3, Ok(model(ArimaOrder::new(0, 1, 1), 10.0)));
        let b = Tally::single(1, Ok(model(ArimaOrder::new(0, 0, 1), 10.0)));
        let merged_ab = a.clone().merge(b.clone());
        let merged_ba = b.merge(a);
        assert_eq!(merged_ab.best.as_ref().unwrap().0, 1);
        assert_eq!(merged_ba.best.as_ref().unwrap().0, 1);
    }

    #[test]
    fn test_merge_is_associative() {
        let t1 = Tally::single(0, Ok(model(ArimaOrder::new(0, 0, 0), 12.0)));
        let t2 = Tally::single(1, Err(FitFailure::numerical("x")));
        let t3 = Tally::single(2, Ok(model(ArimaOrder::new(0, 0, 2), 11.0)));
        let t4 = Tally::single(3, Err(FitFailure::invalid("y")));

        let left = t1.clone().merge(t2.clone()).merge(t3.clone()).merge(t4.clone());
        let right = t1.merge(t2.merge(t3.merge(t4)));
        assert_eq!(left.best.as_ref().unwrap().0, right.best.as_ref().unwrap().0);
        assert_eq!(left.failures, right.failures);
        assert_eq!(left.attempted, 4);
        assert_eq!(left.failures.total(), 2);
    }

    #[test]
    fn test_non_finite_aic_is_never_selected() {
        let t = Tally::single(0, Ok(model(ArimaOrder::new(0, 0, 0), f64::NAN)));
        assert!(t.best.is_none());
        let merged = t.merge(Tally::single(1, Ok(model(ArimaOrder::new(1, 0, 0), 50.0))));
        assert_eq!(merged.best.unwrap().1.order, ArimaOrder::new(1, 0, 0));
    }

    #[test]
    fn test_fatal_errors_pick_earliest_index() {
        let e = |index| Fatal {
            index,
            order: ArimaOrder::new(index, 0, 0),
            source: ArimaError::DataError("bad".into()),
        };
        let r = combine(Err(e(5)), Err(e(2)));
        assert_eq!(r.err().unwrap().index, 2);
    }

    #[test]
    fn test_all_failures_is_no_viable_model() {
        let series = Series::from_values(vec![7.0; 50]).unwrap();
        let grid = GridSpec::new(0..=1, 1..=2, 0..=1);
        let opts = SearchOptions {
            parallel: false,
            ..Default::default()
        };
        let err = search(&series, &grid, Trend::Constant, &opts).unwrap_err();
        match err {
            SearchError::NoViableModel { counts } => {
                assert_eq!(counts.invalid_specification, grid.len());
                assert_eq!(counts.numerical_instability, 0);
            }
            other => panic!("expected NoViableModel, got {:?}", other),
        }
    }
}
