mod common;

use stockcast::error::{FailureKind, SearchError};
use stockcast::fitter::{fit, FitOptions};
use stockcast::forecast::predict;
use stockcast::search::{search, GridSpec, SearchOptions};
use stockcast::series::Series;
use stockcast::types::{ArimaOrder, Trend};

fn sequential() -> SearchOptions {
    SearchOptions {
        parallel: false,
        ..Default::default()
    }
}

#[test]
fn test_arma11_is_recovered_and_forecasts_next_value() {
    const PHI: f64 = 0.7;
    const THETA: f64 = 0.6;
    const MEAN: f64 = 100.0;
    let grid = GridSpec::new(0..=2, 0..=1, 0..=2);
    assert_eq!(grid.len(), 18);

    let seeds = 1..=10u64;
    let mut identified = 0;
    for seed in seeds.clone() {
        let sim = common::gaussian_arma11(301, PHI, THETA, MEAN, seed);
        let series = common::daily(&sim.values[..300]);

        let selection = search(&series, &grid, Trend::Constant, &SearchOptions::default()).unwrap();
        assert_eq!(selection.n_candidates, 18);
        // Trend 'c' cannot be estimated once the series is differenced.
        assert_eq!(selection.failures.invalid_specification, 9);

        let best = &selection.best;
        assert_eq!(best.order.d, 0, "seed {}: selected {}", seed, best.order);
        let truth = ArimaOrder::new(1, 0, 1);
        let reference = fit(&series, truth, Trend::Constant, &FitOptions::default())
            .unwrap()
            .unwrap();
        if best.order == truth || best.aic < reference.aic - 2.0 {
            identified += 1;
        }

        // One-step forecast against the conditional mean of the simulated
        // process, then against the realized value at four noise sd.
        let params = best.arima_params().unwrap();
        let out = predict(series.values(), &best.config(), &params, 1).unwrap();
        assert_eq!(out.len(), 301);
        let last = sim.values[299] - MEAN;
        let expected = MEAN + PHI * last + THETA * sim.innovations[299];
        assert!(
            (out[300] - expected).abs() < 0.5,
            "seed {}: forecast {} vs conditional mean {}",
            seed,
            out[300],
            expected
        );
        assert!((out[300] - sim.values[300]).abs() < 4.0);
    }

    let n_seeds = seeds.count();
    assert!(
        identified * 10 >= n_seeds * 6,
        "ARMA(1,1) identified on {} of {} seeds",
        identified,
        n_seeds
    );
}

#[test]
fn test_selected_aic_is_global_minimum() {
    let series = common::daily(&common::random_walk(150, 50.0, 9));
    let grid = GridSpec::new(0..=1, 0..=1, 0..=1);
    let selection = search(&series, &grid, Trend::None, &sequential()).unwrap();

    for order in grid.points() {
        if let Ok(model) = fit(&series, order, Trend::None, &FitOptions::default()).unwrap() {
            assert!(
                selection.best.aic <= model.aic,
                "{} has aic {} below the selected {}",
                order,
                model.aic,
                selection.best.aic
            );
        }
    }
}

#[test]
fn test_search_is_deterministic_and_parallel_matches_sequential() {
    let series = common::daily(&common::random_walk(120, 30.0, 77));
    let grid = GridSpec::new(0..=1, 0..=1, 0..=1);

    let a = search(&series, &grid, Trend::None, &sequential()).unwrap();
    let b = search(&series, &grid, Trend::None, &sequential()).unwrap();
    let c = search(&series, &grid, Trend::None, &SearchOptions::default()).unwrap();

    for other in [&b, &c] {
        assert_eq!(a.best.order, other.best.order);
        assert!((a.best.aic - other.best.aic).abs() < 1e-9);
        assert_eq!(a.failures, other.failures);
        assert_eq!(a.n_candidates, other.n_candidates);
    }
}

#[test]
fn test_constant_series_over_differencing_is_classified() {
    let series = common::daily(&[42.0; 50]);
    for p in 0..=1 {
        for q in 0..=1 {
            let outcome = fit(&series, ArimaOrder::new(p, 2, q), Trend::None, &FitOptions::default())
                .unwrap();
            let failure = outcome.expect_err("over-differenced constant series must not fit");
            assert!(matches!(
                failure.kind,
                FailureKind::InvalidSpecification | FailureKind::NumericalInstability
            ));
        }
    }

    let grid = GridSpec::new(0..=1, 1..=2, 0..=1);
    match search(&series, &grid, Trend::None, &SearchOptions::default()) {
        Err(SearchError::NoViableModel { counts }) => assert_eq!(counts.total(), grid.len()),
        other => panic!("expected NoViableModel, got {:?}", other.map(|s| s.best.order)),
    }
}

#[test]
fn test_short_series_candidates_fail_without_aborting() {
    let series = Series::from_values(common::random_walk(8, 10.0, 5)).unwrap();
    let grid = GridSpec::new(0..=3, 0..=1, 0..=3);
    let selection = search(&series, &grid, Trend::None, &sequential()).unwrap();
    assert!(selection.failures.invalid_specification > 0);
    assert_eq!(selection.n_candidates, grid.len());
}
