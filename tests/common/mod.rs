#![allow(dead_code)]

use stockcast::series::Series;

const DAY: i64 = 86_400;

/// Uniform(-0.5, 0.5) noise from a fixed-seed LCG.
pub fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut rng_state = seed;
    (0..n)
        .map(|_| {
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (rng_state >> 33) as f64 / (1u64 << 31) as f64 - 0.5
        })
        .collect()
}

/// `mean + x_t` with `x_t = phi x_{t-1} + e_t + theta e_{t-1}`.
pub fn arma11(n: usize, phi: f64, theta: f64, mean: f64, seed: u64) -> Vec<f64> {
    let e = noise(n, seed);
    let mut x = vec![0.0; n];
    x[0] = e[0];
    for t in 1..n {
        x[t] = phi * x[t - 1] + e[t] + theta * e[t - 1];
    }
    x.iter().map(|v| v + mean).collect()
}

/// Standard normal noise: Box-Muller over the same LCG.
pub fn gaussian(n: usize, seed: u64) -> Vec<f64> {
    let mut rng_state = seed;
    let mut uniform = || {
        rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (rng_state >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|_| {
            let u1 = 1.0 - uniform();
            let u2 = uniform();
            (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
        })
        .collect()
}

/// A simulated ARMA(1,1) path together with its innovations.
pub struct Simulated {
    pub values: Vec<f64>,
    pub innovations: Vec<f64>,
}

/// Gaussian ARMA(1,1) around `mean`, started 200 steps early so the
/// returned `n` values are close to the stationary distribution.
pub fn gaussian_arma11(n: usize, phi: f64, theta: f64, mean: f64, seed: u64) -> Simulated {
    const BURN: usize = 200;
    let e = gaussian(n + BURN, seed);
    let mut x = vec![0.0; n + BURN];
    x[0] = e[0];
    for t in 1..x.len() {
        x[t] = phi * x[t - 1] + e[t] + theta * e[t - 1];
    }
    Simulated {
        values: x[BURN..].iter().map(|v| v + mean).collect(),
        innovations: e[BURN..].to_vec(),
    }
}

/// Random walk starting at `start`.
pub fn random_walk(n: usize, start: f64, seed: u64) -> Vec<f64> {
    let e = noise(n, seed);
    let mut y = vec![start; n];
    for t in 1..n {
        y[t] = y[t - 1] + e[t];
    }
    y
}

/// Daily closes stamped one day apart from 2024-01-01.
pub fn daily(values: &[f64]) -> Series {
    let start = 1_704_067_200;
    let timestamps = (0..values.len() as i64).map(|i| start + i * DAY).collect();
    Series::new(timestamps, values.to_vec()).unwrap()
}
