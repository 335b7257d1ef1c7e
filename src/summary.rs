//! Plain-text summary of a fitted model.

use std::fmt::{self, Write};

use crate::error::Result;
use crate::fitter::FittedModel;
use crate::forecast::residuals_pipeline;
use crate::series::Series;

const RULE: &str = "==============================================================================";
const THIN: &str = "------------------------------------------------------------------------------";

fn fmt_num(v: f64) -> String {
    if v.is_finite() {
        format!("{:>12.4}", v)
    } else {
        format!("{:>12}", "nan")
    }
}

struct ResidualStats {
    mean: f64,
    std: f64,
    skew: f64,
    kurtosis: f64,
}

fn residual_stats(r: &[f64]) -> ResidualStats {
    let n = r.len() as f64;
    let mean = r.iter().sum::<f64>() / n;
    let m2 = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m3 = r.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
    let m4 = r.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;
    ResidualStats {
        mean,
        std: m2.sqrt(),
        skew: if m2 > 0.0 { m3 / m2.powf(1.5) } else { f64::NAN },
        kurtosis: if m2 > 0.0 { m4 / (m2 * m2) } else { f64::NAN },
    }
}

/// Render the fit header, the coefficient table and residual diagnostics.
///
/// Residuals are recomputed by filtering `series` with the fitted
/// parameters; the first `d` innovations belong to the diffuse burn-in and
/// are left out of the statistics.
pub fn render(model: &FittedModel, series: &Series) -> Result<String> {
    let residuals = residuals_pipeline(series.values(), &model.config(), &model.arima_params()?)?;
    let burn = model.order.d.min(residuals.standardized_residuals.len());
    let stats = residual_stats(&residuals.standardized_residuals[burn..]);

    let mut out = String::new();
    write_summary(&mut out, model, series, &stats)?;
    Ok(out)
}

fn write_summary<W: Write>(
    out: &mut W,
    model: &FittedModel,
    series: &Series,
    stats: &ResidualStats,
) -> fmt::Result {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "{:^78}", "ARIMA Results")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Model:             ARIMA{}   trend: {}", model.order, model.trend)?;
    if let (Some(first), Some(last)) = series.window() {
        writeln!(out, "Sample:            {} - {}", first.date_naive(), last.date_naive())?;
    }
    writeln!(out, "No. Observations:  {}", model.n_obs)?;
    writeln!(out, "Log Likelihood:    {:.4}", model.loglike)?;
    writeln!(out, "AIC:               {:.4}", model.aic)?;
    writeln!(out, "BIC:               {:.4}", model.bic)?;
    writeln!(
        out,
        "Optimizer:         {} ({} iterations, converged: {})",
        model.method, model.n_iter, model.converged
    )?;
    writeln!(out, "{}", THIN)?;
    writeln!(out, "{:<12}{:>12}{:>12}{:>12}{:>12}", "", "coef", "std err", "z", "P>|z|")?;
    writeln!(out, "{}", THIN)?;
    for e in &model.estimates {
        writeln!(
            out,
            "{:<12}{}{}{}{}",
            e.name,
            fmt_num(e.value),
            fmt_num(e.std_error),
            fmt_num(e.z),
            fmt_num(e.p_value)
        )?;
    }
    writeln!(out, "{}", THIN)?;
    writeln!(out, "Standardized residuals:")?;
    writeln!(out, "  mean {}   std {}", fmt_num(stats.mean), fmt_num(stats.std))?;
    writeln!(out, "  skew {}   kurtosis {}", fmt_num(stats.skew), fmt_num(stats.kurtosis))?;
    writeln!(out, "{}", RULE)
}
