//! Entry points the scheduler (or the CLI) calls, one per pipeline step.

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::forecast::forecast_from_registry;
use crate::registry::{ModelReference, ModelRegistry};
use crate::search::{search, SelectionResult};
use crate::series::Series;

/// Run the grid search described by `config` without publishing.
pub fn search_only(series: &Series, config: &PipelineConfig) -> Result<SelectionResult, PipelineError> {
    config.validate()?;
    let grid = config.grid();
    let trend = config.trend()?;
    let (first, last) = series.window();
    info!(
        n_obs = series.len(),
        first = ?first,
        last = ?last,
        candidates = grid.len(),
        %trend,
        parallel = config.parallel,
        "starting grid search"
    );
    Ok(search(series, &grid, trend, &config.search_options())?)
}

/// Search, then publish the winner. A search without a winner publishes
/// nothing and surfaces `NoViableModel`.
pub fn train_and_publish(
    series: &Series,
    config: &PipelineConfig,
    registry: &dyn ModelRegistry,
) -> Result<ModelReference, PipelineError> {
    let selection = search_only(series, config)?;
    Ok(config.publisher().publish(registry, series, &selection)?)
}

/// Reload a published model and return in-sample predictions plus
/// `horizon` forecasts.
pub fn predict(
    series: &Series,
    reference: &ModelReference,
    horizon: usize,
    registry: &dyn ModelRegistry,
) -> Result<Vec<f64>, PipelineError> {
    Ok(forecast_from_registry(registry, reference, series, horizon)?)
}

/// Encode predictions as a JSON array.
///
/// JSON has no representation for NaN or infinity, so a non-finite value
/// is an error rather than a `null` in the output.
pub fn predictions_json(values: &[f64]) -> Result<String, PipelineError> {
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(PipelineError::Encode(format!(
            "prediction {} is {}",
            i, values[i]
        )));
    }
    serde_json::to_string(values).map_err(|e| PipelineError::Encode(e.to_string()))
}
