//! Registry Publisher: record the winning model of a search in a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FailureCounts, PublishError};
use crate::forecast::forecast_pipeline;
use crate::registry::{ModelArtifact, ModelReference, ModelRegistry, RegistryRun};
use crate::search::SelectionResult;
use crate::series::Series;
use crate::summary;

pub const DEFAULT_EXPERIMENT_PREFIX: &str = "STOCK_PRICES";

/// A local file that is deleted when the guard goes away.
struct ScratchFile {
    path: Option<PathBuf>,
}

impl ScratchFile {
    fn create(path: PathBuf, contents: &str) -> Result<Self, PublishError> {
        // Arm the guard before writing so a partial write is removed too.
        let guard = ScratchFile { path: Some(path) };
        if let Some(p) = guard.path.as_deref() {
            fs::write(p, contents).map_err(|source| PublishError::Scratch {
                path: p.display().to_string(),
                source,
            })?;
        }
        Ok(guard)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn remove(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove scratch file");
                }
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Failure flags logged as metrics: 1.0 if the kind occurred at all.
fn failure_flags(counts: &FailureCounts) -> [(&'static str, f64); 2] {
    let flag = |n: usize| if n > 0 { 1.0 } else { 0.0 };
    [
        ("convergence_error", flag(counts.numerical_instability)),
        ("stationarity_error", flag(counts.invalid_specification)),
    ]
}

/// Publishes selection results into a [`ModelRegistry`].
#[derive(Debug, Clone)]
pub struct Publisher {
    pub experiment_prefix: String,
    /// Where the text summary is staged before upload.
    pub scratch_dir: PathBuf,
}

impl Default for Publisher {
    fn default() -> Self {
        Self {
            experiment_prefix: DEFAULT_EXPERIMENT_PREFIX.to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Publisher {
    pub fn new(experiment_prefix: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            experiment_prefix: experiment_prefix.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// `{prefix}_ARIMA({p},{d},{q})_{trend}` for the winning model.
    pub fn experiment_name(&self, selection: &SelectionResult) -> String {
        format!(
            "{}_ARIMA{}_{}",
            self.experiment_prefix, selection.best.order, selection.best.trend
        )
    }

    /// Fresh staging path for the summary of `experiment`.
    ///
    /// Every call returns a new name, so publishers sharing a scratch
    /// directory never overwrite or delete each other's files.
    pub fn summary_path(&self, experiment: &str) -> PathBuf {
        self.scratch_dir.join(format!(
            "model_summary_{}_{}.txt",
            experiment,
            Uuid::new_v4().simple()
        ))
    }

    /// Record the winner of `selection` in a new run and persist the model.
    ///
    /// The run carries the order, trend and training time as params; the
    /// one-step forecast, information criteria, failure flags and p-values
    /// as metrics; the text summary as a file artifact; and the model
    /// itself under an artifact path named after the experiment.
    pub fn publish(
        &self,
        registry: &dyn ModelRegistry,
        series: &Series,
        selection: &SelectionResult,
    ) -> Result<ModelReference, PublishError> {
        let model = &selection.best;
        let experiment = self.experiment_name(selection);
        let trained_time = Utc::now();

        let params = model.arima_params().map_err(PublishError::Forecast)?;
        let y_pred = forecast_pipeline(series.values(), &model.config(), &params, 1, 0.05)
            .map_err(PublishError::Forecast)?
            .mean
            .first()
            .copied()
            .unwrap_or(f64::NAN);
        let summary_text = summary::render(model, series).map_err(PublishError::Forecast)?;

        let run_params: BTreeMap<String, String> = [
            ("p", model.order.p.to_string()),
            ("d", model.order.d.to_string()),
            ("q", model.order.q.to_string()),
            ("trend", model.trend.to_string()),
            ("trained_time", trained_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut metrics = BTreeMap::new();
        metrics.insert("y_pred".to_string(), y_pred);
        metrics.insert("aic".to_string(), model.aic);
        metrics.insert("bic".to_string(), model.bic);
        for (name, flag) in failure_flags(&selection.failures) {
            metrics.insert(name.to_string(), flag);
        }
        for (name, p) in model.p_values() {
            if p.is_finite() {
                metrics.insert(name, p);
            } else {
                debug!(param = %name, "skipping non-finite p-value");
            }
        }

        let mut run = registry.start_run(&experiment)?;
        let run_id = run.run_id().to_string();
        let recorded = record(
            run.as_mut(),
            &experiment,
            &run_params,
            &metrics,
            &ModelArtifact::from_fitted(model, trained_time),
            Staged {
                path: self.summary_path(&experiment),
                text: &summary_text,
            },
        );
        let reference = match recorded {
            Ok(reference) => reference,
            Err(e) => {
                warn!(%experiment, run_id = %run_id, error = %e, "publish failed, closing run");
                if let Err(close) = run.fail() {
                    warn!(run_id = %run_id, error = %close, "cannot mark run as failed");
                }
                return Err(e);
            }
        };
        run.finish()?;

        info!(
            %experiment,
            run_id = %run_id,
            %reference,
            y_pred,
            aic = model.aic,
            "published model"
        );
        Ok(reference)
    }
}

/// Summary text and where to stage it before upload.
struct Staged<'a> {
    path: PathBuf,
    text: &'a str,
}

fn record(
    run: &mut dyn RegistryRun,
    experiment: &str,
    params: &BTreeMap<String, String>,
    metrics: &BTreeMap<String, f64>,
    artifact: &ModelArtifact,
    summary: Staged<'_>,
) -> Result<ModelReference, PublishError> {
    let mut summary_file = ScratchFile::create(summary.path, summary.text)?;
    run.log_params(params)?;
    run.log_metrics(metrics)?;
    if let Some(path) = summary_file.path() {
        run.log_artifact(path)?;
    }
    let reference = run.log_model(experiment, artifact)?;
    summary_file.remove();
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_flags_are_binary() {
        let counts = FailureCounts {
            numerical_instability: 7,
            invalid_specification: 0,
        };
        let flags = failure_flags(&counts);
        assert_eq!(flags[0], ("convergence_error", 1.0));
        assert_eq!(flags[1], ("stationarity_error", 0.0));
    }

    #[test]
    fn test_summary_paths_are_unique() {
        let publisher = Publisher::new("STOCK_PRICES", "/tmp/scratch");
        let a = publisher.summary_path("STOCK_PRICES_ARIMA(1,0,1)_c");
        let b = publisher.summary_path("STOCK_PRICES_ARIMA(1,0,1)_c");
        assert_ne!(a, b);
        for path in [&a, &b] {
            assert_eq!(path.parent(), Some(Path::new("/tmp/scratch")));
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with("model_summary_STOCK_PRICES_ARIMA(1,0,1)_c_"));
            assert!(name.ends_with(".txt"));
        }
    }

    #[test]
    fn test_scratch_file_removed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_summary_x.txt");
        let mut guard = ScratchFile::create(path.clone(), "summary").unwrap();
        assert!(path.exists());
        guard.remove();
        assert!(!path.exists());
        assert!(guard.path().is_none());

        // A file recreated under the same name is not the guard's to delete.
        fs::write(&path, "other").unwrap();
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_summary_y.txt");
        {
            let _guard = ScratchFile::create(path.clone(), "summary").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_dir_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("model_summary_z.txt");
        let err = ScratchFile::create(path, "summary").err().unwrap();
        assert!(matches!(err, PublishError::Scratch { .. }));
    }
}
