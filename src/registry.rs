//! Model registry interface and the filesystem-backed registry.
//!
//! The pipeline only needs run-scoped logging of params, metrics and
//! artifacts, a way to persist a fitted model, and a way to resolve a
//! reference back to that model. [`ModelRegistry`] and [`RegistryRun`]
//! capture exactly that.
//!
//! [`FsRegistry`] lays runs out as
//!
//! ```text
//! <root>/<experiment>/<run_id>/params.json
//!                             /metrics.json
//!                             /run.json
//!                             /artifacts/<file>
//!                             /<artifact_path>/model.json
//! <root>/runs/<run_id>          (experiment name)
//! ```
//!
//! and hands out references of the form `runs:/<run_id>/<artifact_path>`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::fitter::FittedModel;
use crate::types::{ArimaConfig, ArimaOrder, Trend};

const REFERENCE_SCHEME: &str = "runs:/";

/// Opaque handle to a persisted model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelReference(String);

impl ModelReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted form of a fitted model: everything needed to filter and
/// forecast again, plus the headline fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub order: ArimaOrder,
    pub trend: Trend,
    /// Constrained parameters, layout `[trend | ar | ma]`.
    pub params: Vec<f64>,
    pub param_names: Vec<String>,
    pub scale: f64,
    pub loglike: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_obs: usize,
    pub trained_time: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn from_fitted(model: &FittedModel, trained_time: DateTime<Utc>) -> Self {
        Self {
            order: model.order,
            trend: model.trend,
            params: model.params.clone(),
            param_names: model.estimates.iter().map(|e| e.name.clone()).collect(),
            scale: model.scale,
            loglike: model.loglike,
            aic: model.aic,
            bic: model.bic,
            n_obs: model.n_obs,
            trained_time,
        }
    }

    pub fn config(&self) -> ArimaConfig {
        ArimaConfig::for_candidate(self.order, self.trend)
    }
}

/// Experiment tracker / model store.
pub trait ModelRegistry: Send + Sync {
    /// Open a run under `experiment`, creating the experiment if needed.
    fn start_run(&self, experiment: &str) -> Result<Box<dyn RegistryRun>, RegistryError>;

    /// Resolve a reference returned by [`RegistryRun::log_model`].
    fn load_model(&self, reference: &ModelReference) -> Result<ModelArtifact, RegistryError>;
}

/// One open run. Everything logged through it is scoped to the run.
pub trait RegistryRun {
    fn run_id(&self) -> &str;
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), RegistryError>;
    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<(), RegistryError>;
    /// Copy a local file into the run's artifact store.
    fn log_artifact(&mut self, local_path: &Path) -> Result<(), RegistryError>;
    fn log_model(
        &mut self,
        artifact_path: &str,
        model: &ModelArtifact,
    ) -> Result<ModelReference, RegistryError>;
    /// Close the run as successful.
    fn finish(self: Box<Self>) -> Result<(), RegistryError>;
    /// Close the run as failed after a logging step went wrong.
    fn fail(self: Box<Self>) -> Result<(), RegistryError>;
}

/// Registry rooted at a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }
}

fn unavailable(context: &str, path: &Path, e: io::Error) -> RegistryError {
    RegistryError::Unavailable(format!("{} '{}': {}", context, path.display(), e))
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        Err(RegistryError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RegistryError> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| RegistryError::Corrupt(format!("cannot serialize '{}': {}", path.display(), e)))?;
    fs::write(path, body).map_err(|e| unavailable("cannot write", path, e))
}

impl ModelRegistry for FsRegistry {
    fn start_run(&self, experiment: &str) -> Result<Box<dyn RegistryRun>, RegistryError> {
        check_name(experiment)?;
        let run_id = Uuid::new_v4().simple().to_string();
        let dir = self.root.join(experiment).join(&run_id);
        fs::create_dir_all(&dir).map_err(|e| unavailable("cannot create run", &dir, e))?;

        let index = self.index_path(&run_id);
        if let Some(parent) = index.parent() {
            fs::create_dir_all(parent).map_err(|e| unavailable("cannot create index", parent, e))?;
        }
        fs::write(&index, experiment).map_err(|e| unavailable("cannot write index", &index, e))?;

        debug!(experiment, run_id = %run_id, "registry run started");
        Ok(Box::new(FsRun {
            dir,
            run_id,
            started: Utc::now(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }))
    }

    fn load_model(&self, reference: &ModelReference) -> Result<ModelArtifact, RegistryError> {
        let not_found = || RegistryError::NotFound(reference.to_string());
        let (run_id, artifact_path) = reference
            .as_str()
            .strip_prefix(REFERENCE_SCHEME)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(not_found)?;
        if check_name(run_id).is_err() || check_name(artifact_path).is_err() {
            return Err(not_found());
        }

        let index = self.index_path(run_id);
        let experiment = match fs::read_to_string(&index) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(unavailable("cannot read index", &index, e)),
        };
        let experiment = experiment.trim();
        check_name(experiment).map_err(|_| RegistryError::Corrupt(index.display().to_string()))?;

        let model_path = self
            .root
            .join(experiment)
            .join(run_id)
            .join(artifact_path)
            .join("model.json");
        let body = match fs::read_to_string(&model_path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(unavailable("cannot read model", &model_path, e)),
        };
        serde_json::from_str(&body)
            .map_err(|e| RegistryError::Corrupt(format!("'{}': {}", model_path.display(), e)))
    }
}

#[derive(Serialize)]
struct RunInfo<'a> {
    run_id: &'a str,
    status: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

struct FsRun {
    dir: PathBuf,
    run_id: String,
    started: DateTime<Utc>,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
}

impl RegistryRun for FsRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), RegistryError> {
        self.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_json(&self.dir.join("params.json"), &self.params)
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<(), RegistryError> {
        self.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        write_json(&self.dir.join("metrics.json"), &self.metrics)
    }

    fn log_artifact(&mut self, local_path: &Path) -> Result<(), RegistryError> {
        let file_name = local_path
            .file_name()
            .ok_or_else(|| RegistryError::InvalidName(local_path.display().to_string()))?;
        let dest_dir = self.dir.join("artifacts");
        fs::create_dir_all(&dest_dir).map_err(|e| unavailable("cannot create", &dest_dir, e))?;
        let dest = dest_dir.join(file_name);
        fs::copy(local_path, &dest).map_err(|e| unavailable("cannot store artifact", &dest, e))?;
        Ok(())
    }

    fn log_model(
        &mut self,
        artifact_path: &str,
        model: &ModelArtifact,
    ) -> Result<ModelReference, RegistryError> {
        check_name(artifact_path)?;
        let dir = self.dir.join(artifact_path);
        fs::create_dir_all(&dir).map_err(|e| unavailable("cannot create", &dir, e))?;
        write_json(&dir.join("model.json"), model)?;
        Ok(ModelReference::new(format!(
            "{}{}/{}",
            REFERENCE_SCHEME, self.run_id, artifact_path
        )))
    }

    fn finish(self: Box<Self>) -> Result<(), RegistryError> {
        self.close("FINISHED")
    }

    fn fail(self: Box<Self>) -> Result<(), RegistryError> {
        self.close("FAILED")
    }
}

impl FsRun {
    fn close(&self, status: &str) -> Result<(), RegistryError> {
        let info = RunInfo {
            run_id: &self.run_id,
            status,
            start_time: self.started,
            end_time: Utc::now(),
        };
        debug!(run_id = %self.run_id, status, "registry run closed");
        write_json(&self.dir.join("run.json"), &info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            order: ArimaOrder::new(1, 0, 1),
            trend: Trend::Constant,
            params: vec![100.0, 0.7, 0.4],
            param_names: vec!["const".into(), "ar.L1".into(), "ma.L1".into(), "sigma2".into()],
            scale: 1.02,
            loglike: -420.0,
            aic: 850.0,
            bic: 864.0,
            n_obs: 300,
            trained_time: Utc::now(),
        }
    }

    #[test]
    fn test_log_and_load_model() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        let mut run = registry.start_run("EXP_A").unwrap();
        let run_id = run.run_id().to_string();
        let reference = run.log_model("EXP_A", &artifact()).unwrap();
        run.finish().unwrap();

        assert_eq!(reference.as_str(), format!("runs:/{}/EXP_A", run_id));
        let loaded = registry.load_model(&reference).unwrap();
        assert_eq!(loaded, artifact_with_time(loaded.trained_time));
        assert!(dir.path().join("EXP_A").join(&run_id).join("run.json").exists());
    }

    fn artifact_with_time(t: DateTime<Utc>) -> ModelArtifact {
        ModelArtifact {
            trained_time: t,
            ..artifact()
        }
    }

    #[test]
    fn test_params_and_metrics_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        let mut run = registry.start_run("EXP_B").unwrap();
        let run_dir = dir.path().join("EXP_B").join(run.run_id());

        run.log_metrics(&BTreeMap::from([("aic".to_string(), 1.0)])).unwrap();
        run.log_metrics(&BTreeMap::from([("bic".to_string(), 2.0)])).unwrap();
        run.log_params(&BTreeMap::from([("p".to_string(), "1".to_string())])).unwrap();

        let metrics: BTreeMap<String, f64> =
            serde_json::from_str(&fs::read_to_string(run_dir.join("metrics.json")).unwrap()).unwrap();
        assert_eq!(metrics.len(), 2);
        let params: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(run_dir.join("params.json")).unwrap()).unwrap();
        assert_eq!(params["p"], "1");
    }

    #[test]
    fn test_log_artifact_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let local = scratch.path().join("summary.txt");
        fs::write(&local, "hello").unwrap();

        let registry = FsRegistry::new(dir.path());
        let mut run = registry.start_run("EXP_C").unwrap();
        run.log_artifact(&local).unwrap();
        let stored = dir
            .path()
            .join("EXP_C")
            .join(run.run_id())
            .join("artifacts")
            .join("summary.txt");
        assert_eq!(fs::read_to_string(stored).unwrap(), "hello");
    }

    #[test]
    fn test_run_status_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        let status = |run_id: &str| -> String {
            let path = dir.path().join("EXP_D").join(run_id).join("run.json");
            let info: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
            info["status"].as_str().unwrap().to_string()
        };

        let ok = registry.start_run("EXP_D").unwrap();
        let ok_id = ok.run_id().to_string();
        ok.finish().unwrap();
        assert_eq!(status(&ok_id), "FINISHED");

        let failed = registry.start_run("EXP_D").unwrap();
        let failed_id = failed.run_id().to_string();
        failed.fail().unwrap();
        assert_eq!(status(&failed_id), "FAILED");
    }

    #[test]
    fn test_unknown_references_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        for r in ["runs:/deadbeef/EXP", "not-a-reference", "runs:/../x", "runs:/abc"] {
            let err = registry.load_model(&ModelReference::new(r)).unwrap_err();
            assert!(matches!(err, RegistryError::NotFound(_)), "{}: {:?}", r, err);
        }
    }

    #[test]
    fn test_root_under_a_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, "x").unwrap();
        let registry = FsRegistry::new(&file);
        let err = registry.start_run("EXP").err().unwrap();
        assert!(matches!(err, RegistryError::Unavailable(_)));
    }

    #[test]
    fn test_path_like_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        assert!(matches!(
            registry.start_run("../escape").err().unwrap(),
            RegistryError::InvalidName(_)
        ));
    }
}
