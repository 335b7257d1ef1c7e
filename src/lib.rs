//! ARIMA model selection and forecasting for daily stock price series.
//!
//! The numeric engine (`state_space`, `initialization`, `kalman`,
//! `start_params`, `optimizer`, `inference`) fits ARIMA(p,d,q) models with a
//! deterministic trend by exact maximum likelihood. On top of it sit the
//! pipeline components:
//!
//! * [`fitter`]: fit one candidate order and classify failures,
//! * [`search`]: exhaustive grid search with a deterministic reducer,
//! * [`publish`]: record the winner in a [`registry::ModelRegistry`],
//! * [`forecast`]: reload a published model and forecast.

pub mod config;
pub mod error;
pub mod fitter;
pub mod forecast;
pub mod inference;
pub mod initialization;
pub mod kalman;
pub mod optimizer;
pub mod params;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod search;
pub mod series;
pub mod start_params;
pub mod state_space;
pub mod summary;
pub mod types;

pub use error::{FailureKind, FitFailure, PipelineError};
pub use fitter::{fit, FitOptions, FitOutcome, FittedModel};
pub use forecast::forecast_from_registry;
pub use optimizer::Method;
pub use publish::Publisher;
pub use registry::{FsRegistry, ModelArtifact, ModelReference, ModelRegistry, RegistryRun};
pub use search::{search, GridSpec, SearchOptions, SelectionResult};
pub use series::{Series, StorageLocation};
pub use types::{ArimaOrder, Trend};
