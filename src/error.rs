use std::fmt;

use thiserror::Error;

/// Errors raised by the ARIMA numeric engine.
#[derive(Error, Debug)]
pub enum ArimaError {
    #[error("parameter length mismatch: expected {expected}, got {got}")]
    ParamLengthMismatch { expected: usize, got: usize },

    #[error("state space construction failed: {0}")]
    StateSpaceError(String),

    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("non-finite {0}")]
    NonFinite(&'static str),

    #[error("data error: {0}")]
    DataError(String),

    #[error("cannot format report: {0}")]
    Format(#[from] fmt::Error),
}

pub type Result<T> = std::result::Result<T, ArimaError>;

/// Classified reason a single grid candidate could not be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The likelihood optimization diverged or hit a singular system.
    NumericalInstability,
    /// The order is structurally inapplicable to the series.
    InvalidSpecification,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NumericalInstability => f.write_str("numerical instability"),
            FailureKind::InvalidSpecification => f.write_str("invalid specification"),
        }
    }
}

/// A recoverable, per-candidate fit failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct FitFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl FitFailure {
    pub fn numerical(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NumericalInstability,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidSpecification,
            message: message.into(),
        }
    }
}

impl ArimaError {
    /// Map an engine error raised during a candidate fit to a failure kind.
    ///
    /// Returns `None` for errors that indicate a defect rather than a
    /// modelling failure; those must propagate.
    pub fn classify(&self) -> Option<FailureKind> {
        match self {
            ArimaError::SingularMatrix(_)
            | ArimaError::OptimizationFailed(_)
            | ArimaError::NonFinite(_) => Some(FailureKind::NumericalInstability),
            ArimaError::ParamLengthMismatch { .. }
            | ArimaError::StateSpaceError(_)
            | ArimaError::DataError(_)
            | ArimaError::Format(_) => None,
        }
    }
}

/// Errors produced while building or loading a price series.
#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,

    #[error("timestamps and values differ in length: {timestamps} vs {values}")]
    LengthMismatch { timestamps: usize, values: usize },

    #[error("non-finite value {value} at timestamp {timestamp}")]
    NonFiniteValue { timestamp: i64, value: f64 },

    #[error("timestamps not strictly ascending at index {index}")]
    NotAscending { index: usize },

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Tally of classified candidate failures in one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    pub numerical_instability: usize,
    pub invalid_specification: usize,
}

impl FailureCounts {
    pub fn record(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::NumericalInstability => self.numerical_instability += 1,
            FailureKind::InvalidSpecification => self.invalid_specification += 1,
        }
    }

    /// Counter merge; associative and commutative.
    pub fn merge(self, other: Self) -> Self {
        Self {
            numerical_instability: self.numerical_instability + other.numerical_instability,
            invalid_specification: self.invalid_specification + other.invalid_specification,
        }
    }

    pub fn total(&self) -> usize {
        self.numerical_instability + self.invalid_specification
    }
}

impl fmt::Display for FailureCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "numerical_instability={}, invalid_specification={}",
            self.numerical_instability, self.invalid_specification
        )
    }
}

/// Errors from the grid search coordinator.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("no viable model in the search space ({counts})")]
    NoViableModel { counts: FailureCounts },

    #[error("empty hyperparameter grid")]
    EmptyGrid,

    #[error("candidate {order} failed fatally: {source}")]
    Fit {
        order: crate::types::ArimaOrder,
        #[source]
        source: ArimaError,
    },
}

/// Errors from a model registry backend.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("model reference '{0}' does not resolve")]
    NotFound(String),

    #[error("corrupt registry entry: {0}")]
    Corrupt(String),

    #[error("invalid registry name '{0}'")]
    InvalidName(String),
}

/// Errors from the registry publisher.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[source] RegistryError),

    /// The registry is reachable but refused the request or holds bad data.
    #[error("registry rejected the run: {0}")]
    Registry(#[source] RegistryError),

    #[error("failed to forecast with the winning model: {0}")]
    Forecast(#[source] ArimaError),

    #[error("cannot write scratch file '{path}': {source}")]
    Scratch {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<RegistryError> for PublishError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Unavailable(_) => PublishError::RegistryUnavailable(e),
            other => PublishError::Registry(other),
        }
    }
}

/// Errors from the forecast engine.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("forecast horizon must be positive")]
    InvalidHorizon,

    #[error("registry rejected the request: {0}")]
    Registry(#[source] RegistryError),

    #[error(transparent)]
    Engine(#[from] ArimaError),
}

impl From<RegistryError> for ForecastError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(r) => ForecastError::ModelNotFound(r),
            RegistryError::Unavailable(msg) => ForecastError::RegistryUnavailable(msg),
            other => ForecastError::Registry(other),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level error for pipeline entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot encode predictions: {0}")]
    Encode(String),
}
