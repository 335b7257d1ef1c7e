//! # stockcast
//!
//! Command-line entry points for the daily price pipeline.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::prelude::*;

use stockcast::config::PipelineConfig;
use stockcast::error::{ForecastError, PipelineError, PublishError, SearchError};
use stockcast::pipeline;
use stockcast::registry::{FsRegistry, ModelReference};
use stockcast::series::{Series, StorageLocation};

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "ARIMA model selection and forecasting for daily stock prices", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(long, global = true, env = "STOCKCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Registry root directory (overrides the config file)
    #[arg(long, global = true, env = "STOCKCAST_REGISTRY")]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the order grid, publish the winner and print its reference
    Train {
        /// Stored price table with `timestamp` and `close` columns
        #[arg(short, long)]
        input: StorageLocation,

        /// Fit candidates one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Forecast with a published model and print the values as JSON
    Predict {
        /// Model reference printed by `train`
        #[arg(short, long)]
        reference: String,

        /// Stored price table with `timestamp` and `close` columns
        #[arg(short, long)]
        input: StorageLocation,

        /// Number of steps past the end of the series
        #[arg(long, default_value = "1")]
        horizon: usize,
    },

    /// Search the order grid and report the winner without publishing
    Search {
        /// Stored price table with `timestamp` and `close` columns
        #[arg(short, long)]
        input: StorageLocation,

        /// Fit candidates one at a time
        #[arg(long)]
        sequential: bool,
    },
}

fn load_config(path: Option<&Path>, registry: Option<PathBuf>) -> Result<PipelineConfig, PipelineError> {
    let mut config = match path {
        Some(p) => PipelineConfig::load_from_file(p)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = registry {
        config.registry_root = root;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut config = load_config(cli.config.as_deref(), cli.registry)?;

    match cli.command {
        Commands::Train { input, sequential } => {
            config.parallel &= !sequential;
            let series = Series::load(&input)?;
            let registry = FsRegistry::new(&config.registry_root);
            let reference = pipeline::train_and_publish(&series, &config, &registry)?;
            println!("{}", reference);
        }
        Commands::Predict {
            reference,
            input,
            horizon,
        } => {
            let series = Series::load(&input)?;
            let registry = FsRegistry::new(&config.registry_root);
            let values =
                pipeline::predict(&series, &ModelReference::new(reference), horizon, &registry)?;
            println!("{}", pipeline::predictions_json(&values)?);
        }
        Commands::Search { input, sequential } => {
            config.parallel &= !sequential;
            let series = Series::load(&input)?;
            let selection = pipeline::search_only(&series, &config)?;
            let best = &selection.best;
            println!(
                "ARIMA{} trend={} aic={:.4} bic={:.4} candidates={} {}",
                best.order,
                best.trend,
                best.aic,
                best.bic,
                selection.n_candidates,
                selection.failures
            );
        }
    }
    Ok(())
}

fn exit_code(e: &PipelineError) -> u8 {
    match e {
        PipelineError::Search(SearchError::NoViableModel { .. }) => 3,
        PipelineError::Publish(PublishError::RegistryUnavailable(_))
        | PipelineError::Forecast(ForecastError::RegistryUnavailable(_))
        | PipelineError::Forecast(ForecastError::ModelNotFound(_)) => 4,
        _ => 1,
    }
}

fn main() -> ExitCode {
    // Load .env file (optional - won't fail if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockcast=info".into()),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline step failed");
            ExitCode::from(exit_code(&e))
        }
    }
}
