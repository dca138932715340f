//! # Main: CLI Entry Point
//!
//! Routes subcommands to the HTTP server, schema migration and one-shot
//! model operations.
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API (`--in-memory` skips PostgreSQL).
//! - `migrate`: create the schema.
//! - `train`, `predict`, `tune`: run one model lifecycle call and print JSON.
//! - `plot`: print a station's monthly averages.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection.
//! - `--trainer-url` / `TRAINER_BASE_URL`: ML service base, e.g. `http://ml:8000/api/`.
//! - `--trainer-timeout-secs` / `TRAINER_TIMEOUT_SECS`: per-call timeout.
//! - `--config` / `RIVERWATCH_CONFIG`: optional TOML file; flags win over it.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use riverwatch::types::{Indicator, Method, SearchMethod};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "riverwatch",
    about = "Water-quality monitoring backend with remote model training"
)]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Base URL of the ML training service
    #[arg(long, env = "TRAINER_BASE_URL")]
    trainer_url: Option<String>,

    /// Timeout for a single training/prediction/tuning call, in seconds
    #[arg(long, env = "TRAINER_TIMEOUT_SECS")]
    trainer_timeout_secs: Option<u64>,

    /// Optional TOML configuration file
    #[arg(long, env = "RIVERWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Port to listen on (default 8080)
        #[arg(long)]
        port: Option<u16>,
        /// Keep all data in memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
    },
    /// Create the database schema
    Migrate,
    /// Train a model and store its RMSE
    Train {
        /// Indicator to model: PH, DO or NH3N
        #[arg(long)]
        indicator: Indicator,
        /// Algorithm: ADABOOST, SVM, LSTM, GRU or BI-RNN
        #[arg(long)]
        method: Method,
        /// Owning user id
        #[arg(long)]
        uid: i32,
    },
    /// Predict next month's value with a trained model
    Predict {
        /// Model id
        #[arg(long)]
        id: i32,
        /// Indicator the model predicts
        #[arg(long)]
        indicator: Indicator,
    },
    /// Search hyper-parameters for a trained model
    Tune {
        /// Model id
        #[arg(long)]
        id: i32,
        /// Search strategy: random or bayesian
        #[arg(long)]
        method: SearchMethod,
    },
    /// Print monthly averages for a station
    Plot {
        /// Station id
        #[arg(long)]
        station: i32,
        /// Years of history
        #[arg(long, default_value_t = 1)]
        period: u32,
        /// Indicator to average
        #[arg(long)]
        indicator: Indicator,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { port, in_memory } => cli::run_serve(&cli, *port, *in_memory),
        Commands::Migrate => cli::run_migrate(&cli),
        Commands::Train {
            indicator,
            method,
            uid,
        } => cli::run_train(&cli, *indicator, *method, *uid),
        Commands::Predict { id, indicator } => cli::run_predict(&cli, *id, *indicator),
        Commands::Tune { id, method } => cli::run_tune(&cli, *id, *method),
        Commands::Plot {
            station,
            period,
            indicator,
        } => cli::run_plot(&cli, *station, *period, *indicator),
    }
}
