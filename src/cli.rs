//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs`. One-shot
//! commands print their result as JSON on stdout; failures surface as a
//! non-zero exit with the error on stderr.

use anyhow::{anyhow, Result};
use riverwatch::aggregate::Aggregator;
use riverwatch::clock::Clock;
use riverwatch::config::{Overrides, Settings};
use riverwatch::orchestrator::ModelOrchestrator;
use riverwatch::prom_metrics::Metrics;
use riverwatch::trainer::HttpTrainerClient;
use riverwatch::types::{Indicator, Method, SearchMethod};
use riverwatch::{dashboard, db};
use std::sync::Arc;
use tracing::info;

use super::Cli;

fn settings(cli: &Cli, port: Option<u16>) -> Result<Settings> {
    Settings::load(
        cli.config.as_deref(),
        Overrides {
            database_url: cli.database_url.clone(),
            trainer_url: cli.trainer_url.clone(),
            trainer_timeout_secs: cli.trainer_timeout_secs,
            port,
        },
    )
}

async fn connect(settings: &Settings) -> Result<Arc<db::Database>> {
    let database = db::Database::connect(settings.require_database_url()?).await?;
    Ok(Arc::new(database))
}

async fn orchestrator(settings: &Settings) -> Result<ModelOrchestrator> {
    let database = connect(settings).await?;
    let trainer = Arc::new(HttpTrainerClient::new(
        &settings.trainer_base_url,
        settings.trainer_timeout,
    ));
    Ok(ModelOrchestrator::new(
        database.clone(),
        database.clone(),
        Aggregator::new(database),
        trainer,
        Arc::new(Metrics::new()),
    ))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_serve(cli: &Cli, port: Option<u16>, in_memory: bool) -> Result<()> {
    let settings = settings(cli, port)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(dashboard::run(&settings, in_memory))
}

pub fn run_migrate(cli: &Cli) -> Result<()> {
    let settings = settings(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let database = connect(&settings).await?;
        database.migrate().await?;
        info!("schema ready");
        Ok::<(), anyhow::Error>(())
    })
}

pub fn run_train(cli: &Cli, indicator: Indicator, method: Method, uid: i32) -> Result<()> {
    let settings = settings(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let orchestrator = orchestrator(&settings).await?;
        orchestrator
            .train(indicator, method, uid)
            .await
            .map_err(|e| anyhow!("training failed: {}", e))
    })?;
    print_json(&serde_json::json!({"status": "success", "data": report}))
}

pub fn run_predict(cli: &Cli, id: i32, indicator: Indicator) -> Result<()> {
    let settings = settings(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let orchestrator = orchestrator(&settings).await?;
        orchestrator
            .predict(id, indicator)
            .await
            .map_err(|e| anyhow!("prediction failed: {}", e))
    })?;
    let (dates, values) = outcome.series.into_parts();
    print_json(&serde_json::json!({
        "status": "success",
        "forPlot": values,
        "dates": dates,
        "pred": outcome.predicted,
    }))
}

pub fn run_tune(cli: &Cli, id: i32, method: SearchMethod) -> Result<()> {
    let settings = settings(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let orchestrator = orchestrator(&settings).await?;
        orchestrator
            .tune(id, method)
            .await
            .map_err(|e| anyhow!("tuning failed: {}", e))
    })?;
    print_json(&serde_json::json!({"status": "success", "data": report}))
}

pub fn run_plot(cli: &Cli, station: i32, period: u32, indicator: Indicator) -> Result<()> {
    let settings = settings(cli, None)?;
    let rt = tokio::runtime::Runtime::new()?;
    let series = rt.block_on(async {
        let database = connect(&settings).await?;
        Aggregator::new(database)
            .plot(station, period, indicator, Clock::system().now())
            .await
    })?;
    let (dates, values) = series.into_parts();
    print_json(&serde_json::json!({"waterquality": values, "dates": dates}))
}
