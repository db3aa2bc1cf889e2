use crate::infra::{context, open_store, Backend};
use clap::Args;
use opportunity_ranker::buildings::{BuildingStore, RescoreFailurePolicy};
use opportunity_ranker::config::AppConfig;
use opportunity_ranker::error::AppError;
use opportunity_ranker::telemetry;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct RescoreArgs {
    /// Record per-building failures and keep going instead of aborting
    #[arg(long)]
    pub(crate) continue_on_error: bool,
}

/// Rescores every building once and prints the run report as JSON.
pub(crate) async fn run_rescore(args: RescoreArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if args.continue_on_error {
        config.scoring.failure_policy = RescoreFailurePolicy::Continue;
    }
    telemetry::init(&config.telemetry)?;

    match open_store(&config.database).await? {
        Backend::Postgres(store) => rescore(&config, store).await,
        Backend::Memory(store) => rescore(&config, store).await,
    }
}

/// Prints opportunities whose stored priority disagrees with their score.
pub(crate) async fn run_audit() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match open_store(&config.database).await? {
        Backend::Postgres(store) => audit(&config, store).await,
        Backend::Memory(store) => audit(&config, store).await,
    }
}

async fn rescore<S>(config: &AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: BuildingStore + 'static,
{
    let report = context(store, config).rescorer().run().await?;

    println!("Batch rescore");
    println!(
        "  Processed {} buildings, updated {}",
        report.processed, report.updated
    );
    for failure in &report.failures {
        println!("  Building {}: {}", failure.building_id, failure.reason);
    }
    print_json(&report);
    Ok(())
}

async fn audit<S>(config: &AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: BuildingStore + 'static,
{
    let mismatches = context(store, config).service().audit_priorities().await?;

    if mismatches.is_empty() {
        println!("All stored priorities match their scores");
        return Ok(());
    }

    println!("{} opportunities need a priority refresh", mismatches.len());
    print_json(&mismatches);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("  Could not render JSON: {err}"),
    }
}
