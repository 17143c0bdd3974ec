//! `db` subcommands: connectivity, migrations, category seeding, health.

use clap::Subcommand;
use menuscout_core::{load_targets, AppConfig, Category, RecordError};
use menuscout_db::{Database, RunType};

use crate::fail_run_best_effort;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Run `SELECT 1` through the resilient executor
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert the categories listed in the targets file
    Seed,
    /// Show breaker state and recent scrape runs
    Status {
        /// Number of recent runs to list
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

pub(crate) async fn run(db: &Database, config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            db.ping().await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = db.run_migrations().await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Seed => run_seed(db, config).await?,
        DbCommands::Status { limit } => run_status(db, limit).await?,
    }
    Ok(())
}

/// Upsert every configured target as a category, tracked as a `categories` run.
///
/// # Errors
///
/// Returns an error if the targets file cannot be loaded, the run cannot be
/// created, or the batch cannot be committed.
async fn run_seed(db: &Database, config: &AppConfig) -> anyhow::Result<()> {
    let targets = load_targets(&config.targets_path)?;
    let batch: Vec<Result<Category, RecordError>> = targets
        .targets
        .iter()
        .map(|t| t.to_category(&config.city))
        .collect();

    let run = menuscout_db::create_scrape_run(db, RunType::Categories, "cli").await?;
    if let Err(e) = menuscout_db::start_scrape_run(db, run.id).await {
        fail_run_best_effort(db, run.id, RunType::Categories, format!("{e:#}")).await;
        return Err(e.into());
    }

    let result = match db.upsert_categories(&batch).await {
        Ok(result) => result,
        Err(e) => {
            fail_run_best_effort(db, run.id, RunType::Categories, format!("{e:#}")).await;
            return Err(e.into());
        }
    };

    let processed = i32::try_from(result.processed()).unwrap_or(i32::MAX);
    if let Err(e) = menuscout_db::complete_scrape_run(db, run.id, processed).await {
        fail_run_best_effort(db, run.id, RunType::Categories, format!("{e:#}")).await;
        return Err(e.into());
    }

    println!(
        "seeded {} categories: {} inserted, {} updated, {} unchanged, {} invalid",
        batch.len(),
        result.inserted,
        result.updated,
        result.unchanged,
        result.errors
    );
    Ok(())
}

async fn run_status(db: &Database, limit: u32) -> anyhow::Result<()> {
    println!("circuit breakers:");
    for status in db.breaker_status() {
        let age = status
            .last_failure_age
            .map_or_else(|| "never".to_string(), |d| format!("{}s ago", d.as_secs()));
        println!(
            "  {:<12} {:<10} failures {}/{}  successes {}  last failure {age}",
            status.name,
            status.state.to_string(),
            status.failure_count,
            status.failure_threshold,
            status.success_count
        );
    }

    let runs = menuscout_db::list_scrape_runs(db, limit).await?;
    if runs.is_empty() {
        println!("no scrape runs recorded");
        return Ok(());
    }
    println!("recent runs:");
    for run in runs {
        println!(
            "  #{:<5} {:<12} {:<10} items {:<6} {}{}",
            run.id,
            run.run_type,
            run.status,
            run.items_processed,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.error_message
                .map(|m| format!("  ({m})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
