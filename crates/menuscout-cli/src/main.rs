mod db;
mod report;
mod scrape;

use clap::{Parser, Subcommand};
use menuscout_db::{Database, RunType};
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;
use crate::report::SearchCommands;
use crate::scrape::ScrapeCommands;

#[derive(Debug, Parser)]
#[command(name = "menuscout-cli")]
#[command(about = "Menuscout command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity, migrations, seeding, and health
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Scrape restaurant listings or menus into the database
    Scrape {
        #[command(subcommand)]
        command: ScrapeCommands,
    },
    /// Print totals and per-category counts
    Stats,
    /// Search stored restaurants and products
    Search {
        #[command(subcommand)]
        command: SearchCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("menuscout-cli ready; run with --help for commands");
        return Ok(());
    };

    let config = menuscout_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Dry runs write nothing, so they must not depend on a reachable database.
    let command = match command {
        Commands::Scrape { command } if command.is_dry_run() => {
            return scrape::run_dry(&config, command).await;
        }
        other => other,
    };

    let db = Database::connect_from_app_config(&config).await?;

    match command {
        Commands::Db { command } => db::run(&db, &config, command).await,
        Commands::Scrape { command } => scrape::run(&db, &config, command).await,
        Commands::Stats => report::run_stats(&db).await,
        Commands::Search { command } => report::run_search(&db, command).await,
    }
}

/// Mark a run as failed, logging instead of propagating if that fails too.
async fn fail_run_best_effort(db: &Database, run_id: i64, run_type: RunType, message: String) {
    if let Err(mark_err) = menuscout_db::fail_scrape_run(db, run_id, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark {run_type} run as failed"
        );
    }
}
