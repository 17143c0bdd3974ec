//! `scrape` subcommands.
//!
//! Each invocation is tracked as one scrape run: create → start → coordinator
//! → complete, or fail when every target failed. Dry runs skip the run log
//! and never connect to the database. Ctrl-C sets the shared cancellation
//! flag so in-flight tasks stop between phases.

use clap::Subcommand;
use menuscout_core::{load_targets, AppConfig, Category, RawProduct, RawRestaurant};
use menuscout_db::{Database, RunType};
use menuscout_scraper::{
    CancellationFlag, CoordinatorConfig, DryRunSink, HttpSessionFactory, Persist, ProductSink,
    RestaurantSink, ScrapeCoordinator, ScrapeTarget, SessionFactory, Summary,
    SyntheticSessionFactory,
};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::fail_run_best_effort;

#[derive(Debug, Subcommand)]
pub enum ScrapeCommands {
    /// Scrape restaurant listings for the configured categories
    Restaurants {
        /// Restrict to these category slugs (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Override the configured number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Generate deterministic records instead of fetching pages
        #[arg(long)]
        synthetic: bool,

        /// Scrape without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Scrape menus of stored restaurants in one category
    Products {
        /// Category slug whose restaurants are scraped
        #[arg(long)]
        category: String,

        /// Override the configured number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Generate deterministic records instead of fetching pages
        #[arg(long)]
        synthetic: bool,
    },
}

impl ScrapeCommands {
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ScrapeCommands::Restaurants { dry_run: true, .. })
    }
}

pub(crate) async fn run(
    db: &Database,
    config: &AppConfig,
    command: ScrapeCommands,
) -> anyhow::Result<()> {
    if command.is_dry_run() {
        return run_dry(config, command).await;
    }
    match command {
        ScrapeCommands::Restaurants {
            categories,
            workers,
            synthetic,
            ..
        } => run_restaurants(db, config, &categories, workers, synthetic).await,
        ScrapeCommands::Products {
            category,
            workers,
            synthetic,
        } => run_products(db, config, &category, workers, synthetic).await,
    }
}

fn coordinator_config(config: &AppConfig, workers: Option<usize>) -> CoordinatorConfig {
    let base = CoordinatorConfig::from_app_config(config);
    match workers {
        Some(n) => base.with_max_workers(n.max(1)),
        None => base,
    }
}

/// Cancel `flag` on the first Ctrl-C. Abort the handle once scraping ends.
fn cancel_on_ctrl_c(flag: CancellationFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c; cancellation disabled");
            return;
        }
        tracing::warn!("received ctrl-c, cancelling remaining tasks");
        flag.cancel();
    })
}

/// Run the coordinator with the synthetic or HTTP extractor.
async fn scrape_with<R, P>(
    config: &AppConfig,
    coordinator_config: CoordinatorConfig,
    synthetic: bool,
    sink: P,
    targets: Vec<ScrapeTarget>,
) -> Summary
where
    R: DeserializeOwned + Send + 'static,
    SyntheticSessionFactory: SessionFactory<R>,
    P: Persist<R>,
{
    let cancel = CancellationFlag::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());

    let summary = if synthetic {
        ScrapeCoordinator::new(SyntheticSessionFactory::default(), sink, coordinator_config)
            .with_cancellation(cancel)
            .scrape_parallel::<R>(targets)
            .await
    } else {
        ScrapeCoordinator::new(
            HttpSessionFactory::from_app_config(config),
            sink,
            coordinator_config,
        )
        .with_cancellation(cancel)
        .scrape_parallel::<R>(targets)
        .await
    };

    watcher.abort();
    summary
}

/// Close out a run from its summary.
///
/// # Errors
///
/// Returns an error when every target failed or the run cannot be completed.
async fn finish_run(
    db: &Database,
    run_id: i64,
    run_type: RunType,
    summary: &Summary,
) -> anyhow::Result<()> {
    if summary.total_targets > 0 && summary.succeeded == 0 {
        let message = format!("all {} targets failed", summary.failed);
        fail_run_best_effort(db, run_id, run_type, message.clone()).await;
        anyhow::bail!("{message}");
    }

    let items = i32::try_from(summary.total_items).unwrap_or(i32::MAX);
    if let Err(e) = menuscout_db::complete_scrape_run(db, run_id, items).await {
        fail_run_best_effort(db, run_id, run_type, format!("{e:#}")).await;
        return Err(e.into());
    }
    Ok(())
}

async fn start_run(db: &Database, run_type: RunType) -> anyhow::Result<i64> {
    let run = menuscout_db::create_scrape_run(db, run_type, "cli").await?;
    if let Err(e) = menuscout_db::start_scrape_run(db, run.id).await {
        fail_run_best_effort(db, run.id, run_type, format!("{e:#}")).await;
        return Err(e.into());
    }
    Ok(run.id)
}

/// Categories and scrape targets for the selected slugs, or `None` when no
/// configured category matches.
fn restaurant_targets(
    config: &AppConfig,
    slugs: &[String],
) -> anyhow::Result<Option<(Vec<Category>, Vec<ScrapeTarget>)>> {
    let file = load_targets(&config.targets_path)?;
    let selected = file.select(slugs);
    if selected.is_empty() {
        println!("no configured categories match {slugs:?}; nothing to scrape");
        return Ok(None);
    }

    let categories = selected
        .iter()
        .map(|t| t.to_category(&config.city))
        .collect::<Result<Vec<Category>, _>>()?;
    let targets = selected
        .iter()
        .zip(&categories)
        .map(|(t, c)| ScrapeTarget {
            name: c.name.clone(),
            url: t.url.clone(),
            scope: c.slug.clone(),
        })
        .collect();
    Ok(Some((categories, targets)))
}

/// Scrape listings and report what would have been written. Needs no
/// database.
///
/// # Errors
///
/// Returns an error if the command is not a restaurant dry run, the targets
/// file cannot be loaded, or a target is invalid.
pub(crate) async fn run_dry(config: &AppConfig, command: ScrapeCommands) -> anyhow::Result<()> {
    let ScrapeCommands::Restaurants {
        categories,
        workers,
        synthetic,
        dry_run: true,
    } = command
    else {
        anyhow::bail!("only `scrape restaurants` supports --dry-run");
    };
    let Some((_, targets)) = restaurant_targets(config, &categories)? else {
        return Ok(());
    };

    let summary = scrape_with::<RawRestaurant, _>(
        config,
        coordinator_config(config, workers),
        synthetic,
        DryRunSink,
        targets,
    )
    .await;
    println!("dry-run: nothing written");
    print_summary(&summary);
    Ok(())
}

/// Scrape listings for the selected categories.
///
/// # Errors
///
/// Returns an error if the targets file cannot be loaded, a target is
/// invalid, the run cannot be tracked, or every target failed.
async fn run_restaurants(
    db: &Database,
    config: &AppConfig,
    slugs: &[String],
    workers: Option<usize>,
    synthetic: bool,
) -> anyhow::Result<()> {
    let Some((categories, targets)) = restaurant_targets(config, slugs)? else {
        return Ok(());
    };

    let run_id = start_run(db, RunType::Restaurants).await?;
    let summary = scrape_with::<RawRestaurant, _>(
        config,
        coordinator_config(config, workers),
        synthetic,
        RestaurantSink::new(db.clone(), categories),
        targets,
    )
    .await;
    print_summary(&summary);
    finish_run(db, run_id, RunType::Restaurants, &summary).await
}

/// Scrape menus for every stored restaurant in `category` that has a URL.
///
/// # Errors
///
/// Returns an error if the restaurants cannot be listed, the run cannot be
/// tracked, or every target failed.
async fn run_products(
    db: &Database,
    config: &AppConfig,
    category: &str,
    workers: Option<usize>,
    synthetic: bool,
) -> anyhow::Result<()> {
    let targets: Vec<ScrapeTarget> = menuscout_db::restaurants_in_category(db, category)
        .await?
        .into_iter()
        .map(|r| ScrapeTarget {
            name: r.name,
            url: r.url,
            scope: r.unique_key,
        })
        .collect();
    if targets.is_empty() {
        println!("no stored restaurants with a menu URL in category '{category}'");
        return Ok(());
    }

    let run_id = start_run(db, RunType::Products).await?;
    let summary = scrape_with::<RawProduct, _>(
        config,
        coordinator_config(config, workers),
        synthetic,
        ProductSink::new(db.clone()),
        targets,
    )
    .await;
    print_summary(&summary);
    finish_run(db, run_id, RunType::Products, &summary).await
}

fn print_summary(summary: &Summary) {
    println!(
        "targets: {} ({} succeeded, {} failed, {:.1}% success)",
        summary.total_targets, summary.succeeded, summary.failed, summary.success_rate
    );
    println!(
        "items: {} scraped, {} new, {} updated, {} duplicates, {} invalid, {} price changes",
        summary.total_items,
        summary.total_inserted,
        summary.total_updated,
        summary.total_duplicates,
        summary.total_errors,
        summary.total_price_changes
    );
    println!(
        "elapsed: {:.1}s ({:.1} items/min)",
        summary.elapsed.as_secs_f64(),
        summary.items_per_minute
    );
    for failure in summary.failures() {
        println!(
            "  failed: {} ({})",
            failure.target_name,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
}
