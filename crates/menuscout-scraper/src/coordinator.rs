//! Bounded parallel scraping across targets.
//!
//! Every target becomes one [`ScrapeTask`] on a `JoinSet`; a semaphore with
//! `max_workers` permits bounds how many run at once. Each running task owns
//! one session from the factory and moves `pending → running → succeeded |
//! failed`. Results are collected in completion order and folded into a
//! [`Summary`]. Nothing a single task does can fail the whole call.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use menuscout_core::AppConfig;
use menuscout_db::UpsertBatchResult;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::ScraperError;
use crate::session::{CancellationFlag, Persist, ScrapeSession, SessionFactory};
use crate::task::{ScrapeResult, ScrapeTarget, ScrapeTask, Summary};

const DEFAULT_MAX_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub max_workers: usize,
    /// City stamped on every task.
    pub city: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            city: "Birigui".to_string(),
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_workers: config.scraper_max_workers,
            city: config.city.clone(),
        }
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

pub struct ScrapeCoordinator<F, P> {
    factory: Arc<F>,
    sink: Arc<P>,
    config: CoordinatorConfig,
    cancel: CancellationFlag,
}

impl<F, P> ScrapeCoordinator<F, P> {
    pub fn new(factory: F, sink: P, config: CoordinatorConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            sink: Arc::new(sink),
            config,
            cancel: CancellationFlag::new(),
        }
    }

    /// Share an externally owned cancellation flag, e.g. one set on Ctrl-C.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Scrape every target with at most `max_workers` running at once.
    ///
    /// Never fails: extraction errors, persistence errors, open breakers,
    /// cancellation, and worker panics all become failed results.
    pub async fn scrape_parallel<R>(&self, targets: Vec<ScrapeTarget>) -> Summary
    where
        R: Send + 'static,
        F: SessionFactory<R>,
        P: Persist<R>,
    {
        let started = Instant::now();
        let max_workers = self.config.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut set = JoinSet::new();
        let mut spawned = HashMap::new();

        tracing::info!(targets = targets.len(), max_workers, "starting parallel scrape");

        for (id, target) in targets.into_iter().enumerate() {
            let task = ScrapeTask {
                id,
                target_name: target.name,
                target_url: target.url,
                city: self.config.city.clone(),
                scope: target.scope,
            };
            let name = task.target_name.clone();
            let factory = Arc::clone(&self.factory);
            let sink = Arc::clone(&self.sink);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            let handle = set.spawn(async move {
                let task_id = task.id;
                let name = task.target_name.clone();
                let queued = Instant::now();
                let worker = run_task::<R, F, P>(&*factory, &*sink, semaphore, &cancel, task);
                match AssertUnwindSafe(worker).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let err = ScraperError::Panicked(panic_message(payload.as_ref()));
                        tracing::error!(task_id, target = %name, error = %err, "worker panicked");
                        ScrapeResult::failed(task_id, &name, err.to_string(), queued.elapsed())
                    }
                }
            });
            spawned.insert(handle.id(), (id, name));
        }

        let mut results = Vec::with_capacity(spawned.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(join_err) => {
                    let Some((task_id, name)) = spawned.get(&join_err.id()) else {
                        tracing::error!(error = %join_err, "unknown worker task ended abnormally");
                        continue;
                    };
                    tracing::error!(task_id, target = %name, error = %join_err, "worker task ended abnormally");
                    results.push(ScrapeResult::failed(
                        *task_id,
                        name,
                        join_err.to_string(),
                        started.elapsed(),
                    ));
                }
            }
        }

        let summary = Summary::from_results(results, started.elapsed());
        tracing::info!(
            total = summary.total_targets,
            succeeded = summary.succeeded,
            failed = summary.failed,
            items = summary.total_items,
            inserted = summary.total_inserted,
            updated = summary.total_updated,
            duplicates = summary.total_duplicates,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "parallel scrape finished"
        );
        summary
    }
}

/// Wait for a worker slot, then run one task to a terminal result.
async fn run_task<R, F, P>(
    factory: &F,
    sink: &P,
    semaphore: Arc<Semaphore>,
    cancel: &CancellationFlag,
    task: ScrapeTask,
) -> ScrapeResult
where
    R: Send + 'static,
    F: SessionFactory<R>,
    P: Persist<R>,
{
    let queued = Instant::now();
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return ScrapeResult::failed(
            task.id,
            &task.target_name,
            "worker pool closed".to_string(),
            queued.elapsed(),
        );
    };

    let started = Instant::now();
    tracing::debug!(task_id = task.id, target = %task.target_name, "task running");

    match execute::<R, F, P>(factory, sink, cancel, &task).await {
        Ok((items, batch)) => {
            tracing::info!(
                task_id = task.id,
                target = %task.target_name,
                items,
                inserted = batch.inserted,
                updated = batch.updated,
                unchanged = batch.unchanged,
                errors = batch.errors,
                "task succeeded"
            );
            ScrapeResult::succeeded(&task, items, &batch, started.elapsed())
        }
        Err(err) => {
            tracing::warn!(
                task_id = task.id,
                target = %task.target_name,
                error = %err,
                "task failed"
            );
            ScrapeResult::failed(task.id, &task.target_name, err.to_string(), started.elapsed())
        }
    }
}

async fn execute<R, F, P>(
    factory: &F,
    sink: &P,
    cancel: &CancellationFlag,
    task: &ScrapeTask,
) -> Result<(usize, UpsertBatchResult), ScraperError>
where
    R: Send + 'static,
    F: SessionFactory<R>,
    P: Persist<R>,
{
    if cancel.is_cancelled() {
        return Err(ScraperError::Cancelled);
    }
    // Do not tie up a session while persistence is known to be down.
    sink.check_ready()?;

    let mut session = factory.open(task).await?;
    let extracted = session.extract(task).await;
    session.close().await;
    let records = extracted?;

    if cancel.is_cancelled() {
        return Err(ScraperError::Cancelled);
    }

    let items = records.len();
    let batch = sink.persist(task, records).await?;
    Ok((items, batch))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
