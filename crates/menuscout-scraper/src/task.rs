//! Task, per-task result, and run summary types.

use std::time::Duration;

use menuscout_db::UpsertBatchResult;

/// One unit of scraping work. Built by the coordinator before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTask {
    /// Stable id for correlating results. Not an ordering guarantee.
    pub id: usize,
    pub target_name: String,
    pub target_url: String,
    pub city: String,
    /// Natural key of the parent the records belong to: a category slug for
    /// restaurant listings, a restaurant key for menus.
    pub scope: String,
}

/// Input to the coordinator: what to scrape, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub name: String,
    pub url: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub task_id: usize,
    pub target_name: String,
    pub success: bool,
    pub items_count: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub price_changes: usize,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl ScrapeResult {
    #[must_use]
    pub fn succeeded(
        task: &ScrapeTask,
        items_count: usize,
        batch: &UpsertBatchResult,
        duration: Duration,
    ) -> Self {
        Self {
            task_id: task.id,
            target_name: task.target_name.clone(),
            success: true,
            items_count,
            inserted: batch.inserted,
            updated: batch.updated,
            unchanged: batch.unchanged,
            errors: batch.errors,
            price_changes: batch.price_changes,
            duration_seconds: duration.as_secs_f64(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(task_id: usize, target_name: &str, error: String, duration: Duration) -> Self {
        Self {
            task_id,
            target_name: target_name.to_string(),
            success: false,
            items_count: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            errors: 0,
            price_changes: 0,
            duration_seconds: duration.as_secs_f64(),
            error: Some(error),
        }
    }
}

/// Aggregate over every task of one coordinator call.
///
/// Item and write totals only count succeeded tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_items: usize,
    pub total_inserted: usize,
    pub total_updated: usize,
    pub total_duplicates: usize,
    pub total_errors: usize,
    pub total_price_changes: usize,
    pub elapsed: Duration,
    pub items_per_minute: f64,
    /// Percentage in `0.0..=100.0`; `0.0` for an empty run.
    pub success_rate: f64,
    /// Per-task results in completion order.
    pub results: Vec<ScrapeResult>,
}

impl Summary {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(results: Vec<ScrapeResult>, elapsed: Duration) -> Self {
        let mut summary = Self {
            total_targets: results.len(),
            succeeded: 0,
            failed: 0,
            total_items: 0,
            total_inserted: 0,
            total_updated: 0,
            total_duplicates: 0,
            total_errors: 0,
            total_price_changes: 0,
            elapsed,
            items_per_minute: 0.0,
            success_rate: 0.0,
            results: Vec::new(),
        };

        for result in &results {
            if result.success {
                summary.succeeded += 1;
                summary.total_items += result.items_count;
                summary.total_inserted += result.inserted;
                summary.total_updated += result.updated;
                summary.total_duplicates += result.unchanged;
                summary.total_errors += result.errors;
                summary.total_price_changes += result.price_changes;
            } else {
                summary.failed += 1;
            }
        }

        if summary.total_targets > 0 {
            summary.success_rate =
                summary.succeeded as f64 / summary.total_targets as f64 * 100.0;
        }
        let minutes = elapsed.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            summary.items_per_minute = summary.total_items as f64 / minutes;
        }
        summary.results = results;
        summary
    }

    /// Failed results, for reporting.
    pub fn failures(&self) -> impl Iterator<Item = &ScrapeResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: usize) -> ScrapeTask {
        ScrapeTask {
            id,
            target_name: format!("T{id}"),
            target_url: format!("https://example.com/{id}"),
            city: "Birigui".to_string(),
            scope: "pizza".to_string(),
        }
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = Summary::from_results(Vec::new(), Duration::ZERO);
        assert_eq!(summary.total_targets, 0);
        assert_eq!(summary.succeeded, 0);
        assert!(summary.success_rate.abs() < f64::EPSILON);
        assert!(summary.items_per_minute.abs() < f64::EPSILON);
    }

    #[test]
    fn totals_ignore_failed_tasks() {
        let batch = UpsertBatchResult {
            inserted: 8,
            updated: 1,
            unchanged: 1,
            ..UpsertBatchResult::default()
        };
        let results = vec![
            ScrapeResult::succeeded(&task(0), 10, &batch, Duration::from_secs(1)),
            ScrapeResult::failed(1, "T1", "boom".to_string(), Duration::from_secs(1)),
            ScrapeResult::succeeded(&task(2), 10, &batch, Duration::from_secs(1)),
            ScrapeResult::succeeded(&task(3), 10, &batch, Duration::from_secs(1)),
        ];

        let summary = Summary::from_results(results, Duration::from_secs(30));
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_items, 30);
        assert_eq!(summary.total_inserted, 24);
        assert_eq!(summary.total_duplicates, 3);
        assert!((summary.success_rate - 75.0).abs() < 1e-9);
        assert!((summary.items_per_minute - 60.0).abs() < 1e-9);
        assert_eq!(summary.failures().count(), 1);
    }
}
