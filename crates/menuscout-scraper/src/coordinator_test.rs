use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use menuscout_core::RecordError;
use menuscout_db::DbError;

use super::*;
use crate::session::RawRecord;

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Items(usize),
    /// `good` readable records followed by `bad` undecodable ones.
    Mixed { good: usize, bad: usize },
    Fail,
    Panic,
}

#[derive(Debug, Default)]
struct SessionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct FakeFactory {
    behaviors: HashMap<String, Behavior>,
    default: Behavior,
    delay: Duration,
    stats: Arc<SessionStats>,
}

impl FakeFactory {
    fn uniform(behavior: Behavior) -> Self {
        Self {
            behaviors: HashMap::new(),
            default: behavior,
            delay: Duration::from_millis(10),
            stats: Arc::new(SessionStats::default()),
        }
    }

    fn with(mut self, target: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(target.to_string(), behavior);
        self
    }
}

struct FakeSession {
    behavior: Behavior,
    delay: Duration,
    stats: Arc<SessionStats>,
}

impl SessionFactory<String> for FakeFactory {
    type Session = FakeSession;

    async fn open(&self, task: &ScrapeTask) -> Result<FakeSession, ScraperError> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(active, Ordering::SeqCst);
        Ok(FakeSession {
            behavior: self
                .behaviors
                .get(&task.target_name)
                .copied()
                .unwrap_or(self.default),
            delay: self.delay,
            stats: Arc::clone(&self.stats),
        })
    }
}

impl ScrapeSession<String> for FakeSession {
    async fn extract(&mut self, task: &ScrapeTask) -> Result<Vec<RawRecord<String>>, ScraperError> {
        tokio::time::sleep(self.delay).await;
        match self.behavior {
            Behavior::Items(n) => Ok((0..n)
                .map(|i| Ok(format!("{}-{i}", task.target_name)))
                .collect()),
            Behavior::Mixed { good, bad } => Ok((0..good + bad)
                .map(|i| {
                    if i < good {
                        Ok(format!("{}-{i}", task.target_name))
                    } else {
                        Err(RecordError::Malformed {
                            index: i,
                            reason: "invalid type: integer `123`, expected a string".to_string(),
                        })
                    }
                })
                .collect()),
            Behavior::Fail => Err(ScraperError::Extraction {
                target: task.target_name.clone(),
                reason: "listing markup changed".to_string(),
            }),
            Behavior::Panic => panic!("extractor crashed on {}", task.target_name),
        }
    }

    async fn close(self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts records as inserted the first time and unchanged afterwards.
#[derive(Default)]
struct MemorySink {
    seen: Mutex<HashSet<String>>,
    breaker_open: bool,
}

impl Persist<String> for MemorySink {
    fn check_ready(&self) -> Result<(), ScraperError> {
        if self.breaker_open {
            return Err(ScraperError::Persistence(DbError::CircuitOpen {
                resource: "operation".to_string(),
            }));
        }
        Ok(())
    }

    async fn persist(
        &self,
        _task: &ScrapeTask,
        records: Vec<RawRecord<String>>,
    ) -> Result<UpsertBatchResult, ScraperError> {
        let mut seen = self.seen.lock().unwrap();
        let mut result = UpsertBatchResult::default();
        for record in records {
            let Ok(record) = record else {
                result.errors += 1;
                continue;
            };
            if seen.insert(record) {
                result.inserted += 1;
            } else {
                result.unchanged += 1;
            }
        }
        Ok(result)
    }
}

fn targets(names: &[&str]) -> Vec<ScrapeTarget> {
    names
        .iter()
        .map(|name| ScrapeTarget {
            name: (*name).to_string(),
            url: format!("https://example.com/{name}"),
            scope: name.to_lowercase(),
        })
        .collect()
}

fn config(max_workers: usize) -> CoordinatorConfig {
    CoordinatorConfig::default().with_max_workers(max_workers)
}

#[tokio::test(start_paused = true)]
async fn one_failing_extraction_does_not_fail_the_run() {
    let factory = FakeFactory::uniform(Behavior::Items(3)).with("C", Behavior::Fail);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(2));

    let summary = coordinator
        .scrape_parallel::<String>(targets(&["A", "B", "C", "D", "E"]))
        .await;

    assert_eq!(summary.total_targets, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.target_name, "C");
    assert_eq!(failure.task_id, 2);
    assert!(failure
        .error
        .as_deref()
        .unwrap()
        .contains("listing markup changed"));
}

#[tokio::test(start_paused = true)]
async fn undecodable_items_are_row_errors_not_task_failures() {
    let factory =
        FakeFactory::uniform(Behavior::Items(4)).with("B", Behavior::Mixed { good: 2, bad: 1 });
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(2));

    let summary = coordinator
        .scrape_parallel::<String>(targets(&["A", "B"]))
        .await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total_items, 7);
    assert_eq!(summary.total_inserted, 6);
    assert_eq!(summary.total_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn two_workers_four_targets_ten_items_each() {
    let coordinator = ScrapeCoordinator::new(
        FakeFactory::uniform(Behavior::Items(10)),
        MemorySink::default(),
        config(2),
    );

    let summary = coordinator
        .scrape_parallel::<String>(targets(&["A", "B", "C", "D"]))
        .await;

    assert_eq!(summary.total_items, 40);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.total_inserted, 40);
    assert_eq!(summary.total_duplicates, 0);
    assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn running_sessions_never_exceed_max_workers() {
    let factory = FakeFactory::uniform(Behavior::Items(1));
    let stats = Arc::clone(&factory.stats);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(2));

    let summary = coordinator
        .scrape_parallel::<String>(targets(&["A", "B", "C", "D", "E", "F"]))
        .await;

    assert_eq!(summary.succeeded, 6);
    assert_eq!(stats.peak.load(Ordering::SeqCst), 2);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn sessions_are_closed_after_failed_extraction() {
    let factory = FakeFactory::uniform(Behavior::Fail);
    let stats = Arc::clone(&factory.stats);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(3));

    let summary = coordinator.scrape_parallel::<String>(targets(&["A", "B", "C"])).await;

    assert_eq!(summary.failed, 3);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 3);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn worker_panic_becomes_failed_result() {
    let factory = FakeFactory::uniform(Behavior::Items(2)).with("B", Behavior::Panic);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(2));

    let summary = coordinator.scrape_parallel::<String>(targets(&["A", "B", "C"])).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.task_id, 1);
    let message = failure.error.as_deref().unwrap();
    assert!(message.contains("panicked"), "got: {message}");
    assert!(message.contains("extractor crashed on B"), "got: {message}");
}

#[tokio::test(start_paused = true)]
async fn open_breaker_fails_tasks_without_opening_sessions() {
    let factory = FakeFactory::uniform(Behavior::Items(5));
    let stats = Arc::clone(&factory.stats);
    let sink = MemorySink {
        breaker_open: true,
        ..MemorySink::default()
    };
    let coordinator = ScrapeCoordinator::new(factory, sink, config(2));

    let summary = coordinator.scrape_parallel::<String>(targets(&["A", "B", "C"])).await;

    assert_eq!(summary.failed, 3);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
    assert!(summary
        .failures()
        .all(|r| r.error.as_deref().unwrap().contains("circuit breaker open")));
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_fails_remaining_tasks() {
    let factory = FakeFactory::uniform(Behavior::Items(5));
    let stats = Arc::clone(&factory.stats);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(2));
    coordinator.cancellation().cancel();

    let summary = coordinator.scrape_parallel::<String>(targets(&["A", "B"])).await;

    assert_eq!(summary.failed, 2);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
    assert!(summary
        .failures()
        .all(|r| r.error.as_deref() == Some("cancelled")));
}

#[tokio::test]
async fn empty_target_list_yields_zero_summary() {
    let coordinator = ScrapeCoordinator::new(
        FakeFactory::uniform(Behavior::Items(1)),
        MemorySink::default(),
        config(2),
    );

    let summary = coordinator.scrape_parallel::<String>(Vec::new()).await;

    assert_eq!(summary.total_targets, 0);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_task_reports_exactly_once() {
    let factory = FakeFactory::uniform(Behavior::Items(1))
        .with("B", Behavior::Fail)
        .with("D", Behavior::Panic);
    let coordinator = ScrapeCoordinator::new(factory, MemorySink::default(), config(3));

    let summary = coordinator
        .scrape_parallel::<String>(targets(&["A", "B", "C", "D", "E"]))
        .await;

    let mut ids: Vec<usize> = summary.results.iter().map(|r| r.task_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn replayed_targets_count_as_duplicates() {
    let sink = MemorySink::default();
    let coordinator =
        ScrapeCoordinator::new(FakeFactory::uniform(Behavior::Items(4)), sink, config(2));

    let first = coordinator.scrape_parallel::<String>(targets(&["A", "B"])).await;
    let second = coordinator.scrape_parallel::<String>(targets(&["A", "B"])).await;

    assert_eq!(first.total_inserted, 8);
    assert_eq!(second.total_inserted, 0);
    assert_eq!(second.total_duplicates, 8);
}

#[test]
fn config_builder_overrides_workers() {
    let config = CoordinatorConfig::default().with_max_workers(7);
    assert_eq!(config.max_workers, 7);
    assert_eq!(config.city, "Birigui");
}
