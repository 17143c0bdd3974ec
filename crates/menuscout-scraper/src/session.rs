//! Seams between the coordinator and its collaborators.
//!
//! A [`SessionFactory`] opens one isolated [`ScrapeSession`] per task; the
//! session extracts raw records of type `R`; a [`Persist`] sink writes them.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use menuscout_core::RecordError;
use menuscout_db::UpsertBatchResult;

use crate::error::ScraperError;
use crate::task::ScrapeTask;

/// One extracted item: a raw record, or the reason it could not be read.
/// Bad items travel with the batch and are counted as row errors.
pub type RawRecord<R> = Result<R, RecordError>;

/// Opens a fresh session for each task. Sessions are never reused.
pub trait SessionFactory<R>: Send + Sync + 'static {
    type Session: ScrapeSession<R>;

    fn open(
        &self,
        task: &ScrapeTask,
    ) -> impl Future<Output = Result<Self::Session, ScraperError>> + Send;
}

/// An isolated extraction context owned by one task for its lifetime.
pub trait ScrapeSession<R>: Send + 'static {
    /// Raw records for the task's target, or an extraction error when the
    /// target as a whole cannot be read.
    fn extract(
        &mut self,
        task: &ScrapeTask,
    ) -> impl Future<Output = Result<Vec<RawRecord<R>>, ScraperError>> + Send;

    /// Tear the session down. Called once, whether extraction succeeded or not.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Where extracted records go.
pub trait Persist<R>: Send + Sync + 'static {
    /// Whether persistence can take work right now. Must not change breaker
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Persistence`] with a circuit-open error when
    /// the store is known to be unavailable.
    fn check_ready(&self) -> Result<(), ScraperError>;

    fn persist(
        &self,
        task: &ScrapeTask,
        records: Vec<RawRecord<R>>,
    ) -> impl Future<Output = Result<UpsertBatchResult, ScraperError>> + Send;
}

/// Shared cooperative cancellation signal. Workers check it between phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
