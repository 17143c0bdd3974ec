//! Persistence sinks that validate raw records and hand them to the database.

use std::collections::HashMap;

use menuscout_core::{Category, RawProduct, RawRestaurant};
use menuscout_db::{Database, UpsertBatchResult};

use crate::error::ScraperError;
use crate::session::{Persist, RawRecord};
use crate::task::ScrapeTask;

/// Writes restaurant listings under the category named by the task scope.
#[derive(Debug, Clone)]
pub struct RestaurantSink {
    db: Database,
    categories: HashMap<String, Category>,
}

impl RestaurantSink {
    #[must_use]
    pub fn new(db: Database, categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            db,
            categories: categories.into_iter().map(|c| (c.slug.clone(), c)).collect(),
        }
    }
}

impl Persist<RawRestaurant> for RestaurantSink {
    fn check_ready(&self) -> Result<(), ScraperError> {
        Ok(self.db.check_ready()?)
    }

    async fn persist(
        &self,
        task: &ScrapeTask,
        records: Vec<RawRecord<RawRestaurant>>,
    ) -> Result<UpsertBatchResult, ScraperError> {
        let category = self
            .categories
            .get(&task.scope)
            .ok_or_else(|| ScraperError::UnknownScope {
                scope: task.scope.clone(),
            })?;
        let batch: Vec<_> = records
            .into_iter()
            .map(|record| record.and_then(|raw| raw.validate(&category.slug, &task.city)))
            .collect();
        Ok(self.db.upsert_restaurants(category, &batch).await?)
    }
}

/// Writes menu items under the restaurant whose key is the task scope.
#[derive(Debug, Clone)]
pub struct ProductSink {
    db: Database,
}

impl ProductSink {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl Persist<RawProduct> for ProductSink {
    fn check_ready(&self) -> Result<(), ScraperError> {
        Ok(self.db.check_ready()?)
    }

    async fn persist(
        &self,
        task: &ScrapeTask,
        records: Vec<RawRecord<RawProduct>>,
    ) -> Result<UpsertBatchResult, ScraperError> {
        let batch: Vec<_> = records
            .into_iter()
            .map(|record| record.and_then(|raw| raw.validate(&task.scope)))
            .collect();
        Ok(self.db.upsert_products(&batch).await?)
    }
}

/// Accepts everything and writes nothing. Used by `--dry-run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSink;

impl<R: Send + 'static> Persist<R> for DryRunSink {
    fn check_ready(&self) -> Result<(), ScraperError> {
        Ok(())
    }

    async fn persist(
        &self,
        task: &ScrapeTask,
        records: Vec<RawRecord<R>>,
    ) -> Result<UpsertBatchResult, ScraperError> {
        tracing::info!(
            task_id = task.id,
            target = %task.target_name,
            records = records.len(),
            "dry run: skipping persistence"
        );
        Ok(UpsertBatchResult::default())
    }
}
