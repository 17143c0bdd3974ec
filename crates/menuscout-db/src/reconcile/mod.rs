//! Natural-key reconciliation of scraped batches against stored rows.
//!
//! [`reconcile`] is storage-agnostic: it drives an [`EntityWriter`] that knows
//! how to look rows up by natural key, insert, and update. The MySQL writer
//! lives in [`mysql`]; tests use an in-memory writer.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::ops::AddAssign;

use menuscout_core::{Entity, RecordError};

use crate::DbError;

#[cfg(test)]
pub(crate) mod memory;
pub mod mysql;

/// Most keys bound into a single `IN (...)` lookup.
pub(crate) const LOOKUP_CHUNK: usize = 500;

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertBatchResult {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    /// Updates that recorded a price history entry.
    pub price_changes: usize,
}

impl UpsertBatchResult {
    /// Rows that reached storage, whether or not they were written.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

impl AddAssign for UpsertBatchResult {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.unchanged += rhs.unchanged;
        self.errors += rhs.errors;
        self.price_changes += rhs.price_changes;
    }
}

/// A previously stored entity and its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored<E> {
    pub id: i64,
    pub entity: E,
}

/// Storage operations the reconciler needs for one entity kind.
pub trait EntityWriter<E: Entity> {
    /// Stored rows for `keys`, keyed by natural key. Missing keys are absent.
    fn lookup(
        &mut self,
        keys: &[String],
    ) -> impl Future<Output = Result<HashMap<String, Stored<E>>, DbError>> + Send;

    /// Insert a new row and return its id.
    fn insert(&mut self, entity: &E) -> impl Future<Output = Result<i64, DbError>> + Send;

    /// Overwrite the row `id` with `entity`.
    ///
    /// Returns `true` when the update also recorded a price history entry.
    fn update(
        &mut self,
        id: i64,
        entity: &E,
        previous: &E,
    ) -> impl Future<Output = Result<bool, DbError>> + Send;
}

enum Action<E> {
    Insert,
    Update(i64, E),
    Unchanged,
}

/// Insert new entities, update changed ones, and skip unchanged ones.
///
/// Validation failures in `batch` and row-scoped write errors are counted in
/// `errors` and do not stop the batch. Any other error is returned so the
/// caller can roll back and replay the whole batch; replays are safe because
/// already-written rows are found by natural key and come back `unchanged`.
///
/// Entities sharing a natural key within one batch are written once.
///
/// # Errors
///
/// Returns the first non-row-scoped [`DbError`] raised by the writer.
pub async fn reconcile<E, W>(
    writer: &mut W,
    batch: &[Result<E, RecordError>],
) -> Result<UpsertBatchResult, DbError>
where
    E: Entity,
    W: EntityWriter<E> + Send,
{
    let mut result = UpsertBatchResult::default();

    let mut seen = HashSet::new();
    let keys: Vec<String> = batch
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(Entity::natural_key)
        .filter(|key| seen.insert(key.clone()))
        .collect();

    let mut existing = if keys.is_empty() {
        HashMap::new()
    } else {
        writer.lookup(&keys).await?
    };

    for (index, item) in batch.iter().enumerate() {
        let entity = match item {
            Ok(entity) => entity,
            Err(err) => {
                result.errors += 1;
                tracing::warn!(kind = E::KIND, index, error = %err, "skipping invalid record");
                continue;
            }
        };

        let key = entity.natural_key();
        let action = match existing.get(&key) {
            None => Action::Insert,
            Some(stored) if entity.has_changes(&stored.entity) => {
                Action::Update(stored.id, stored.entity.clone())
            }
            Some(_) => Action::Unchanged,
        };

        match action {
            Action::Unchanged => result.unchanged += 1,
            Action::Insert => match writer.insert(entity).await {
                Ok(id) => {
                    result.inserted += 1;
                    existing.insert(
                        key,
                        Stored {
                            id,
                            entity: entity.clone(),
                        },
                    );
                }
                Err(err) if err.is_row_scoped() => {
                    result.errors += 1;
                    tracing::warn!(kind = E::KIND, name = entity.label(), error = %err, "insert rejected");
                }
                Err(err) => return Err(err),
            },
            Action::Update(id, previous) => match writer.update(id, entity, &previous).await {
                Ok(price_recorded) => {
                    result.updated += 1;
                    if price_recorded {
                        result.price_changes += 1;
                    }
                    existing.insert(
                        key,
                        Stored {
                            id,
                            entity: entity.clone(),
                        },
                    );
                }
                Err(err) if err.is_row_scoped() => {
                    result.errors += 1;
                    tracing::warn!(kind = E::KIND, name = entity.label(), error = %err, "update rejected");
                }
                Err(err) => return Err(err),
            },
        }
    }

    tracing::debug!(
        kind = E::KIND,
        inserted = result.inserted,
        updated = result.updated,
        unchanged = result.unchanged,
        errors = result.errors,
        "batch reconciled"
    );
    Ok(result)
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
