use std::collections::{HashMap, HashSet};

use menuscout_core::{Entity, RecordError};

use super::{EntityWriter, Stored};
use crate::DbError;

/// In-memory [`EntityWriter`] with write counters and injectable failures.
///
/// Writes are not transactional: rows inserted before an injected batch
/// failure stay behind, like a partially applied batch would before rollback.
pub(crate) struct MemoryWriter<E> {
    pub rows: HashMap<String, Stored<E>>,
    pub next_id: i64,
    pub lookups: usize,
    pub inserts: usize,
    pub updates: usize,
    /// Natural keys whose writes fail with a row-scoped error.
    pub reject: HashSet<String>,
    /// Fail the n-th write (1-based, counted across inserts and updates)
    /// with a connection-level error.
    pub fail_write_at: Option<usize>,
    writes: usize,
}

impl<E: Entity> MemoryWriter<E> {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            next_id: 1,
            lookups: 0,
            inserts: 0,
            updates: 0,
            reject: HashSet::new(),
            fail_write_at: None,
            writes: 0,
        }
    }

    fn before_write(&mut self, entity: &E) -> Result<(), DbError> {
        self.writes += 1;
        if self.fail_write_at == Some(self.writes) {
            self.fail_write_at = None;
            return Err(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        }
        if self.reject.contains(&entity.natural_key()) {
            return Err(DbError::InvalidRecord(RecordError::TooLong {
                kind: E::KIND,
                field: "name",
                max: 255,
            }));
        }
        Ok(())
    }
}

impl<E: Entity> EntityWriter<E> for MemoryWriter<E> {
    async fn lookup(&mut self, keys: &[String]) -> Result<HashMap<String, Stored<E>>, DbError> {
        self.lookups += 1;
        Ok(keys
            .iter()
            .filter_map(|k| self.rows.get(k).map(|s| (k.clone(), s.clone())))
            .collect())
    }

    async fn insert(&mut self, entity: &E) -> Result<i64, DbError> {
        self.before_write(entity)?;
        self.inserts += 1;
        let id = self.next_id;
        self.next_id += 1;
        self.rows.insert(
            entity.natural_key(),
            Stored {
                id,
                entity: entity.clone(),
            },
        );
        Ok(id)
    }

    async fn update(&mut self, id: i64, entity: &E, _previous: &E) -> Result<bool, DbError> {
        self.before_write(entity)?;
        self.updates += 1;
        self.rows.insert(
            entity.natural_key(),
            Stored {
                id,
                entity: entity.clone(),
            },
        );
        Ok(false)
    }
}
