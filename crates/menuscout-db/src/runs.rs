//! Database operations for `scrape_runs`.
//!
//! A run moves `queued → running → succeeded | failed`; transitions out of
//! order are rejected with [`DbError::InvalidRunTransition`].

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::MySqlConnection;
use uuid::Uuid;

use crate::{Database, DbError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Categories,
    Restaurants,
    Products,
}

impl RunType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Categories => "categories",
            RunType::Restaurants => "restaurants",
            RunType::Products => "products",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `scrape_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: i64,
    /// UUID rendered as text (`CHAR(36)`).
    pub public_id: String,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, \
                           started_at, completed_at, items_processed, error_message, created_at";

async fn fetch_run(conn: &mut MySqlConnection, id: i64) -> Result<ScrapeRunRow, DbError> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM scrape_runs WHERE id = ?");
    sqlx::query_as::<_, ScrapeRunRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(DbError::NotFound)
}

/// Creates a new run in `queued` status and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError`] if the insert or fetch fails.
pub async fn create_scrape_run(
    db: &Database,
    run_type: RunType,
    trigger_source: &str,
) -> Result<ScrapeRunRow, DbError> {
    let public_id = Uuid::new_v4().to_string();
    let public_id = public_id.as_str();

    db.execute("create_scrape_run", move |mut conn| async move {
        let result = sqlx::query(
            "INSERT INTO scrape_runs (public_id, run_type, trigger_source, status) \
             VALUES (?, ?, ?, 'queued')",
        )
        .bind(public_id)
        .bind(run_type.as_str())
        .bind(trigger_source)
        .execute(&mut *conn)
        .await?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|e| DbError::Sqlx(sqlx::Error::Decode(Box::new(e))))?;
        fetch_run(&mut conn, id).await
    })
    .await
}

async fn transition(
    db: &Database,
    operation: &str,
    id: i64,
    sql: &'static str,
    expected_status: &'static str,
    value: Option<&str>,
    count: Option<i32>,
) -> Result<(), DbError> {
    let affected = db
        .execute(operation, move |mut conn| async move {
            let mut query = sqlx::query(sql);
            if let Some(count) = count {
                query = query.bind(count);
            }
            if let Some(value) = value {
                query = query.bind(value);
            }
            Ok(query.bind(id).execute(&mut *conn).await?.rows_affected())
        })
        .await?;

    if affected == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status,
        });
    }
    Ok(())
}

/// Marks a run as `running` and sets `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] unless the run is `queued`.
pub async fn start_scrape_run(db: &Database, id: i64) -> Result<(), DbError> {
    transition(
        db,
        "start_scrape_run",
        id,
        "UPDATE scrape_runs SET status = 'running', started_at = CURRENT_TIMESTAMP(3) \
         WHERE id = ? AND status = 'queued'",
        "queued",
        None,
        None,
    )
    .await
}

/// Marks a run as `succeeded` with the number of items it processed.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] unless the run is `running`.
pub async fn complete_scrape_run(
    db: &Database,
    id: i64,
    items_processed: i32,
) -> Result<(), DbError> {
    transition(
        db,
        "complete_scrape_run",
        id,
        "UPDATE scrape_runs \
         SET status = 'succeeded', completed_at = CURRENT_TIMESTAMP(3), items_processed = ? \
         WHERE id = ? AND status = 'running'",
        "running",
        None,
        Some(items_processed),
    )
    .await
}

/// Marks a run as `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] unless the run is `running`.
pub async fn fail_scrape_run(db: &Database, id: i64, error_message: &str) -> Result<(), DbError> {
    transition(
        db,
        "fail_scrape_run",
        id,
        "UPDATE scrape_runs \
         SET status = 'failed', completed_at = CURRENT_TIMESTAMP(3), error_message = ? \
         WHERE id = ? AND status = 'running'",
        "running",
        Some(error_message),
        None,
    )
    .await
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this id.
pub async fn get_scrape_run(db: &Database, id: i64) -> Result<ScrapeRunRow, DbError> {
    db.execute("get_scrape_run", move |mut conn| async move {
        fetch_run(&mut conn, id).await
    })
        .await
}

/// Most recent runs first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn list_scrape_runs(db: &Database, limit: u32) -> Result<Vec<ScrapeRunRow>, DbError> {
    let limit = limit.clamp(1, 500);
    db.execute("list_scrape_runs", move |mut conn| async move {
        let rows = sqlx::query_as::<_, ScrapeRunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM scrape_runs ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    })
    .await
}
