use std::future::Future;
use std::time::Duration;

use menuscout_core::{AppConfig, Category, Product, RecordError, Restaurant};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool, Transaction};
use tokio::time::error::Elapsed;

pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod retry;
pub mod runs;
pub mod search;
pub mod stats;

pub use circuit_breaker::{BreakerConfig, BreakerState, BreakerStatus, CircuitBreaker};
pub use error::{classify_code, DbError, ErrorClass};
pub use executor::{ResilienceConfig, ResilientExecutor};
pub use reconcile::mysql::MySqlWriter;
pub use reconcile::{reconcile, EntityWriter, Stored, UpsertBatchResult};
pub use retry::{RetryConfig, RetryConfigError};
pub use runs::{
    complete_scrape_run, create_scrape_run, fail_scrape_run, get_scrape_run, list_scrape_runs,
    start_scrape_run, RunType, ScrapeRunRow,
};
pub use search::{
    restaurants_in_category, search_products, search_restaurants, ProductHit, RestaurantHit,
    RestaurantTarget,
};
pub use stats::{database_statistics, CategoryCount, DatabaseStats};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

// Path relative to crates/menuscout-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

/// Everything [`Database`] needs besides the URL.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseConfig {
    pub pool: PoolConfig,
    pub query_timeout: Duration,
    /// Guards connection acquisition.
    pub connection: ResilienceConfig,
    /// Guards queries and batches.
    pub operation: ResilienceConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            connection: ResilienceConfig::connection(),
            operation: ResilienceConfig::operation(),
        }
    }
}

impl DatabaseConfig {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRetryConfig`] if a retry profile is out of bounds.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, DbError> {
        Ok(Self {
            pool: PoolConfig::from_app_config(config),
            query_timeout: Duration::from_secs(config.db_query_timeout_secs),
            connection: ResilienceConfig::from_settings(&config.connection_retry)?,
            operation: ResilienceConfig::from_settings(&config.operation_retry)?,
        })
    }
}

/// Pooled MySQL access with separate resilience for acquisition and queries.
///
/// Cloning is cheap and clones share the pool and both breakers.
#[derive(Debug, Clone)]
pub struct Database {
    pool: MySqlPool,
    connection: ResilientExecutor,
    operation: ResilientExecutor,
    query_timeout: Duration,
}

impl Database {
    /// Open the pool, retrying under the connection profile.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the pool cannot be established within the
    /// connection retry budget.
    pub async fn connect(database_url: &str, config: DatabaseConfig) -> Result<Self, DbError> {
        let connection = ResilientExecutor::guarded("connection", config.connection);
        let options = MySqlPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .min_connections(config.pool.min_connections)
            .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_secs));

        let pool = connection
            .run("connect", move || {
                let options = options.clone();
                async move { Ok(options.connect(database_url).await?) }
            })
            .await?;

        tracing::info!(
            max_connections = config.pool.max_connections,
            min_connections = config.pool.min_connections,
            "database pool ready"
        );

        Ok(Self {
            pool,
            connection,
            operation: ResilientExecutor::guarded("operation", config.operation),
            query_timeout: config.query_timeout,
        })
    }

    /// # Errors
    ///
    /// Returns [`DbError`] for invalid retry settings or an unreachable database.
    pub async fn connect_from_app_config(config: &AppConfig) -> Result<Self, DbError> {
        Self::connect(&config.database_url, DatabaseConfig::from_app_config(config)?).await
    }

    /// Wrap an existing pool, e.g. one handed out by `#[sqlx::test]`.
    #[must_use]
    pub fn from_pool(pool: MySqlPool, config: DatabaseConfig) -> Self {
        Self {
            pool,
            connection: ResilientExecutor::guarded("connection", config.connection),
            operation: ResilientExecutor::guarded("operation", config.operation),
            query_timeout: config.query_timeout,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Borrow a connection under the connection profile. It returns to the
    /// pool when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if no connection could be acquired.
    pub async fn acquire(&self) -> Result<PoolConnection<MySql>, DbError> {
        self.connection
            .run("acquire", move || async move { Ok(self.pool.acquire().await?) })
            .await
    }

    /// Acquire a connection and open a transaction on it.
    async fn begin(&self) -> Result<Transaction<'static, MySql>, DbError> {
        self.connection
            .run("begin", move || async move { Ok(self.pool.begin().await?) })
            .await
    }

    /// Commit on success; roll back on error or timeout.
    async fn finish<T>(
        &self,
        tx: Transaction<'static, MySql>,
        outcome: Result<Result<T, DbError>, Elapsed>,
    ) -> Result<T, DbError> {
        let err = match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                return Ok(value);
            }
            Ok(Err(err)) => err,
            Err(_) => DbError::QueryTimeout {
                timeout_secs: self.query_timeout.as_secs(),
            },
        };

        match tokio::time::timeout(self.query_timeout, tx.rollback()).await {
            Ok(Ok(())) => {}
            Ok(Err(rollback_err)) => {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(_) => tracing::warn!("rollback timed out; dropping connection state"),
        }
        Err(err)
    }

    /// Run a query closure under the operation profile with the query timeout.
    ///
    /// Each attempt first acquires a connection under the connection profile
    /// and hands it to `op`; it returns to the pool when `op` finishes. `op`
    /// is invoked once per attempt and must be safe to replay.
    ///
    /// # Errors
    ///
    /// Returns whatever [`ResilientExecutor::run`] returns.
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, DbError>
    where
        F: Fn(PoolConnection<MySql>) -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let timeout = self.query_timeout;
        let op = &op;
        self.operation
            .run(operation, move || async move {
                let conn = self.acquire().await?;
                tokio::time::timeout(timeout, op(conn))
                    .await
                    .map_err(|_| DbError::QueryTimeout {
                        timeout_secs: timeout.as_secs(),
                    })?
            })
            .await
    }

    /// Upsert a batch of categories in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the batch could not be committed.
    pub async fn upsert_categories(
        &self,
        batch: &[Result<Category, RecordError>],
    ) -> Result<UpsertBatchResult, DbError> {
        self.operation
            .run("upsert_categories", move || async move {
                let mut tx = self.begin().await?;
                let outcome = tokio::time::timeout(
                    self.query_timeout,
                    reconcile(&mut MySqlWriter::new(&mut tx), batch),
                )
                .await;
                self.finish(tx, outcome).await
            })
            .await
    }

    /// Upsert a batch of restaurants in one transaction.
    ///
    /// `category` is upserted first so every restaurant has its parent row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the batch could not be committed.
    pub async fn upsert_restaurants(
        &self,
        category: &Category,
        batch: &[Result<Restaurant, RecordError>],
    ) -> Result<UpsertBatchResult, DbError> {
        let parent: [Result<Category, RecordError>; 1] = [Ok(category.clone())];
        let parent = &parent;
        self.operation
            .run("upsert_restaurants", move || async move {
                let mut tx = self.begin().await?;
                let outcome = tokio::time::timeout(self.query_timeout, async {
                    let mut writer = MySqlWriter::new(&mut tx);
                    reconcile(&mut writer, parent.as_slice()).await?;
                    reconcile(&mut writer, batch).await
                })
                .await;
                self.finish(tx, outcome).await
            })
            .await
    }

    /// Upsert a batch of products in one transaction. The owning restaurants
    /// must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MissingParent`] if a product's restaurant is not
    /// stored, or another [`DbError`] when the batch could not be committed.
    pub async fn upsert_products(
        &self,
        batch: &[Result<Product, RecordError>],
    ) -> Result<UpsertBatchResult, DbError> {
        self.operation
            .run("upsert_products", move || async move {
                let mut tx = self.begin().await?;
                let outcome = tokio::time::timeout(
                    self.query_timeout,
                    reconcile(&mut MySqlWriter::new(&mut tx), batch),
                )
                .await;
                self.finish(tx, outcome).await
            })
            .await
    }

    /// `SELECT 1` on a freshly acquired connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.execute("ping", |mut conn| async move {
            sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&mut *conn)
                .await?;
            Ok(())
        })
        .await
    }

    /// Run all pending migrations. Returns how many were applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails, or the
    /// acquisition error if no connection could be borrowed.
    pub async fn run_migrations(&self) -> Result<usize, DbError> {
        let mut conn = self.acquire().await?;

        // The _sqlx_migrations table may not exist yet on a fresh database;
        // treat absence as zero applied.
        let applied_before: i64 =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
                .fetch_one(&mut *conn)
                .await
                .unwrap_or(0);

        MIGRATOR.run(&mut *conn).await?;

        let applied_after: i64 =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
                .fetch_one(&mut *conn)
                .await
                .unwrap_or(0);

        let delta = (applied_after - applied_before).max(0);
        Ok(usize::try_from(delta).unwrap_or(0))
    }

    /// Fails fast when either breaker is open. Does not change breaker state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CircuitOpen`] naming the open resource.
    pub fn check_ready(&self) -> Result<(), DbError> {
        self.connection.check_ready()?;
        self.operation.check_ready()
    }

    /// Snapshot of the connection and operation breakers.
    #[must_use]
    pub fn breaker_status(&self) -> Vec<BreakerStatus> {
        [&self.connection, &self.operation]
            .into_iter()
            .filter_map(ResilientExecutor::breaker_status)
            .collect()
    }

    /// Force both breakers closed.
    pub fn reset_breakers(&self) {
        for exec in [&self.connection, &self.operation] {
            if let Some(breaker) = exec.breaker() {
                breaker.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn default_profiles_guard_connections_more_eagerly() {
        let config = DatabaseConfig::default();
        assert!(config.connection.retry.max_attempts() > config.operation.retry.max_attempts());
        assert_eq!(config.operation.breaker.failure_threshold, 10);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
    }
}
