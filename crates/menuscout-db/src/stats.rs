//! Aggregate counts for the `stats` report.

use sqlx::MySqlConnection;

use crate::{Database, DbError};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CategoryCount {
    pub slug: String,
    pub name: String,
    pub restaurants: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub total_categories: i64,
    pub active_restaurants: i64,
    pub available_products: i64,
    pub restaurants_by_category: Vec<CategoryCount>,
    pub price_changes_last_7_days: i64,
}

async fn count(conn: &mut MySqlConnection, sql: &str) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(conn).await?)
}

/// Collect totals, per-category restaurant counts, and recent price changes.
///
/// # Errors
///
/// Returns [`DbError`] if any of the queries fails.
pub async fn database_statistics(db: &Database) -> Result<DatabaseStats, DbError> {
    db.execute("database_statistics", |mut conn| async move {
        let total_categories = count(&mut conn, "SELECT COUNT(*) FROM categories").await?;
        let active_restaurants =
            count(&mut conn, "SELECT COUNT(*) FROM restaurants WHERE is_active = TRUE").await?;
        let available_products =
            count(&mut conn, "SELECT COUNT(*) FROM products WHERE is_available = TRUE").await?;
        let price_changes_last_7_days = count(
            &mut conn,
            "SELECT COUNT(*) FROM price_history WHERE changed_at >= NOW() - INTERVAL 7 DAY",
        )
        .await?;

        let restaurants_by_category = sqlx::query_as::<_, CategoryCount>(
            "SELECT c.slug, c.name, COUNT(r.id) AS restaurants \
             FROM categories c \
             LEFT JOIN restaurants r ON r.category_id = c.id AND r.is_active = TRUE \
             GROUP BY c.id, c.slug, c.name \
             ORDER BY restaurants DESC, c.name ASC",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(DatabaseStats {
            total_categories,
            active_restaurants,
            available_products,
            restaurants_by_category,
            price_changes_last_7_days,
        })
    })
    .await
}
