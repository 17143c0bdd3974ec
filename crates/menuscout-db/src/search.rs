//! Read-side queries: text search and product-scrape targets.

use rust_decimal::Decimal;
use sqlx::{MySql, QueryBuilder};

use crate::{Database, DbError};

const MAX_LIMIT: u32 = 500;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RestaurantHit {
    pub id: i64,
    pub name: String,
    pub category_slug: String,
    pub city: String,
    pub rating: Option<Decimal>,
    pub delivery_time: Option<String>,
    pub delivery_fee: Option<Decimal>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductHit {
    pub id: i64,
    pub name: String,
    pub section: String,
    pub price: Option<Decimal>,
    pub restaurant_name: String,
    pub restaurant_rating: Option<Decimal>,
}

/// A stored restaurant whose menu page can be scraped.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RestaurantTarget {
    pub unique_key: String,
    pub name: String,
    pub url: String,
    pub city: String,
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_LIMIT)
}

/// `%query%` with `LIKE` wildcards in the user input escaped.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Restaurants whose name matches `query`, best rated first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn search_restaurants(
    db: &Database,
    query: &str,
    city: Option<&str>,
    category: Option<&str>,
    limit: u32,
) -> Result<Vec<RestaurantHit>, DbError> {
    let pattern = like_pattern(query);
    let pattern = pattern.as_str();
    let limit = clamp_limit(limit);

    db.execute("search_restaurants", move |mut conn| async move {
        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT r.id, r.name, c.slug AS category_slug, r.city, r.rating, \
                    r.delivery_time, r.delivery_fee, r.url \
             FROM restaurants r \
             JOIN categories c ON c.id = r.category_id \
             WHERE r.is_active = TRUE AND r.name LIKE ",
        );
        qb.push_bind(pattern);
        if let Some(city) = city {
            qb.push(" AND r.city = ").push_bind(city);
        }
        if let Some(category) = category {
            qb.push(" AND c.slug = ").push_bind(category);
        }
        qb.push(" ORDER BY r.rating IS NULL, r.rating DESC, r.name ASC LIMIT ")
            .push_bind(limit);

        Ok(qb
            .build_query_as::<RestaurantHit>()
            .fetch_all(&mut *conn)
            .await?)
    })
    .await
}

/// Available products whose name matches `query`, optionally within a price
/// range. Ordered by restaurant rating, then cheapest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn search_products(
    db: &Database,
    query: &str,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    limit: u32,
) -> Result<Vec<ProductHit>, DbError> {
    let pattern = like_pattern(query);
    let pattern = pattern.as_str();
    let limit = clamp_limit(limit);

    db.execute("search_products", move |mut conn| async move {
        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT p.id, p.name, p.section, p.price, \
                    r.name AS restaurant_name, r.rating AS restaurant_rating \
             FROM products p \
             JOIN restaurants r ON r.id = p.restaurant_id \
             WHERE p.is_available = TRUE AND p.name LIKE ",
        );
        qb.push_bind(pattern);
        if let Some(min) = min_price {
            qb.push(" AND p.price >= ").push_bind(min);
        }
        if let Some(max) = max_price {
            qb.push(" AND p.price <= ").push_bind(max);
        }
        qb.push(" ORDER BY r.rating IS NULL, r.rating DESC, p.price ASC LIMIT ")
            .push_bind(limit);

        Ok(qb.build_query_as::<ProductHit>().fetch_all(&mut *conn).await?)
    })
    .await
}

/// Stored restaurants in a category that have a menu URL.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn restaurants_in_category(
    db: &Database,
    category_slug: &str,
) -> Result<Vec<RestaurantTarget>, DbError> {
    db.execute("restaurants_in_category", move |mut conn| async move {
        Ok(sqlx::query_as::<_, RestaurantTarget>(
            "SELECT r.unique_key, r.name, r.url, r.city \
             FROM restaurants r \
             JOIN categories c ON c.id = r.category_id \
             WHERE c.slug = ? AND r.is_active = TRUE AND r.url IS NOT NULL \
             ORDER BY r.name ASC",
        )
        .bind(category_slug)
        .fetch_all(&mut *conn)
        .await?)
    })
    .await
}
