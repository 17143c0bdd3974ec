//! MySQL [`EntityWriter`] for categories, restaurants, and products.
//!
//! The writer borrows one connection, normally the inside of an open
//! transaction, so a batch commits or rolls back as a unit.

use std::collections::HashMap;

use menuscout_core::{Category, Product, Restaurant};
use rust_decimal::Decimal;
use sqlx::mysql::MySqlQueryResult;
use sqlx::{MySql, MySqlConnection, QueryBuilder};

use super::{EntityWriter, Stored, LOOKUP_CHUNK};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    slug: String,
    name: String,
    url: Option<String>,
    icon_url: Option<String>,
    city: String,
}

impl From<CategoryRow> for Stored<Category> {
    fn from(row: CategoryRow) -> Self {
        Stored {
            id: row.id,
            entity: Category {
                slug: row.slug,
                name: row.name,
                url: row.url,
                icon_url: row.icon_url,
                city: row.city,
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RestaurantRow {
    id: i64,
    unique_key: String,
    name: String,
    category_slug: String,
    city: String,
    rating: Option<Decimal>,
    delivery_time: Option<String>,
    delivery_fee: Option<Decimal>,
    distance: Option<String>,
    url: Option<String>,
    logo_url: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    opening_hours: Option<String>,
    minimum_order: Option<Decimal>,
}

impl From<RestaurantRow> for Stored<Restaurant> {
    fn from(row: RestaurantRow) -> Self {
        Stored {
            id: row.id,
            entity: Restaurant {
                unique_key: row.unique_key,
                name: row.name,
                category_slug: row.category_slug,
                city: row.city,
                rating: row.rating,
                delivery_time: row.delivery_time,
                delivery_fee: row.delivery_fee,
                distance: row.distance,
                url: row.url,
                logo_url: row.logo_url,
                address: row.address,
                phone: row.phone,
                opening_hours: row.opening_hours,
                minimum_order: row.minimum_order,
            },
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    unique_key: String,
    restaurant_key: String,
    name: String,
    section: String,
    description: Option<String>,
    price: Option<Decimal>,
    original_price: Option<Decimal>,
    is_available: bool,
    image_url: Option<String>,
    serves_people: Option<u8>,
}

impl From<ProductRow> for Stored<Product> {
    fn from(row: ProductRow) -> Self {
        Stored {
            id: row.id,
            entity: Product {
                unique_key: row.unique_key,
                restaurant_key: row.restaurant_key,
                name: row.name,
                section: row.section,
                description: row.description,
                price: row.price,
                original_price: row.original_price,
                is_available: row.is_available,
                image_url: row.image_url,
                serves_people: row.serves_people,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub struct MySqlWriter<'c> {
    conn: &'c mut MySqlConnection,
    parent_ids: HashMap<String, i64>,
}

impl<'c> MySqlWriter<'c> {
    #[must_use]
    pub fn new(conn: &'c mut MySqlConnection) -> Self {
        Self {
            conn,
            parent_ids: HashMap::new(),
        }
    }

    /// Resolve and cache a parent row id; a missing parent fails the batch.
    async fn parent_id(
        &mut self,
        kind: &'static str,
        sql: &'static str,
        key: &str,
    ) -> Result<i64, DbError> {
        let cache_key = format!("{kind}:{key}");
        if let Some(id) = self.parent_ids.get(&cache_key) {
            return Ok(*id);
        }
        let id = sqlx::query_scalar::<_, i64>(sql)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?
            .ok_or_else(|| DbError::MissingParent {
                kind,
                key: key.to_string(),
            })?;
        self.parent_ids.insert(cache_key, id);
        Ok(id)
    }

    async fn lookup_rows<R>(
        &mut self,
        select_prefix: &'static str,
        keys: &[String],
    ) -> Result<Vec<R>, DbError>
    where
        R: for<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> + Send + Unpin,
    {
        let mut rows = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK) {
            let mut qb = QueryBuilder::<MySql>::new(select_prefix);
            let mut separated = qb.separated(", ");
            for key in chunk {
                separated.push_bind(key.clone());
            }
            separated.push_unseparated(")");
            let mut fetched: Vec<R> = qb.build_query_as().fetch_all(&mut *self.conn).await?;
            rows.append(&mut fetched);
        }
        Ok(rows)
    }
}

fn inserted_id(result: &MySqlQueryResult) -> Result<i64, DbError> {
    i64::try_from(result.last_insert_id()).map_err(|e| DbError::Sqlx(sqlx::Error::Decode(Box::new(e))))
}

const CATEGORY_ID_BY_SLUG: &str = "SELECT id FROM categories WHERE slug = ?";
const RESTAURANT_ID_BY_KEY: &str = "SELECT id FROM restaurants WHERE unique_key = ?";

impl EntityWriter<Category> for MySqlWriter<'_> {
    async fn lookup(&mut self, keys: &[String]) -> Result<HashMap<String, Stored<Category>>, DbError> {
        let rows: Vec<CategoryRow> = self
            .lookup_rows(
                "SELECT id, slug, name, url, icon_url, city FROM categories WHERE slug IN (",
                keys,
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.slug.clone(), Stored::from(row)))
            .collect())
    }

    async fn insert(&mut self, category: &Category) -> Result<i64, DbError> {
        let result = sqlx::query(
            "INSERT INTO categories (slug, name, url, icon_url, city) \
             VALUES (?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id)",
        )
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.url)
        .bind(&category.icon_url)
        .bind(&category.city)
        .execute(&mut *self.conn)
        .await?;
        let id = inserted_id(&result)?;
        self.parent_ids.insert(format!("category:{}", category.slug), id);
        Ok(id)
    }

    async fn update(&mut self, id: i64, category: &Category, _previous: &Category) -> Result<bool, DbError> {
        sqlx::query(
            "UPDATE categories SET \
                 name     = ?, \
                 city     = ?, \
                 url      = COALESCE(?, url), \
                 icon_url = COALESCE(?, icon_url) \
             WHERE id = ?",
        )
        .bind(&category.name)
        .bind(&category.city)
        .bind(&category.url)
        .bind(&category.icon_url)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        Ok(false)
    }
}

impl EntityWriter<Restaurant> for MySqlWriter<'_> {
    async fn lookup(&mut self, keys: &[String]) -> Result<HashMap<String, Stored<Restaurant>>, DbError> {
        let rows: Vec<RestaurantRow> = self
            .lookup_rows(
                "SELECT r.id, r.unique_key, r.name, c.slug AS category_slug, r.city, r.rating, \
                        r.delivery_time, r.delivery_fee, r.distance, r.url, r.logo_url, \
                        r.address, r.phone, r.opening_hours, r.minimum_order \
                 FROM restaurants r \
                 JOIN categories c ON c.id = r.category_id \
                 WHERE r.unique_key IN (",
                keys,
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.unique_key.clone(), Stored::from(row)))
            .collect())
    }

    async fn insert(&mut self, r: &Restaurant) -> Result<i64, DbError> {
        let category_id = self
            .parent_id("category", CATEGORY_ID_BY_SLUG, &r.category_slug)
            .await?;
        let result = sqlx::query(
            "INSERT INTO restaurants \
                 (unique_key, category_id, name, city, rating, delivery_time, delivery_fee, \
                  distance, url, logo_url, address, phone, opening_hours, minimum_order) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id)",
        )
        .bind(&r.unique_key)
        .bind(category_id)
        .bind(&r.name)
        .bind(&r.city)
        .bind(r.rating)
        .bind(&r.delivery_time)
        .bind(r.delivery_fee)
        .bind(&r.distance)
        .bind(&r.url)
        .bind(&r.logo_url)
        .bind(&r.address)
        .bind(&r.phone)
        .bind(&r.opening_hours)
        .bind(r.minimum_order)
        .execute(&mut *self.conn)
        .await?;
        inserted_id(&result)
    }

    async fn update(&mut self, id: i64, r: &Restaurant, _previous: &Restaurant) -> Result<bool, DbError> {
        // Listing fields are overwritten; detail-page fields keep their stored
        // value when this scrape did not see them.
        sqlx::query(
            "UPDATE restaurants SET \
                 rating        = ?, \
                 delivery_time = ?, \
                 delivery_fee  = ?, \
                 distance      = ?, \
                 logo_url      = ?, \
                 url           = COALESCE(?, url), \
                 address       = COALESCE(?, address), \
                 phone         = COALESCE(?, phone), \
                 opening_hours = COALESCE(?, opening_hours), \
                 minimum_order = COALESCE(?, minimum_order), \
                 is_active     = TRUE \
             WHERE id = ?",
        )
        .bind(r.rating)
        .bind(&r.delivery_time)
        .bind(r.delivery_fee)
        .bind(&r.distance)
        .bind(&r.logo_url)
        .bind(&r.url)
        .bind(&r.address)
        .bind(&r.phone)
        .bind(&r.opening_hours)
        .bind(r.minimum_order)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        Ok(false)
    }
}

impl EntityWriter<Product> for MySqlWriter<'_> {
    async fn lookup(&mut self, keys: &[String]) -> Result<HashMap<String, Stored<Product>>, DbError> {
        let rows: Vec<ProductRow> = self
            .lookup_rows(
                "SELECT p.id, p.unique_key, r.unique_key AS restaurant_key, p.name, p.section, \
                        p.description, p.price, p.original_price, p.is_available, p.image_url, \
                        p.serves_people \
                 FROM products p \
                 JOIN restaurants r ON r.id = p.restaurant_id \
                 WHERE p.unique_key IN (",
                keys,
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.unique_key.clone(), Stored::from(row)))
            .collect())
    }

    async fn insert(&mut self, p: &Product) -> Result<i64, DbError> {
        let restaurant_id = self
            .parent_id("restaurant", RESTAURANT_ID_BY_KEY, &p.restaurant_key)
            .await?;
        let result = sqlx::query(
            "INSERT INTO products \
                 (unique_key, restaurant_id, name, section, description, price, \
                  original_price, is_available, image_url, serves_people) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id)",
        )
        .bind(&p.unique_key)
        .bind(restaurant_id)
        .bind(&p.name)
        .bind(&p.section)
        .bind(&p.description)
        .bind(p.price)
        .bind(p.original_price)
        .bind(p.is_available)
        .bind(&p.image_url)
        .bind(p.serves_people)
        .execute(&mut *self.conn)
        .await?;
        inserted_id(&result)
    }

    async fn update(&mut self, id: i64, p: &Product, previous: &Product) -> Result<bool, DbError> {
        let price_changed = p.price_changed(previous);
        sqlx::query(
            "UPDATE products SET \
                 price          = ?, \
                 original_price = ?, \
                 is_available   = ?, \
                 description    = COALESCE(?, description), \
                 image_url      = COALESCE(?, image_url), \
                 serves_people  = COALESCE(?, serves_people), \
                 price_changes  = price_changes + ? \
             WHERE id = ?",
        )
        .bind(p.price)
        .bind(p.original_price)
        .bind(p.is_available)
        .bind(&p.description)
        .bind(&p.image_url)
        .bind(p.serves_people)
        .bind(i32::from(price_changed))
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        let Some(price) = p.price.filter(|_| price_changed) else {
            return Ok(false);
        };
        sqlx::query("INSERT INTO price_history (product_id, price, original_price) VALUES (?, ?, ?)")
            .bind(id)
            .bind(price)
            .bind(p.original_price)
            .execute(&mut *self.conn)
            .await?;
        tracing::debug!(product_id = id, old = ?previous.price, new = %price, "price change recorded");
        Ok(true)
    }
}
