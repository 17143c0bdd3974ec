//! Raw scraped records and their validation into typed entities.
//!
//! Raw records mirror what the marketplace hands back: every field optional,
//! numbers sometimes rendered as strings. `validate` is the single boundary
//! where that shape becomes an [`Entity`](crate::Entity); anything that fails
//! here is counted as a per-row error by the upsert layer.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::entities::{Category, Product, Restaurant};
use crate::normalize::{parse_price, parse_rating, slug_from_url, slugify, InvalidNumber};

const MAX_NAME_LEN: usize = 255;
const DEFAULT_SECTION: &str = "Geral";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{kind} record is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("{kind} field '{field}' is not a valid number: {value:?}")]
    InvalidNumber {
        kind: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{kind} field '{field}' exceeds {max} characters")]
    TooLong {
        kind: &'static str,
        field: &'static str,
        max: usize,
    },

    /// A listing item that could not be decoded into a raw record at all.
    #[error("item {index} could not be decoded: {reason}")]
    Malformed { index: usize, reason: String },
}

/// Accepts `"4,7"`, `"4.7"`, or `4.7` and keeps it as text for the parsers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Text(String),
        Int(i64),
        Float(f64),
    }

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        Value::Text(s) => s,
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
    }))
}

fn required_name(kind: &'static str, value: Option<&str>) -> Result<String, RecordError> {
    let name = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RecordError::MissingField {
            kind,
            field: "name",
        })?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RecordError::TooLong {
            kind,
            field: "name",
            max: MAX_NAME_LEN,
        });
    }
    Ok(name.to_string())
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s.to_lowercase() != "não informado")
}

fn money(
    kind: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<Decimal>, RecordError> {
    match value {
        None => Ok(None),
        Some(raw) => parse_price(raw).map_err(|InvalidNumber(value)| RecordError::InvalidNumber {
            kind,
            field,
            value,
        }),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCategory {
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl RawCategory {
    /// Validate into a [`Category`] for `city`.
    ///
    /// The slug is the explicit one when given, else the last URL segment,
    /// else the slugified name.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the name is missing or too long, or when
    /// no slug can be derived.
    pub fn validate(self, city: &str) -> Result<Category, RecordError> {
        let name = required_name("category", self.name.as_deref())?;
        let slug = self
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .or_else(|| self.url.as_deref().and_then(slug_from_url))
            .unwrap_or_else(|| slugify(&name));
        if slug.is_empty() {
            return Err(RecordError::MissingField {
                kind: "category",
                field: "slug",
            });
        }

        Ok(Category {
            slug,
            name,
            url: clean(self.url),
            icon_url: clean(self.icon_url),
            city: city.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRestaurant {
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default, alias = "avaliacao", deserialize_with = "string_or_number")]
    pub rating: Option<String>,
    #[serde(default, alias = "tempo_entrega")]
    pub delivery_time: Option<String>,
    #[serde(default, alias = "taxa_entrega", deserialize_with = "string_or_number")]
    pub delivery_fee: Option<String>,
    #[serde(default, alias = "distancia")]
    pub distance: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default, alias = "endereco")]
    pub address: Option<String>,
    #[serde(default, alias = "telefone")]
    pub phone: Option<String>,
    #[serde(default, alias = "horario_funcionamento")]
    pub opening_hours: Option<String>,
    #[serde(default, alias = "pedido_minimo", deserialize_with = "string_or_number")]
    pub minimum_order: Option<String>,
}

impl RawRestaurant {
    /// Validate into a [`Restaurant`] scoped to a category and city.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for a missing/oversized name or an unparseable
    /// rating, fee, or minimum order.
    pub fn validate(self, category_slug: &str, city: &str) -> Result<Restaurant, RecordError> {
        const KIND: &str = "restaurant";
        let name = required_name(KIND, self.name.as_deref())?;
        let rating = match self.rating.as_deref() {
            None => None,
            Some(raw) => parse_rating(raw).map_err(|InvalidNumber(value)| {
                RecordError::InvalidNumber {
                    kind: KIND,
                    field: "rating",
                    value,
                }
            })?,
        };
        let delivery_fee = money(KIND, "delivery_fee", self.delivery_fee.as_deref())?;
        let minimum_order = money(KIND, "minimum_order", self.minimum_order.as_deref())?;
        let city = city.trim().to_string();

        Ok(Restaurant {
            unique_key: Restaurant::key_for(&name, category_slug, &city),
            name,
            category_slug: category_slug.to_string(),
            city,
            rating,
            delivery_time: clean(self.delivery_time),
            delivery_fee,
            distance: clean(self.distance),
            url: clean(self.url),
            logo_url: clean(self.logo_url),
            address: clean(self.address),
            phone: clean(self.phone),
            opening_hours: clean(self.opening_hours),
            minimum_order,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProduct {
    #[serde(default, alias = "nome")]
    pub name: Option<String>,
    #[serde(default, alias = "descricao")]
    pub description: Option<String>,
    #[serde(default, alias = "preco", deserialize_with = "string_or_number")]
    pub price: Option<String>,
    #[serde(default, alias = "preco_original", deserialize_with = "string_or_number")]
    pub original_price: Option<String>,
    #[serde(default, alias = "categoria_produto")]
    pub section: Option<String>,
    #[serde(default, alias = "disponivel")]
    pub is_available: Option<bool>,
    #[serde(default, alias = "imagem_url")]
    pub image_url: Option<String>,
    #[serde(default, alias = "serve_pessoas")]
    pub serves_people: Option<u8>,
}

impl RawProduct {
    /// Validate into a [`Product`] owned by the restaurant with `restaurant_key`.
    ///
    /// A zero original price means "no discount" and is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for a missing/oversized name or unparseable prices.
    pub fn validate(self, restaurant_key: &str) -> Result<Product, RecordError> {
        const KIND: &str = "product";
        let name = required_name(KIND, self.name.as_deref())?;
        let section = clean(self.section).unwrap_or_else(|| DEFAULT_SECTION.to_string());
        let price = money(KIND, "price", self.price.as_deref())?;
        let original_price =
            money(KIND, "original_price", self.original_price.as_deref())?.filter(|p| !p.is_zero());

        Ok(Product {
            unique_key: Product::key_for(restaurant_key, &name, &section),
            restaurant_key: restaurant_key.to_string(),
            name,
            section,
            description: clean(self.description),
            price,
            original_price,
            is_available: self.is_available.unwrap_or(true),
            image_url: clean(self.image_url),
            serves_people: self.serves_people,
        })
    }
}
