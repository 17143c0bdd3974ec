//! Validated marketplace entities and their natural keys.
//!
//! Entities are produced only by the `validate` methods in [`crate::raw`], so
//! every value here is already normalized (trimmed text, 2-dp money, 1-dp
//! rating) and comparable against what was previously stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::normalize::{content_key, normalize_text};

/// Behaviour the upsert layer needs from every entity kind.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Short lowercase kind name used in logs and errors (`"restaurant"`).
    const KIND: &'static str;

    /// Business identifier used for deduplication, distinct from the
    /// storage-assigned id.
    fn natural_key(&self) -> String;

    /// `true` when any tracked mutable field differs from the stored copy.
    ///
    /// Fields the database keeps with `COALESCE` semantics only count as a
    /// change when the fresh value is present.
    fn has_changes(&self, stored: &Self) -> bool;

    /// Human-readable name for log lines.
    fn label(&self) -> &str;
}

/// `true` when a freshly scraped optional value should overwrite the stored one.
fn coalesced_change<T: PartialEq>(fresh: Option<&T>, stored: Option<&T>) -> bool {
    fresh.is_some() && fresh != stored
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
    pub city: String,
}

impl Entity for Category {
    const KIND: &'static str = "category";

    fn natural_key(&self) -> String {
        self.slug.clone()
    }

    fn has_changes(&self, stored: &Self) -> bool {
        self.name != stored.name
            || self.city != stored.city
            || coalesced_change(self.url.as_ref(), stored.url.as_ref())
            || coalesced_change(self.icon_url.as_ref(), stored.icon_url.as_ref())
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    /// SHA-256 over normalized name, category slug, and city.
    pub unique_key: String,
    pub name: String,
    pub category_slug: String,
    pub city: String,
    pub rating: Option<Decimal>,
    pub delivery_time: Option<String>,
    pub delivery_fee: Option<Decimal>,
    pub distance: Option<String>,
    pub url: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub minimum_order: Option<Decimal>,
}

impl Restaurant {
    /// Natural key for a restaurant within a category and city.
    #[must_use]
    pub fn key_for(name: &str, category_slug: &str, city: &str) -> String {
        content_key(&[
            &normalize_text(name),
            category_slug,
            &normalize_text(city),
        ])
    }
}

impl Entity for Restaurant {
    const KIND: &'static str = "restaurant";

    fn natural_key(&self) -> String {
        self.unique_key.clone()
    }

    fn has_changes(&self, stored: &Self) -> bool {
        // Listing fields are replaced on every scrape; detail fields are kept
        // when the listing omits them.
        self.rating != stored.rating
            || self.delivery_time != stored.delivery_time
            || self.delivery_fee != stored.delivery_fee
            || self.distance != stored.distance
            || self.logo_url != stored.logo_url
            || coalesced_change(self.url.as_ref(), stored.url.as_ref())
            || coalesced_change(self.address.as_ref(), stored.address.as_ref())
            || coalesced_change(self.phone.as_ref(), stored.phone.as_ref())
            || coalesced_change(self.opening_hours.as_ref(), stored.opening_hours.as_ref())
            || coalesced_change(self.minimum_order.as_ref(), stored.minimum_order.as_ref())
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// SHA-256 over the owning restaurant's key, normalized name, and section.
    pub unique_key: String,
    pub restaurant_key: String,
    pub name: String,
    /// Menu section, e.g. `"Pizzas Salgadas"`; `"Geral"` when absent.
    pub section: String,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub serves_people: Option<u8>,
}

impl Product {
    #[must_use]
    pub fn key_for(restaurant_key: &str, name: &str, section: &str) -> String {
        content_key(&[
            restaurant_key,
            &normalize_text(name),
            &normalize_text(section),
        ])
    }

    /// `true` when the fresh price differs from the stored one.
    #[must_use]
    pub fn price_changed(&self, stored: &Self) -> bool {
        self.price != stored.price
    }
}

impl Entity for Product {
    const KIND: &'static str = "product";

    fn natural_key(&self) -> String {
        self.unique_key.clone()
    }

    fn has_changes(&self, stored: &Self) -> bool {
        self.price != stored.price
            || self.original_price != stored.original_price
            || self.is_available != stored.is_available
            || coalesced_change(self.description.as_ref(), stored.description.as_ref())
            || coalesced_change(self.image_url.as_ref(), stored.image_url.as_ref())
            || coalesced_change(self.serves_people.as_ref(), stored.serves_people.as_ref())
    }

    fn label(&self) -> &str {
        &self.name
    }
}
