//! Deterministic item catalog.
//!
//! Items are a pure function of their id: a stable hash selects one of ten
//! templates and a bounded price variation, so every node resolves the same
//! metadata without a shared catalog store. Resolved items are cached for
//! repeat lookups.

use crate::error::{Result, SaleError};
use crate::models::Item;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

/// Item id length bounds.
const ITEM_ID_MIN_LEN: usize = 3;
const ITEM_ID_MAX_LEN: usize = 50;

/// Template table: (name prefix, description, base price).
const ITEM_TEMPLATES: &[(&str, &str, f64)] = &[
    ("Flash Electronics", "High-tech gadget at incredible price", 299.99),
    ("Designer Fashion", "Premium clothing item with limited availability", 149.99),
    ("Home Essential", "Must-have household item for modern living", 79.99),
    ("Sports Gear", "Professional quality sports equipment", 199.99),
    ("Beauty Product", "Premium skincare and cosmetic item", 89.99),
    ("Kitchen Tool", "Essential cooking equipment for every chef", 59.99),
    ("Gaming Accessory", "Professional gaming equipment", 129.99),
    ("Health Supplement", "Premium wellness and health product", 49.99),
    ("Book Collection", "Bestselling books and educational materials", 29.99),
    ("Art Supply", "Professional quality creative materials", 39.99),
];

/// Well-known ids warmed at startup.
const COMMON_ITEM_IDS: &[&str] = &[
    "item1", "item2", "item3", "item4", "item5", "test_item", "demo_item", "sample_item",
    "product_a", "product_b", "product_c",
];

/// Catalog resolving item metadata deterministically from item ids.
#[derive(Debug, Default)]
pub struct ItemCatalog {
    cache: RwLock<HashMap<String, Item>>,
}

impl ItemCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an item id: 3–50 characters of `[A-Za-z0-9_-]`.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::InvalidInput`] describing the first violation.
    pub fn validate_item_id(item_id: &str) -> Result<()> {
        if item_id.is_empty() {
            return Err(SaleError::InvalidInput("item_id is required".to_string()));
        }

        if item_id.len() < ITEM_ID_MIN_LEN || item_id.len() > ITEM_ID_MAX_LEN {
            return Err(SaleError::InvalidInput(format!(
                "item_id length must be between {ITEM_ID_MIN_LEN} and {ITEM_ID_MAX_LEN} characters"
            )));
        }

        if !item_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SaleError::InvalidInput(format!(
                "item_id contains invalid characters: {item_id}"
            )));
        }

        Ok(())
    }

    /// Resolve item metadata for an id, generating and caching on miss.
    ///
    /// # Errors
    ///
    /// Returns [`SaleError::InvalidInput`] if the id fails validation.
    pub fn item_by_id(&self, item_id: &str) -> Result<Item> {
        Self::validate_item_id(item_id)?;

        if let Ok(cache) = self.cache.read() {
            if let Some(item) = cache.get(item_id) {
                return Ok(item.clone());
            }
        }

        let item = Self::generate_item(item_id);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(item_id.to_string(), item.clone());
        }

        Ok(item)
    }

    /// Warm the cache with the well-known ids used in smoke tests and demos.
    pub fn preload_common_items(&self) {
        for item_id in COMMON_ITEM_IDS {
            // Validation cannot fail for the static id list.
            let _ = self.item_by_id(item_id);
        }
        tracing::debug!(count = COMMON_ITEM_IDS.len(), "Preloaded common items");
    }

    /// Number of cached items.
    #[must_use]
    pub fn cached_items(&self) -> usize {
        self.cache.read().map(|cache| cache.len()).unwrap_or(0)
    }

    fn generate_item(item_id: &str) -> Item {
        let hash = stable_hash(item_id);
        let item_number = hash % 10_000;

        let (name_prefix, description, base_price) =
            ITEM_TEMPLATES[hash as usize % ITEM_TEMPLATES.len()];

        // Deterministic ±20% variation, truncated to cents.
        let variation = 0.8 + f64::from(hash % 40) / 100.0;
        let price = truncate_cents(base_price * variation);

        Item {
            id: item_id.to_string(),
            name: format!("{name_prefix} #{item_number}"),
            description: description.to_string(),
            price,
            created_at: Utc::now(),
        }
    }
}

/// Accumulator hash giving a stable per-id value.
fn stable_hash(s: &str) -> u32 {
    s.chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}

#[allow(clippy::cast_possible_truncation)] // Prices fit in i64 cents by a wide margin
fn truncate_cents(price: f64) -> f64 {
    (price * 100.0) as i64 as f64 / 100.0
}
