//! Catalog records and the immutable snapshot served by the cache.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// One skin listed in the storefront catalog.
#[derive(Debug, Clone, Serialize)]
pub struct SkinRecord {
    pub id: Uuid,
    /// Steam market hash name, e.g. `AK-47 | Redline (Field-Tested)`.
    pub market_hash_name: String,
    pub display_name: String,
    /// Weapon class, e.g. `Rifle`, `Pistol`, `Knife`.
    pub category: String,
    /// Weapon within the class, e.g. `AK-47`.
    pub subcategory: String,
    pub price_cents: i64,
    pub image_url: String,
    pub visible: bool,
    pub updated_at: OffsetDateTime,
}

/// Category → subcategories, derived from the item list.
pub type Taxonomy = BTreeMap<String, BTreeSet<String>>;

/// A fully-formed view of the catalog produced by one load.
///
/// Snapshots are immutable and replaced whole; readers share them via
/// `Arc<CatalogSnapshot>` so a refresh can never expose a half-built view.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSnapshot {
    pub items: Vec<SkinRecord>,
    pub taxonomy: Taxonomy,
}

impl CatalogSnapshot {
    /// Build a snapshot from loaded items, deriving the taxonomy.
    ///
    /// Hidden items are kept out of the taxonomy so filter menus never
    /// advertise a weapon with nothing to show.
    pub fn from_items(items: Vec<SkinRecord>) -> Self {
        let mut taxonomy = Taxonomy::new();
        for item in items.iter().filter(|item| item.visible) {
            taxonomy
                .entry(item.category.clone())
                .or_default()
                .insert(item.subcategory.clone());
        }
        Self { items, taxonomy }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn category_count(&self) -> usize {
        self.taxonomy.len()
    }
}
